//! The `execve` syscall. See [`exec::execve`] for the image-loading work;
//! this is just the argument-marshalling shim over it.

use crate::errno::{self, Errno};
use crate::process::{self, exec};
use macros::syscall;

#[syscall]
pub fn execve(path: u32, argv: u32, envp: u32) -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	exec::execve(&proc, regs, path, argv, envp)?;
	Ok(0)
}
