//! The `fork` syscall. See [`exec::fork`] for the actual work of copying
//! the calling process's address space and file state.

use crate::errno::{self, Errno};
use crate::process::{self, exec};
use macros::syscall;

#[syscall]
pub fn fork() -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	let pid = exec::fork(&proc, &*regs)?;
	Ok(pid as i32)
}
