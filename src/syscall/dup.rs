//! The `dup` syscall: duplicates a file descriptor onto the lowest free
//! slot.

use crate::errno::{self, Errno};
use crate::process;
use macros::syscall;

#[syscall]
pub fn dup(oldfd: u32) -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	let fd = proc.lock().fd_table.dup(oldfd, 0)?;
	Ok(fd as i32)
}
