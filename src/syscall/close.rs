//! The `close` syscall.

use crate::errno::{self, Errno};
use crate::process;
use macros::syscall;

#[syscall]
pub fn close(fd: u32) -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	proc.lock().fd_table.close(fd)?;
	Ok(0)
}
