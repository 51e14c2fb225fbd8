//! The `write` syscall: copies up to `count` bytes from a user-space
//! buffer into an open file descriptor.

use crate::errno::{self, Errno};
use crate::process;
use crate::process::uaccess;
use macros::syscall;

#[syscall]
pub fn write(fd: u32, buf: u32, count: u32) -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	let staging = uaccess::read_buf(buf, count as usize)?;
	let n = proc.lock().fd_table.write(fd, &staging)?;
	Ok(n as i32)
}
