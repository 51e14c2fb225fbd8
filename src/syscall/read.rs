//! The `read` syscall: copies up to `count` bytes from an open file
//! descriptor into a user-space buffer.

use crate::errno::{self, Errno};
use crate::process;
use crate::process::uaccess;
use crate::util::container::vec::Vec;
use macros::syscall;

#[syscall]
pub fn read(fd: u32, buf: u32, count: u32) -> Result<i32, Errno> {
	if count as usize > uaccess::MAX_IO_SIZE {
		return Err(errno::EINVAL);
	}
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	let mut staging = Vec::new();
	staging.resize(count as usize, 0u8)?;
	let n = proc.lock().fd_table.read(fd, &mut staging)?;
	uaccess::write_buf(buf, &staging[..n])?;
	Ok(n as i32)
}
