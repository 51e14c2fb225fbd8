//! The `exit` syscall terminates the calling process with the given
//! status code. See [`scheduler::terminate`] for the actual teardown.

use crate::errno::Errno;
use crate::process::scheduler;
use macros::syscall;

#[syscall]
pub fn exit(status: i32) -> Result<i32, Errno> {
	scheduler::terminate((status & 0xff) as u8)
}
