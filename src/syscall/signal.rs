//! The `signal` syscall: sets the calling process's disposition for one
//! signal number, `SIG_DFL`/`SIG_IGN`/handler-address encoded the same
//! way [`Disposition::from_raw`] decodes it.

use crate::errno::{self, Errno};
use crate::process;
use crate::process::signal::Disposition;
use macros::syscall;

#[syscall]
pub fn signal(sig: u32, handler: u32) -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	proc.lock().signals.set_disposition(sig, Disposition::from_raw(handler))?;
	Ok(0)
}
