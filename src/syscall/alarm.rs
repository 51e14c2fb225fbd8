//! The `alarm` syscall arms or disarms `SIGALRM` on the calling process,
//! at the scheduler's tick resolution.

use crate::config::TIMER_HZ;
use crate::errno::{self, Errno};
use crate::process;
use macros::syscall;

#[syscall]
pub fn alarm(seconds: u32) -> Result<i32, Errno> {
	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	let mut p = proc.lock();
	let previous_ticks = p.alarm_ticks;
	p.alarm_ticks = seconds.saturating_mul(TIMER_HZ);
	let previous_seconds = (previous_ticks + TIMER_HZ - 1) / TIMER_HZ;
	Ok(previous_seconds as i32)
}
