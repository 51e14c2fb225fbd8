//! The `sigreturn` trap (syscall number `-1`), reached only via
//! `signal::TRAMPOLINE`: restores the register state a signal delivery
//! interrupted, undoing `signal::build_frame`'s work.
//!
//! Grounded in `signal.c`'s `sys_sigreturn`, which pops the same
//! layout `handle_signal` pushed; the return value is deliberately the
//! just-restored `eax` rather than `0`, since the dispatcher writes
//! whatever this function returns into `regs.eax` right after this runs
//! and would otherwise clobber the context it just restored.

use crate::errno::{self, Errno};
use crate::process::regs::Regs;
use crate::process::uaccess;
use core::mem::size_of;
use macros::syscall;

#[syscall]
pub fn sigreturn() -> Result<i32, Errno> {
	let frame_addr = regs.esp;
	uaccess::check_range(frame_addr, size_of::<Regs>() as u32, false)?;
	let saved = unsafe { core::ptr::read_unaligned(frame_addr as *const Regs) };
	*regs = saved;
	Ok(saved.eax as i32)
}
