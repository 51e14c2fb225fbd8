//! System call handlers and the dispatcher `arch::x86::syscall_entry`
//! calls into on every `int 0xFF` trap.
//!
//! Each handler is declared with `#[macros::syscall]`, which marshals
//! `ebx`/`ecx`/`edx` into its typed arguments and hands it the live
//! trap frame as `&mut Regs`; see `macros::syscall` for the expansion.
//! The numbering below is this core's own (a handful of POSIX-ish
//! calls rather than the several hundred a general-purpose kernel
//! exposes), not the teacher's Linux-derived table.

mod alarm;
mod close;
mod dup;
mod execve;
mod exit;
mod fork;
mod kill;
mod open;
mod read;
mod signal;
mod sigreturn;
mod waitpid;
mod write;

use crate::errno::{self, Errno};
use crate::process::regs::Regs;
use crate::process::signal as signal_delivery;
use alarm::alarm;
use close::close;
use dup::dup;
use execve::execve;
use exit::exit;
use fork::fork;
use kill::kill;
use open::open;
use read::read;
use signal::signal;
use sigreturn::sigreturn;
use waitpid::waitpid;
use write::write;

/// Entry point called from `arch::x86::syscall_entry` with the
/// stack-resident trap frame. Matches `regs.eax` (the syscall number,
/// a signed value so `sigreturn`'s reserved `-1` decodes correctly)
/// against the table below and writes the handler's result back into
/// `eax` as a non-negative value, or `-errno` on failure.
#[no_mangle]
pub extern "C" fn syscall_handler(regs: &mut Regs) {
	let id = regs.eax as i32;

	let result = match id {
		0 => exit(regs),
		1 => waitpid(regs),
		2 => alarm(regs),
		3 => kill(regs),
		4 => signal(regs),
		5 => read(regs),
		6 => write(regs),
		7 => open(regs),
		8 => close(regs),
		9 => dup(regs),
		11 => execve(regs),
		12 => fork(regs),
		-1 => sigreturn(regs),
		_ => Err(errno::ENOSYS),
	};

	regs.eax = match result {
		Ok(val) => val as u32,
		Err(e) => (-e) as u32,
	};

	// `sigreturn` just restored a pre-signal context; re-checking here
	// would re-deliver whatever was pending when that context was
	// interrupted before it gets a chance to run.
	if id != -1 {
		signal_delivery::deliver(regs);
	}
}
