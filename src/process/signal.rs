//! Signal numbers, per-process disposition table, pending bitfields, and
//! trampoline-based delivery into user mode.
//!
//! Grounded in `signal.c`'s `signal_pending`/`send_proc_signal`/
//! `handle_signal`/`sys_sigreturn` for delivery semantics (including the
//! one-shot disposition reset, confirmed intentional traditional-Unix
//! "unreliable signal" behavior and kept as designed) and on the
//! teacher's `process/signal/mod.rs` for the signal-number constants and
//! `Signal`/disposition shape.

use crate::errno::{self, Errno};
use crate::process::regs::Regs;
use crate::process::uaccess;

pub type SigNum = u32;

pub const SIGHUP: SigNum = 1;
pub const SIGINT: SigNum = 2;
pub const SIGQUIT: SigNum = 3;
pub const SIGILL: SigNum = 4;
pub const SIGTRAP: SigNum = 5;
pub const SIGABRT: SigNum = 6;
pub const SIGBUS: SigNum = 7;
pub const SIGFPE: SigNum = 8;
pub const SIGKILL: SigNum = 9;
pub const SIGUSR1: SigNum = 10;
pub const SIGSEGV: SigNum = 11;
pub const SIGUSR2: SigNum = 12;
pub const SIGPIPE: SigNum = 13;
pub const SIGALRM: SigNum = 14;
pub const SIGTERM: SigNum = 15;
pub const SIGSTKFLT: SigNum = 16;
pub const SIGCHLD: SigNum = 17;
pub const SIGCONT: SigNum = 18;
pub const SIGSTOP: SigNum = 19;
pub const SIGTSTP: SigNum = 20;
pub const SIGTTIN: SigNum = 21;
pub const SIGTTOU: SigNum = 22;
pub const SIGXCPU: SigNum = 24;
pub const SIGXFSZ: SigNum = 25;
pub const SIGVTALRM: SigNum = 26;
pub const SIGPROF: SigNum = 27;
pub const SIGIO: SigNum = 29;
pub const SIGPWR: SigNum = 30;
pub const SIGSYS: SigNum = 31;

/// Bit 0 of a pending bitfield is not a real signal; it is the reserved
/// "terminate this thread immediately" cancellation flag used by `exit`
/// and `execve` to quiesce peer threads.
pub const SIG_KILL_THREAD: u32 = 1 << 0;

/// A process's disposition for one signal number.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
	/// Run the signal's default action (see [`default_action`]).
	Default,
	/// Discard the signal silently.
	Ignore,
	/// Invoke the user-space handler at this address.
	Handler(u32),
}

impl Disposition {
	/// Decodes a raw `signal(2)`-style handler value: `0` is `SIG_DFL`,
	/// `1` is `SIG_IGN`, anything else a handler entry point.
	pub fn from_raw(raw: u32) -> Self {
		match raw {
			0 => Disposition::Default,
			1 => Disposition::Ignore,
			addr => Disposition::Handler(addr),
		}
	}

	fn to_raw(self) -> u32 {
		match self {
			Disposition::Default => 0,
			Disposition::Ignore => 1,
			Disposition::Handler(addr) => addr,
		}
	}
}

/// What happens when a signal with [`Disposition::Default`] is
/// delivered and the signal isn't otherwise special-cased by
/// `handle_signal` (`SIGKILL`, `SIGSTOP`).
pub enum DefaultAction {
	Terminate,
	Stop,
	Ignore,
}

/// The default-action table consulted only when a process's disposition
/// for a signal is `Default`. Mirrors `handle_signal`'s switch.
pub fn default_action(sig: SigNum) -> DefaultAction {
	match sig {
		SIGCHLD | SIGCONT => DefaultAction::Ignore,
		SIGTSTP | SIGTTIN | SIGTTOU => DefaultAction::Stop,
		_ => DefaultAction::Terminate,
	}
}

/// Per-process signal state: the disposition table and the
/// process-wide pending bitfield (each thread also has its own, see
/// [`crate::process::Thread`]).
pub struct SignalState {
	sigdisp: [u32; 32],
	pub pending: u32,
}

impl SignalState {
	pub const fn new() -> Self {
		Self {
			sigdisp: [0; 32],
			pending: 0,
		}
	}

	/// Resets every disposition to default, for `execve`.
	pub fn reset_dispositions(&mut self) {
		self.sigdisp = [0; 32];
	}

	/// Produces a child's signal state for `fork`: dispositions are
	/// inherited verbatim, but nothing is pending yet in the new process.
	pub fn fork_for_child(&self) -> Self {
		Self {
			sigdisp: self.sigdisp,
			pending: 0,
		}
	}

	pub fn disposition(&self, sig: SigNum) -> Disposition {
		Disposition::from_raw(self.sigdisp[sig as usize])
	}

	pub fn set_disposition(&mut self, sig: SigNum, disp: Disposition) -> Result<(), Errno> {
		if sig == 0 || sig >= 32 || sig == SIGKILL || sig == SIGSTOP {
			return Err(errno::EINVAL);
		}
		self.sigdisp[sig as usize] = disp.to_raw();
		Ok(())
	}

	/// Posts `sig` to the process.
	pub fn post(&mut self, sig: SigNum) {
		self.pending |= 1 << sig;
	}

	pub fn clear(&mut self, sig: SigNum) {
		self.pending &= !(1 << sig);
	}
}

impl Default for SignalState {
	fn default() -> Self {
		Self::new()
	}
}

/// Computes the set of signals a thread should act on: the union of its
/// own and its process's pending bits, minus its mask. Bit 0
/// ([`SIG_KILL_THREAD`]) is never maskable.
pub fn signal_pending(thread_pending: u32, proc_pending: u32, mask: u32) -> u32 {
	let unmasked = (thread_pending | proc_pending) & !(mask & !SIG_KILL_THREAD);
	unmasked
}

/// The lowest-numbered set bit, i.e. the next signal to deliver.
pub fn lowest_pending(bits: u32) -> Option<u32> {
	if bits == 0 {
		None
	} else {
		Some(bits.trailing_zeros())
	}
}

/// The in-stack trampoline written onto the user stack below a
/// delivered handler's saved frame: `mov eax, -1; int 0xFF; <pad>`. When
/// the handler returns, this invokes `sigreturn` (syscall number -1) to
/// restore the interrupted context. See the design notes on this
/// trampoline's fragility (it requires a writable, executable user
/// stack) — a fixed read-only trampoline page is the suggested fix, not
/// yet adopted here.
pub const TRAMPOLINE: [u8; 8] = [0xb8, 0xff, 0xff, 0xff, 0xff, 0xcd, 0xff, 0x00];

/// The layout of a signal frame pushed onto the user stack on delivery,
/// matching the order `sys_sigreturn` expects to pop it back in.
#[repr(C, packed)]
pub struct SigFrame {
	pub trampoline: [u8; 8],
	pub retaddr: u32,
	pub saved: Regs,
	pub signum: u32,
}

/// Builds the sigframe contents for delivering `signum` with the
/// interrupted context `saved`, to be written at `frame_addr` (the new,
/// lowered user `esp`) by the caller.
pub fn build_frame(saved: Regs, signum: u32, frame_addr: u32) -> SigFrame {
	SigFrame {
		trampoline: TRAMPOLINE,
		retaddr: frame_addr,
		saved,
		signum,
	}
}

/// Checks the current thread for a pending, unmasked signal and acts on
/// it, called on every return path from kernel to user mode (a syscall
/// return, or the fault/IRQ return paths in `crate::idt`) so delivery
/// never waits on anything but the next trip back to user mode. Loops
/// because `Ignore`/`Default::Ignore`/a stop that is immediately resumed
/// must not stall delivery of whatever is pending behind them.
///
/// A `Handler` disposition rewrites `regs.eip`/`regs.esp` in place to
/// enter the handler with `TRAMPOLINE` and the interrupted context
/// pushed below it (see [`build_frame`]) and returns normally, letting
/// the caller's `iret` land in user code for the first time with the
/// handler, not the interrupted instruction, at `eip`. Every other
/// disposition either loops back for the next pending signal or leaves
/// user mode entirely (`terminate`/a stop that blocks the thread), so
/// it never falls through to the `Handler` path's `return`.
pub fn deliver(regs: &mut Regs) {
	let Some(thread) = crate::process::current() else {
		return;
	};
	let Some(pid) = thread.lock().owning_process else {
		return;
	};
	let Some(proc) = crate::process::get_process(pid) else {
		return;
	};

	loop {
		let (thread_pending, mask) = {
			let t = thread.lock();
			(t.pending_signal_bits, t.signal_mask)
		};
		let proc_pending = proc.lock().signals.pending;
		let pending = signal_pending(thread_pending, proc_pending, mask);
		let Some(sig) = lowest_pending(pending) else {
			return;
		};

		if sig == 0 {
			// SIG_KILL_THREAD, the reserved cancellation bit, not a signal
			// with a disposition of its own.
			crate::process::scheduler::stop_self();
		}

		thread.lock().pending_signal_bits &= !(1 << sig);
		proc.lock().signals.clear(sig);

		if sig == SIGKILL {
			crate::process::scheduler::terminate(128 + SIGKILL as u8);
		}
		if sig == SIGSTOP {
			proc.lock().state = crate::process::ProcState::Stopped;
			crate::process::scheduler::yield_thread();
			continue;
		}

		let disp = proc.lock().signals.disposition(sig);
		match disp {
			Disposition::Ignore => continue,
			Disposition::Default => match default_action(sig) {
				DefaultAction::Ignore => continue,
				DefaultAction::Stop => {
					proc.lock().state = crate::process::ProcState::Stopped;
					crate::process::scheduler::yield_thread();
					continue;
				}
				DefaultAction::Terminate => {
					proc.lock().termsig = sig as u8;
					crate::process::scheduler::terminate(128 + sig as u8);
				}
			},
			Disposition::Handler(entry) => {
				// One-shot: reset to default before the handler runs, the
				// traditional (and, per the resolved open question on this
				// behavior, intentionally kept) "unreliable signal" rule.
				let _ = proc.lock().signals.set_disposition(sig, Disposition::Default);

				let frame_addr = regs.esp.wrapping_sub(core::mem::size_of::<SigFrame>() as u32) & !0xf;
				let frame = build_frame(*regs, sig, frame_addr);
				let bytes = unsafe {
					core::slice::from_raw_parts(&frame as *const SigFrame as *const u8, core::mem::size_of::<SigFrame>())
				};
				if uaccess::write_buf(frame_addr, bytes).is_err() {
					// The user stack can't take the frame (unmapped, or a
					// stack overflow growing into it); nothing left to do
					// but kill the process the way a real SIGSEGV would.
					crate::process::scheduler::terminate(128 + SIGSEGV as u8);
				}
				regs.esp = frame_addr;
				regs.eip = entry;
				return;
			}
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn pending_respects_mask_but_not_kill_bit() {
		let bits = signal_pending(0, 1 << SIGTERM, 1 << SIGTERM);
		assert_eq!(bits, 0);
		let bits = signal_pending(SIG_KILL_THREAD, 0, SIG_KILL_THREAD);
		assert_eq!(bits, SIG_KILL_THREAD);
	}

	#[test_case]
	fn lowest_pending_picks_smallest_bit() {
		let bits = (1 << SIGCHLD) | (1 << SIGINT);
		assert_eq!(lowest_pending(bits), Some(SIGINT));
	}

	#[test_case]
	fn disposition_roundtrip() {
		let mut s = SignalState::new();
		s.set_disposition(SIGUSR1, Disposition::Handler(0x4000)).unwrap();
		assert!(matches!(s.disposition(SIGUSR1), Disposition::Handler(0x4000)));
		assert!(s.set_disposition(SIGKILL, Disposition::Ignore).is_err());
	}
}
