//! The `kill` syscall: posts a signal to one process or a whole group,
//! subject to the same permission rule `send_proc_signal`'s callers
//! always have to check first.
//!
//! Grounded in `signal.c`'s `sys_kill` pid-selector switch (`>0` exact,
//! `0` sender's group, `-1` every permitted target, `<-1` a named
//! group) and on the teacher's `syscall/kill.rs` for the POSIX
//! credential rule (root bypasses the uid check; `SIGCONT` crosses uids
//! within a session; everyone else needs a matching uid).
//!
//! Matching targets are collected into a list before any signal is
//! actually posted: [`process::with_processes`] holds the process table
//! lock for the scan, and [`process::send_proc_signal`] locks it again
//! internally to wake a thread, so interleaving the two would deadlock
//! on the non-reentrant table lock.

use crate::errno::{self, Errno};
use crate::process::pid::INIT_PID;
use crate::process::signal::{self, Disposition, SigNum};
use crate::process::{self, Pid};
use crate::util::container::vec::Vec;
use macros::syscall;

/// Whether a process with euid `my_euid` (session `my_sid`) may signal
/// `target` with `sig`, given the target's credentials, session and
/// current disposition for `sig`.
fn can_signal(my_euid: u16, my_sid: Pid, target_pid: Pid, target_euid: u16, target_sid: Pid, target_disp: Disposition, sig: SigNum) -> bool {
	if target_pid == INIT_PID && matches!(target_disp, Disposition::Default | Disposition::Ignore) {
		return false;
	}
	if my_euid == 0 {
		return true;
	}
	if sig == signal::SIGCONT && target_sid == my_sid {
		return true;
	}
	target_euid == my_euid
}

fn selects(selector: i32, my_pid: Pid, my_pgid: Pid, target_pid: Pid, target_pgid: Pid) -> bool {
	match selector {
		s if s > 0 => target_pid == s as Pid,
		0 => target_pgid == my_pgid,
		-1 => target_pid != my_pid,
		s => target_pgid == (-s) as Pid,
	}
}

#[syscall]
pub fn kill(pid: i32, sig: u32) -> Result<i32, Errno> {
	if sig == 0 || sig >= 32 {
		return Err(errno::EINVAL);
	}
	let me = process::current_proc().ok_or(errno::ESRCH)?;
	let (my_pid, my_pgid, my_euid, my_sid) = {
		let p = me.lock();
		(p.pid, p.pgid, p.euid, p.sid)
	};

	// Self-signaling is always permitted and never needs a second lock
	// on `me` alongside the one already taken above.
	if pid > 0 && pid as Pid == my_pid {
		process::send_proc_signal(my_pid, sig);
		return Ok(0);
	}

	let mut any = false;
	let mut targets = Vec::new();
	let collect: Result<(), Errno> = process::with_processes(|procs| {
		for p in procs.iter().flatten() {
			let g = p.lock();
			if !selects(pid, my_pid, my_pgid, g.pid, g.pgid) {
				continue;
			}
			any = true;
			if can_signal(my_euid, my_sid, g.pid, g.euid, g.sid, g.signals.disposition(sig), sig) {
				targets.push(g.pid)?;
			}
		}
		Ok(())
	});
	collect?;

	if !any {
		return Err(errno::ESRCH);
	}
	for target_pid in targets.iter() {
		process::send_proc_signal(*target_pid, sig);
	}
	Ok(0)
}
