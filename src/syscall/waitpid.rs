//! The `waitpid` syscall: reaps an already-exited child, or blocks
//! interruptibly until one exits.
//!
//! Grounded in the teacher's `syscall/waitpid.rs` for the pid-selector
//! shape (`-1`/`0`/`>0`/`<-1` against pgid/pid) and in `signal.c`'s
//! `signal_pending` for telling a real interruption apart from a
//! spurious wakeup once no zombie is found.

use crate::errno::{self, Errno};
use crate::process::signal;
use crate::process::uaccess;
use crate::process::{self, scheduler, Pid, ProcState};
use macros::syscall;

fn matches_selector(selector: i32, my_pgid: Pid, child_pgid: Pid, child_pid: Pid) -> bool {
	match selector {
		s if s > 0 => child_pid == s as Pid,
		0 => child_pgid == my_pgid,
		-1 => true,
		s => child_pgid == (-s) as Pid,
	}
}

/// Whether the calling thread has an unmasked signal pending; used to
/// tell a real interruption apart from a spurious wakeup once a pass
/// over the process table finds no zombie to reap.
fn woken_by_signal() -> bool {
	let Some(thread) = process::current() else {
		return false;
	};
	let (pending, mask, owner) = {
		let t = thread.lock();
		(t.pending_signal_bits, t.signal_mask, t.owning_process)
	};
	let proc_pending = owner.and_then(process::get_process).map(|p| p.lock().signals.pending).unwrap_or(0);
	signal::signal_pending(pending, proc_pending, mask) != 0
}

#[syscall]
pub fn waitpid(pid: i32, wstatus: u32, options: u32) -> Result<i32, Errno> {
	let _ = options;
	let me = process::current_proc().ok_or(errno::ESRCH)?;
	let (my_pid, my_pgid) = {
		let p = me.lock();
		(p.pid, p.pgid)
	};

	loop {
		let mut any_child = false;
		let mut zombie = None;
		process::with_processes(|procs| {
			for child in procs.iter().flatten() {
				let c = child.lock();
				if c.ppid != my_pid || !matches_selector(pid, my_pgid, c.pgid, c.pid) {
					continue;
				}
				any_child = true;
				if c.state == ProcState::Zombie && zombie.is_none() {
					zombie = Some(c.pid);
				}
			}
		});

		if !any_child {
			return Err(errno::ECHILD);
		}
		if let Some(child_pid) = zombie {
			let (status, termsig) = process::get_process(child_pid)
				.map(|p| {
					let p = p.lock();
					(p.exit_status, p.termsig)
				})
				.ok_or(errno::ECHILD)?;
			uaccess::write_u32(wstatus, ((termsig as u32) << 8) | status as u32)?;
			process::reap(child_pid);
			return Ok(child_pid as i32);
		}
		if woken_by_signal() {
			return Err(errno::EINTR);
		}
		scheduler::block_interruptible();
	}
}
