//! Aging round-robin thread scheduler: timer-tick bookkeeping (alarm
//! decrement, sleeper wakeup, quantum countdown) and the primitives
//! every blocking syscall is built on (`yield_thread`,
//! `block_interruptible`, `sleep_thread`, `stop_other_threads`).
//!
//! Grounded in `examples/original_source/kernel/sched.c` almost
//! verbatim for the algorithm (`schedule()`'s aging-counter selection
//! loop, `handle_timer_irq`'s per-tick duties, the
//! `sched_stop_other_threads` static-lock spin-yield protocol) and on
//! the teacher's `process/scheduler.rs` for the Rust module idiom
//! (`IntMutex`-guarded state, `Regs::switch`/FFI context-switch
//! boundary, doc-comment density).

use crate::config::SCHED_FREQ;
use crate::process::signal::{self, SIG_KILL_THREAD};
use crate::process::{self, tss, ProcState, Thread, ThreadState};
use crate::util::lock::IntMutex;
use crate::util::ptr::arc::Arc;

extern "C" {
	/// The warm-path switch between two already-started threads. See
	/// `arch/x86/context_switch.s`.
	fn switch_kernel_stack(save_esp: *mut u32, load_esp: u32);
}

struct State {
	ticks: u32,
	schedule_timer: u32,
}

static STATE: IntMutex<State> = IntMutex::new(State {
	ticks: 0,
	schedule_timer: SCHED_FREQ,
});

/// Dedicated spinlock serializing concurrent `stop_other_threads` calls,
/// matching the original's file-scope `static spinlock_t lock`.
static STOP_LOCK: IntMutex<()> = IntMutex::new(());

/// Monotonic tick count since scheduler init, independent of any
/// process's own accounting.
pub fn ticks() -> u32 {
	STATE.lock().ticks
}

/// Per-tick scheduler duties, called from the timer IRQ handler once
/// per interrupt: ages every process's alarm and posts `SIGALRM` on
/// expiry, wakes any sleeper whose deadline has passed, and counts down
/// to the next quantum-driven reschedule.
///
/// Returns `true` if the caller should now invoke [`schedule`].
pub fn tick() -> bool {
	let mut st = STATE.lock();
	st.ticks += 1;
	let now = st.ticks;

	process::with_processes(|procs| {
		for p in procs.iter().flatten() {
			let mut p = p.lock();
			p.rtime += 10;
			if p.alarm_ticks > 0 {
				p.alarm_ticks -= 1;
				if p.alarm_ticks == 0 {
					p.signals.post(signal::SIGALRM);
				}
			}
		}
	});

	let woke_sleeper = process::with_threads(|threads| {
		for t in threads.iter().flatten() {
			let mut t = t.lock();
			if t.state == ThreadState::Interruptible && t.wake_tick != 0 && t.wake_tick <= now {
				t.wake_tick = 0;
				t.state = ThreadState::Running;
				t.aging_counter = i32::MAX;
				return true;
			}
		}
		false
	});
	if woke_sleeper {
		return true;
	}

	st.schedule_timer -= 1;
	if st.schedule_timer == 0 {
		st.schedule_timer = SCHED_FREQ;
		return true;
	}
	false
}

/// A process is runnable from the scheduler's point of view if it
/// exists (threads with no owning process, i.e. idle, are always
/// eligible) and is in `ProcState::Running`.
fn proc_runnable(owning: Option<process::Pid>) -> bool {
	match owning {
		None => true,
		Some(pid) => process::get_process(pid).is_some_and(|p| p.lock().state == ProcState::Running),
	}
}

/// Selects the next thread to run: the runnable thread with the highest
/// aging counter, falling back to the idle thread if none is runnable.
/// Every other runnable thread's counter is bumped by one; the winner's
/// counter resets to 0.
fn pick_next() -> Arc<IntMutex<Thread>> {
	let idle = process::get_thread(process::IDLE_TID).expect("idle thread not initialized");
	let mut best: Option<Arc<IntMutex<Thread>>> = None;
	let mut best_counter = i32::MIN;

	process::with_threads(|threads| {
		for t in threads.iter().flatten() {
			let guard = t.lock();
			if guard.state != ThreadState::Running || guard.is_idle() {
				continue;
			}
			if !proc_runnable(guard.owning_process) {
				continue;
			}
			if guard.aging_counter > best_counter {
				best_counter = guard.aging_counter;
				drop(guard);
				best = Some(t.clone());
			}
		}

		for t in threads.iter().flatten() {
			let mut guard = t.lock();
			if !guard.is_idle() {
				guard.aging_counter += 1;
			}
		}
	});

	let next = best.unwrap_or(idle);
	if !next.lock().is_idle() {
		next.lock().aging_counter = 0;
	}
	next
}

/// Performs an actual context switch to `next`, never returning to the
/// caller on the "switch away" side — control resumes here only once
/// some other call eventually switches back to the thread that called
/// `schedule()`.
fn switch_to(current: &Arc<IntMutex<Thread>>, next: &Arc<IntMutex<Thread>>) {
	if current.lock().tid == next.lock().tid {
		return;
	}
	process::set_current(next.lock().tid);
	tss::set_esp0(next.lock().tss_esp0);

	let next_owner = next.lock().owning_process;
	if next_owner != current.lock().owning_process {
		if let Some(pid) = next_owner {
			if let Some(p) = process::get_process(pid) {
				unsafe { crate::memory::cr3_set(p.lock().mem_space.pdir_physical) };
			}
		}
	}

	let next_started = next.lock().started;
	if !next_started {
		let regs = next.lock().regs;
		let user = next.lock().start_user;
		next.lock().started = true;
		current.lock().started = true;
		unsafe { regs.switch(user) }
	}

	let save_slot: *mut u32 = &mut current.lock().saved_kernel_sp;
	let load_sp = next.lock().saved_kernel_sp;
	current.lock().started = true;
	unsafe { switch_kernel_stack(save_slot, load_sp) };
}

/// Picks the next thread to run and switches to it. Must be called with
/// interrupts already disabled by the caller (the blocking primitives
/// below, or the timer ISR).
pub fn schedule() {
	let Some(current) = process::current() else {
		// Nothing has ever run yet (the boot dispatch out of
		// `kernel_main`): there is no "current" thread to compare `next`
		// against, so this always takes the cold-start half of what
		// `switch_to` does for a thread that has never been switched to,
		// rather than going through its same-tid short-circuit.
		let next = pick_next();
		process::set_current(next.lock().tid);
		tss::set_esp0(next.lock().tss_esp0);
		if let Some(pid) = next.lock().owning_process {
			if let Some(p) = process::get_process(pid) {
				unsafe { crate::memory::cr3_set(p.lock().mem_space.pdir_physical) };
			}
		}
		let regs = next.lock().regs;
		let user = next.lock().start_user;
		next.lock().started = true;
		unsafe { regs.switch(user) }
	};
	let next = pick_next();
	switch_to(&current, &next);
}

/// Gives up the remainder of this thread's quantum voluntarily.
pub fn yield_thread() {
	crate::util::lock::wrap_disable_interrupts(schedule);
}

/// Blocks the current thread until a pending signal or an explicit
/// wakeup makes it runnable again.
pub fn block_interruptible() {
	crate::util::lock::wrap_disable_interrupts(|| {
		if let Some(t) = process::current() {
			t.lock().state = ThreadState::Interruptible;
		}
		schedule();
	});
}

/// Blocks the current thread so that only an explicit wakeup (not a
/// signal) resumes it.
pub fn block_uninterruptible() {
	crate::util::lock::wrap_disable_interrupts(|| {
		if let Some(t) = process::current() {
			t.lock().state = ThreadState::Uninterruptible;
		}
		schedule();
	});
}

/// Blocks the current thread until `ticks` timer ticks have elapsed.
pub fn sleep_thread(ticks: u32) {
	crate::util::lock::wrap_disable_interrupts(|| {
		if let Some(t) = process::current() {
			let mut t = t.lock();
			t.wake_tick = self::ticks() + ticks;
			t.state = ThreadState::Interruptible;
		}
		schedule();
	});
}

/// Wakes every thread of `pid` that is blocked interruptibly, for
/// signal delivery (a signal posted to a process must wake any thread
/// of it sleeping in a syscall).
pub fn wake_proc(pid: process::Pid) {
	process::with_threads(|threads| {
		for t in threads.iter().flatten() {
			let mut t = t.lock();
			if t.owning_process == Some(pid) && t.state == ThreadState::Interruptible {
				t.wake_tick = 0;
				t.state = ThreadState::Running;
			}
		}
	});
}

/// Marks the current thread dead and gives up the CPU for good; it is
/// never selected by [`pick_next`] again.
pub fn stop_self() -> ! {
	crate::util::lock::wrap_disable_interrupts(|| {
		if let Some(t) = process::current() {
			let mut t = t.lock();
			if let Some(pid) = t.owning_process {
				if let Some(p) = process::get_process(pid) {
					p.lock().thread_count -= 1;
				}
				process::remove_thread(t.tid);
			}
			t.state = ThreadState::None;
		}
		schedule();
	});
	unreachable!("a thread with state None must never be rescheduled");
}

/// Quiesces every other thread of the current thread's process before a
/// destructive operation (`exit`, `execve`): posts the reserved
/// cancellation bit to every sibling thread and waits for
/// `thread_count` to drop to 1. Guarded by a dedicated spinlock so two
/// siblings racing to do this at once serialize instead of both
/// proceeding under the false assumption they're alone.
pub fn stop_other_threads() {
	let _guard = STOP_LOCK.lock();

	let Some(current) = process::current() else {
		return;
	};
	let (pid, my_tid, already_killed) = {
		let t = current.lock();
		(t.owning_process, t.tid, t.pending_signal_bits & SIG_KILL_THREAD != 0)
	};
	let Some(pid) = pid else {
		return;
	};
	if already_killed {
		drop(_guard);
		stop_self();
	}

	process::with_threads(|threads| {
		for t in threads.iter().flatten() {
			let mut t = t.lock();
			if t.owning_process == Some(pid) && t.tid != my_tid {
				t.pending_signal_bits |= SIG_KILL_THREAD;
				if t.state == ThreadState::Interruptible {
					t.state = ThreadState::Running;
				}
			}
		}
	});
	drop(_guard);

	loop {
		let count = process::get_process(pid).map(|p| p.lock().thread_count).unwrap_or(0);
		if count <= 1 {
			break;
		}
		yield_thread();
	}
}

/// Terminates the current process: quiesces sibling threads, reparents
/// its children to init, frees its resources, and zombifies it so
/// `waitpid` can observe the exit status. Mirrors `sched_terminate`,
/// fixed to notify the exiting process's own parent using its `ppid`
/// field captured up front rather than a loop variable read after its
/// loop has already run off the end of the process table.
pub fn terminate(exit_status: u8) -> ! {
	let Some(current) = process::current() else {
		stop_self();
	};
	let Some(pid) = current.lock().owning_process else {
		stop_self();
	};
	let Some(proc) = process::get_process(pid) else {
		stop_self();
	};

	assert!(pid != crate::process::pid::INIT_PID, "tried to kill init");

	stop_other_threads();

	let ppid = proc.lock().ppid;
	process::reparent_orphans(pid);

	if let Some(parent) = process::get_process(ppid) {
		parent.lock().signals.post(signal::SIGCHLD);
	}

	{
		let mut p = proc.lock();
		p.mem_space.free();
		if let Some(inode) = p.exe_inode.take() {
			crate::fs::inode_put(inode);
		}
		if let Some(inode) = p.cwd_inode.take() {
			crate::fs::inode_put(inode);
		}
		for fd in 0..crate::config::OPEN_MAX as u32 {
			let _ = p.fd_table.close(fd);
		}
		p.exit_status = exit_status;
		p.state = ProcState::Zombie;
	}

	wake_proc(ppid);
	stop_self();
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn proc_runnable_accepts_idle_owner() {
		assert!(proc_runnable(None));
	}
}
