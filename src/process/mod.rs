//! Process and thread control blocks, and the fixed-size tables that own
//! every live one.
//!
//! Split into two tables, one per entity, rather than the teacher's
//! single combined `Process` (which folds `tid`/register state/kernel
//! stack into the process itself): the scheduler and signal-delivery
//! code both need to reason about "this thread, which process owns
//! it" independently of "this process, which threads does it have",
//! and a fixed `owning_process: Option<Pid>` makes that relationship
//! explicit instead of implicit in a single entity's fields.
//!
//! Grounded in `examples/maestro-os-maestro/src/process/mod.rs` (field
//! names, `State` enum shape, `DEFAULT_UMASK`/stack-size constants) and
//! `examples/original_source/include/sched.h` (`struct proc`/`struct
//! thread` field lists this data model was distilled from).

pub mod exec;
pub mod mem_space;
pub mod pid;
pub mod regs;
pub mod scheduler;
pub mod signal;
pub mod tss;
pub mod uaccess;

use crate::config::{KERNEL_STACK_SIZE, NPROC, NTHREAD};
use crate::errno::{self, Errno};
use crate::fs::InodeRef;
use crate::file::FdTable;
use crate::memory::vmem::{self, PAGE_WRITABLE};
use crate::memory::PAGE_SIZE;
use crate::util::lock::IntMutex;
use crate::util::ptr::arc::Arc;
use mem_space::MemSpace;
pub use pid::Pid;
use pid::{PidAllocator, INIT_PID};
use regs::Regs;
use signal::SignalState;

/// Default file-creation mask for a freshly created process.
pub const DEFAULT_UMASK: u16 = 0o022;

/// A process's run state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcState {
	/// Slot is unused.
	None,
	Running,
	/// Stopped by a signal (`SIGTSTP`/`SIGSTOP` and friends).
	Stopped,
	/// Exited; `exit_status`/`termsig` are valid, waiting to be reaped.
	Zombie,
}

/// A thread's scheduling state.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
	/// Slot is unused.
	None,
	Running,
	/// Blocked, but a pending signal wakes it early.
	Interruptible,
	/// Blocked, and only the specific event it's waiting for wakes it.
	Uninterruptible,
}

/// The Process Control Block: every process-wide field (address space,
/// signal disposition table, open files, job-control identity). Register
/// state lives on the thread, not here — a process is only ever resumed
/// through one of its threads.
pub struct Process {
	pub pid: Pid,
	pub ppid: Pid,
	pub pgid: Pid,
	pub sid: Pid,

	pub uid: u16,
	pub gid: u16,
	pub euid: u16,
	pub egid: u16,
	pub umask: u16,

	pub state: ProcState,

	/// Ticks remaining until the next `SIGALRM`, or 0 if disarmed.
	pub alarm_ticks: u32,
	/// Real, kernel, and user time accounting, in ticks. Incremented by
	/// 10 per timer tick the owning thread spends in each mode, matching
	/// the original's accounting unit.
	pub rtime: u32,
	pub ktime: u32,
	pub utime: u32,

	/// The `tid` to hand out to this process's next thread.
	pub next_tid: Pid,
	pub thread_count: u16,

	pub signals: SignalState,

	pub exit_status: u8,
	pub termsig: u8,

	pub cwd_inode: Option<InodeRef>,
	pub exe_inode: Option<InodeRef>,

	pub mem_space: MemSpace,
	pub fd_table: FdTable,
}

impl Process {
	fn new(pid: Pid, ppid: Pid, pdir_physical: u32) -> Self {
		Self {
			pid,
			ppid,
			pgid: pid,
			sid: pid,
			uid: 0,
			gid: 0,
			euid: 0,
			egid: 0,
			umask: DEFAULT_UMASK,
			state: ProcState::Running,
			alarm_ticks: 0,
			rtime: 0,
			ktime: 0,
			utime: 0,
			next_tid: pid,
			thread_count: 0,
			signals: SignalState::new(),
			exit_status: 0,
			termsig: 0,
			cwd_inode: None,
			exe_inode: None,
			mem_space: MemSpace::new(pdir_physical),
			fd_table: FdTable::new(),
		}
	}

	pub fn is_init(&self) -> bool {
		self.pid == INIT_PID
	}
}

/// A schedulable thread of execution. One-to-one with a kernel stack;
/// many-to-one with a [`Process`].
pub struct Thread {
	pub tid: Pid,
	pub owning_process: Option<Pid>,

	/// Virtual address of this thread's kernel stack's top page.
	pub kernel_stack_page: u32,
	/// Saved `esp` on the kernel stack across a voluntary/involuntary
	/// switch away from this thread.
	pub saved_kernel_sp: u32,
	/// Value loaded into the TSS's `esp0` field when this thread is
	/// scheduled, so a ring-3 trap lands on its kernel stack.
	pub tss_esp0: u32,

	pub state: ThreadState,
	/// Aging counter driving the scheduler's round-robin selection.
	/// `-1` marks the distinguished idle thread, which is never selected
	/// by aging and only runs when nothing else is runnable.
	pub aging_counter: i32,
	/// Absolute tick at which a sleeping thread wakes on its own.
	pub wake_tick: u32,

	pub pending_signal_bits: u32,
	pub signal_mask: u32,

	/// The saved CPU register file. Populated when a thread last gave up
	/// the CPU via a full trap frame (preempted while running in user
	/// mode); consulted by the scheduler's cold-start path for a thread
	/// that has never yet warm-switched through
	/// `arch::x86::switch_kernel_stack`. Not in the entity field list
	/// this data model is distilled from, but every resumable context
	/// needs somewhere to keep it, the same way the teacher's own
	/// `Process` carries a `regs: Regs` field for this exact purpose.
	pub regs: Regs,
	/// `true` once this thread has warm-switched through the scheduler
	/// at least once, meaning `saved_kernel_sp` is a valid resume point
	/// for `switch_kernel_stack` rather than `regs` needing a cold-start
	/// dispatch.
	pub started: bool,
	/// Whether this thread's cold-start dispatch (see `started`) should
	/// drop to user mode (a freshly forked or exec'd thread, resuming a
	/// trap frame) or stay in the kernel (the idle thread). Not in the
	/// entity field list this data model is distilled from, but
	/// `Regs::switch`'s `user: bool` parameter has to come from
	/// somewhere for the scheduler's cold-start path.
	pub start_user: bool,
}

impl Thread {
	/// `stack_top` is the value `alloc_kernel_stack` returns: the address
	/// immediately above the thread's single kernel stack page, which
	/// doubles as the initial `tss_esp0`. A thread not yet backed by a
	/// real stack (a freshly `fork`ed child, before its own call to
	/// `alloc_kernel_stack`) is constructed with `0` here and has both
	/// fields overwritten once its stack exists; see `exec::setup_child`.
	fn new(tid: Pid, owning_process: Option<Pid>, stack_top: u32) -> Self {
		Self {
			tid,
			owning_process,
			kernel_stack_page: stack_top.wrapping_sub(PAGE_SIZE as u32),
			saved_kernel_sp: 0,
			tss_esp0: stack_top,
			state: ThreadState::None,
			aging_counter: 0,
			wake_tick: 0,
			pending_signal_bits: 0,
			signal_mask: 0,
			regs: Regs::default(),
			started: false,
			start_user: false,
		}
	}

	pub fn is_idle(&self) -> bool {
		self.aging_counter == -1
	}
}

/// Base virtual address of the fixed kernel-stack region: one
/// `KERNEL_STACK_SIZE`-byte slot per possible `tid`, indexed directly
/// rather than allocated from a general-purpose kernel heap, since the
/// thread table already bounds how many stacks can ever be live. Lies
/// above the kernel/user split so every address space's shared kernel
/// directory entries cover it identically.
const KSTACK_REGION_BASE: u32 = 0x9000_0000;

/// Allocates and maps this `tid`'s kernel stack, returning the virtual
/// address of its top (the initial `esp` for a cold-start dispatch).
pub fn alloc_kernel_stack(tid: Pid) -> Result<u32, Errno> {
	let top = KSTACK_REGION_BASE + (tid as u32) * KERNEL_STACK_SIZE as u32 + KERNEL_STACK_SIZE as u32;
	vmem::alloc_page(top - PAGE_SIZE as u32, PAGE_WRITABLE)?;
	Ok(top)
}

/// `tid` reserved for the distinguished idle thread. Never handed out by
/// [`PidAllocator`] (PIDs start at 1), so it cannot collide with a real
/// process's initial thread.
pub const IDLE_TID: Pid = 0;

/// Installs the idle thread directly into the thread table, bypassing
/// [`create_thread`] since the idle thread belongs to no process. Called
/// once during scheduler init.
pub fn init_idle_thread(kernel_stack_page: u32) -> Result<Arc<IntMutex<Thread>>, Errno> {
	let mut thread = Thread::new(IDLE_TID, None, kernel_stack_page);
	thread.aging_counter = -1;
	thread.state = ThreadState::Running;
	let thread = Arc::new(IntMutex::new(thread))?;
	let mut tables = TABLES.lock();
	tables.threads[0] = Some(thread.clone());
	Ok(thread)
}

struct Tables {
	pids: PidAllocator,
	processes: [Option<Arc<IntMutex<Process>>>; NPROC],
	threads: [Option<Arc<IntMutex<Thread>>>; NTHREAD],
	/// `tid` of the thread currently executing on this (single, no-SMP)
	/// core, set by the scheduler on every switch.
	current: Option<Pid>,
}

impl Tables {
	const fn new() -> Self {
		const NO_PROC: Option<Arc<IntMutex<Process>>> = None;
		const NO_THREAD: Option<Arc<IntMutex<Thread>>> = None;
		Self {
			pids: PidAllocator::new(),
			processes: [NO_PROC; NPROC],
			threads: [NO_THREAD; NTHREAD],
			current: None,
		}
	}
}

static TABLES: IntMutex<Tables> = IntMutex::new(Tables::new());

/// Looks up a live process by pid.
pub fn get_process(pid: Pid) -> Option<Arc<IntMutex<Process>>> {
	TABLES.lock().processes.iter().flatten().find(|p| p.lock().pid == pid).cloned()
}

/// Looks up a live thread by tid.
pub fn get_thread(tid: Pid) -> Option<Arc<IntMutex<Thread>>> {
	TABLES.lock().threads.iter().flatten().find(|t| t.lock().tid == tid).cloned()
}

/// The thread currently executing on this core, if the scheduler has
/// started one.
pub fn current() -> Option<Arc<IntMutex<Thread>>> {
	let tid = TABLES.lock().current?;
	get_thread(tid)
}

/// Called by the scheduler after loading a thread's context.
pub fn set_current(tid: Pid) {
	TABLES.lock().current = Some(tid);
}

/// The process owning the thread currently executing on this core, for
/// syscall handlers that need process-wide state rather than just the
/// calling thread's.
pub fn current_proc() -> Option<Arc<IntMutex<Process>>> {
	let pid = current()?.lock().owning_process?;
	get_process(pid)
}

/// Runs `f` with a read/iterate view of every live thread slot, for the
/// scheduler's tick and selection logic. Held only for the duration of
/// `f`; callers must not call back into another `TABLES`-locking
/// function from within it.
pub fn with_threads<R>(f: impl FnOnce(&[Option<Arc<IntMutex<Thread>>>; NTHREAD]) -> R) -> R {
	f(&TABLES.lock().threads)
}

/// Same as [`with_threads`], for processes.
pub fn with_processes<R>(f: impl FnOnce(&[Option<Arc<IntMutex<Process>>>; NPROC]) -> R) -> R {
	f(&TABLES.lock().processes)
}

/// Creates a new process with one thread (its `pid == tid`), parented to
/// `ppid`. `pdir_physical` is the freshly allocated, still-empty page
/// directory the caller has prepared (see [`vmem::new_address_space`]).
pub fn create_proc(
	ppid: Pid,
	pdir_physical: u32,
	kernel_stack_page: u32,
) -> Result<(Pid, Arc<IntMutex<Process>>, Arc<IntMutex<Thread>>), Errno> {
	let mut tables = TABLES.lock();
	let pid = tables.pids.alloc()?;
	let proc = Arc::new(IntMutex::new(Process::new(pid, ppid, pdir_physical)))?;
	let thread = Arc::new(IntMutex::new(Thread::new(pid, Some(pid), kernel_stack_page)))?;
	proc.lock().next_tid = pid + 1;
	proc.lock().thread_count = 1;

	let proc_slot = tables.processes.iter_mut().find(|s| s.is_none()).ok_or(errno::EAGAIN)?;
	*proc_slot = Some(proc.clone());
	let thread_slot = tables.threads.iter_mut().find(|s| s.is_none()).ok_or(errno::EAGAIN)?;
	*thread_slot = Some(thread.clone());

	Ok((pid, proc, thread))
}

/// Installs the init process (pid [`INIT_PID`], reserved at startup and
/// never handed out by [`PidAllocator::alloc`]) directly into the
/// process and thread tables, the way [`init_idle_thread`] installs the
/// idle thread outside the ordinary `create_proc` path. Called once
/// during kernel startup, before the scheduler's first `schedule()`;
/// init is its own parent, so [`reparent_orphans`] never has to chase a
/// parent further up than itself.
pub fn bootstrap_init(pdir_physical: u32, kernel_stack_page: u32) -> Result<(Arc<IntMutex<Process>>, Arc<IntMutex<Thread>>), Errno> {
	let proc = Arc::new(IntMutex::new(Process::new(INIT_PID, INIT_PID, pdir_physical)))?;
	let thread = Arc::new(IntMutex::new(Thread::new(INIT_PID, Some(INIT_PID), kernel_stack_page)))?;
	proc.lock().next_tid = INIT_PID + 1;
	proc.lock().thread_count = 1;

	let mut tables = TABLES.lock();
	let proc_slot = tables.processes.iter_mut().find(|s| s.is_none()).ok_or(errno::EAGAIN)?;
	*proc_slot = Some(proc.clone());
	let thread_slot = tables.threads.iter_mut().find(|s| s.is_none()).ok_or(errno::EAGAIN)?;
	*thread_slot = Some(thread.clone());

	Ok((proc, thread))
}

/// Adds an additional thread to an already-live process, for a future
/// `clone`-style entry point. Not reachable from any syscall this core
/// exposes today (only `fork` creates new schedulable contexts), kept so
/// `thread_count`/`next_tid` bookkeeping has exactly one call site.
pub fn create_thread(proc: &Arc<IntMutex<Process>>, kernel_stack_page: u32) -> Result<Arc<IntMutex<Thread>>, Errno> {
	let mut tables = TABLES.lock();
	let tid = {
		let mut p = proc.lock();
		let tid = p.next_tid;
		p.next_tid += 1;
		p.thread_count += 1;
		tid
	};
	let thread = Arc::new(IntMutex::new(Thread::new(tid, Some(proc.lock().pid), kernel_stack_page)))?;
	let slot = tables.threads.iter_mut().find(|s| s.is_none()).ok_or(errno::EAGAIN)?;
	*slot = Some(thread.clone());
	Ok(thread)
}

/// Removes a thread from the table once it has fully exited (its
/// process has been zombified, or this is a secondary thread of a
/// process that keeps running).
pub fn remove_thread(tid: Pid) {
	let mut tables = TABLES.lock();
	if let Some(slot) = tables.threads.iter_mut().find(|s| s.as_ref().is_some_and(|t| t.lock().tid == tid)) {
		*slot = None;
	}
}

/// Reparents every process whose parent is `old_parent` to init (pid 1).
/// Any orphan that is already a zombie gets `SIGCHLD` posted directly to
/// init, once per orphan, rather than through a loop variable that could
/// go stale after the reparenting loop ends.
pub fn reparent_orphans(old_parent: Pid) {
	let tables = TABLES.lock();
	let orphans: [Option<Arc<IntMutex<Process>>>; NPROC] = {
		const NO_PROC: Option<Arc<IntMutex<Process>>> = None;
		let mut out = [NO_PROC; NPROC];
		let mut n = 0;
		for p in tables.processes.iter().flatten() {
			if p.lock().ppid == old_parent {
				out[n] = Some(p.clone());
				n += 1;
			}
		}
		out
	};
	let init = tables.processes.iter().flatten().find(|p| p.lock().pid == INIT_PID).cloned();
	drop(tables);

	for orphan in orphans.iter().flatten() {
		let is_zombie = {
			let mut p = orphan.lock();
			p.ppid = INIT_PID;
			p.state == ProcState::Zombie
		};
		if is_zombie {
			if let Some(init) = &init {
				init.lock().signals.post(signal::SIGCHLD);
			}
		}
	}
}

/// Posts `sig` to `pid`'s pending bitfield, promotes a stopped process
/// to running on `SIGCONT`, and wakes any of its threads blocked
/// interruptibly. A `pid` with no live process is silently a no-op, as
/// the signal has nothing left to reach.
pub fn send_proc_signal(pid: Pid, sig: signal::SigNum) {
	let Some(proc) = get_process(pid) else {
		return;
	};
	{
		let mut p = proc.lock();
		p.signals.post(sig);
		if sig == signal::SIGCONT && p.state == ProcState::Stopped {
			p.state = ProcState::Running;
		}
	}
	scheduler::wake_proc(pid);
}

/// Frees a zombie process's table slot and pid after `waitpid` has
/// reaped it.
pub fn reap(pid: Pid) {
	let mut tables = TABLES.lock();
	if let Some(slot) = tables.processes.iter_mut().find(|s| s.as_ref().is_some_and(|p| p.lock().pid == pid)) {
		*slot = None;
	}
	tables.pids.free(pid);
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn create_proc_assigns_distinct_pids() {
		let (pid1, ..) = create_proc(INIT_PID, 0, 0).unwrap();
		let (pid2, ..) = create_proc(INIT_PID, 0, 0).unwrap();
		assert_ne!(pid1, pid2);
		reap(pid1);
		reap(pid2);
	}

	#[test_case]
	fn get_process_finds_created_proc() {
		let (pid, ..) = create_proc(INIT_PID, 0, 0).unwrap();
		assert!(get_process(pid).is_some());
		reap(pid);
		assert!(get_process(pid).is_none());
	}

	#[test_case]
	fn reparent_orphans_targets_init() {
		let (parent_pid, ..) = create_proc(INIT_PID, 0, 0).unwrap();
		let (child_pid, child, _) = create_proc(parent_pid, 0, 0).unwrap();
		child.lock().state = ProcState::Zombie;
		reparent_orphans(parent_pid);
		assert_eq!(child.lock().ppid, INIT_PID);
		reap(parent_pid);
		reap(child_pid);
	}
}
