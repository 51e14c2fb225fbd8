//! Fork and exec: the two operations that create a new schedulable
//! context from an old one, wholesale (`fork`) or in place (`execve`).
//!
//! Grounded in `examples/maestro-os-maestro/src/process/mod.rs`'s `fork()` (clone
//! mem space, fd table, signal dispositions, allocate a pid) and
//! `examples/maestro-os-maestro/src/syscall/fork.rs`'s thin-wrapper shape, reduced
//! to this core's scope: no vfork, no shared memory/fd/sighand options,
//! one thread per process.

use crate::elf;
use crate::errno::{self, Errno};
use crate::fs::{self, InodeRef};
use crate::memory::vmem;
use crate::memory::PAGE_SIZE;
use crate::process::mem_space::{STACK, WRITABLE};
use crate::process::regs::Regs;
use crate::process::scheduler;
use crate::process::uaccess;
use crate::process::{self, Pid, Process, Thread, ThreadState};
use crate::util::lock::IntMutex;
use crate::util::ptr::arc::Arc;

/// Forks `parent`'s process and its single calling thread: a child
/// address space copy-on-write sharing every non-`SHARED` mapping, a
/// duplicated file descriptor table, inherited signal dispositions and
/// job-control identity, and a child kernel stack primed with the
/// parent's current trap frame but `eax = 0` so that the child, once
/// scheduled, returns from this same syscall with `0` while the parent
/// returns with the child's pid.
pub fn fork(parent: &Arc<IntMutex<Process>>, parent_regs: &Regs) -> Result<Pid, Errno> {
	let child_pdir = vmem::new_address_space()?;
	let parent_pid = parent.lock().pid;

	let (child_pid, child_proc, child_thread) = match process::create_proc(parent_pid, child_pdir, 0) {
		Ok(v) => v,
		Err(e) => {
			vmem::free_address_space(child_pdir);
			return Err(e);
		}
	};

	if let Err(e) = setup_child(parent, &child_proc, &child_thread) {
		process::remove_thread(child_pid);
		process::reap(child_pid);
		vmem::free_address_space(child_pdir);
		return Err(e);
	}

	let mut regs = *parent_regs;
	regs.eax = 0;
	let mut t = child_thread.lock();
	t.regs = regs;
	t.start_user = true;
	t.state = ThreadState::Running;
	drop(t);

	Ok(child_pid)
}

/// The fallible half of `fork`: everything that can still be cleanly
/// unwound if it fails partway through, since nothing about the parent
/// or the scheduler tables has been committed to running the child yet.
fn setup_child(parent: &Arc<IntMutex<Process>>, child_proc: &Arc<IntMutex<Process>>, child_thread: &Arc<IntMutex<Thread>>) -> Result<(), Errno> {
	let stack_top = process::alloc_kernel_stack(child_proc.lock().pid)?;
	{
		let mut t = child_thread.lock();
		t.kernel_stack_page = stack_top - PAGE_SIZE as u32;
		t.tss_esp0 = stack_top;
	}

	{
		let p = parent.lock();
		let mut c = child_proc.lock();
		p.mem_space.fork_into(&mut c.mem_space)?;
	}

	let p = parent.lock();
	let mut c = child_proc.lock();
	c.pgid = p.pgid;
	c.sid = p.sid;
	c.uid = p.uid;
	c.gid = p.gid;
	c.euid = p.euid;
	c.egid = p.egid;
	c.umask = p.umask;
	c.fd_table = p.fd_table.fork();
	c.signals = p.signals.fork_for_child();
	if let Some(cwd) = p.cwd_inode {
		let (inode, _) = fs::inode_get(cwd.dev, cwd.inum)?;
		c.cwd_inode = Some(inode);
	}
	if let Some(exe) = p.exe_inode {
		let (inode, _) = fs::inode_get(exe.dev, exe.inum)?;
		c.exe_inode = Some(inode);
	}
	Ok(())
}

/// Resolves `path` one component at a time via `inode_lookup`, starting
/// from `root` for an absolute path or `cwd` for a relative one. The
/// MINIX-v1 collaborator only resolves single components, so walking the
/// full path is this core's job.
pub(crate) fn resolve_path(cwd: InodeRef, root: InodeRef, path: &[u8]) -> Result<InodeRef, Errno> {
	let mut cur = if path.first() == Some(&b'/') { root } else { cwd };
	for component in path.split(|&b| b == b'/').filter(|c| !c.is_empty()) {
		cur = fs::inode_lookup(cur, component)?;
	}
	Ok(cur)
}

static ROOT_INODE: IntMutex<Option<InodeRef>> = IntMutex::new(None);
static ROOT_DEV_OVERRIDE: IntMutex<Option<fs::DevId>> = IntMutex::new(None);

/// Overrides the device [`root_inode`] mounts, per a `-root` command-line
/// argument. Must be called, if at all, before the first call to
/// [`root_inode`]; a mount already cached from [`fs::ROOT_DEV`] is not
/// retried against a later override.
pub(crate) fn set_root_dev(dev: fs::DevId) {
	*ROOT_DEV_OVERRIDE.lock() = Some(dev);
}

/// Mounts and caches the root file system's inode on first use.
pub(crate) fn root_inode() -> Result<InodeRef, Errno> {
	let mut slot = ROOT_INODE.lock();
	if let Some(root) = *slot {
		return Ok(root);
	}
	let dev = ROOT_DEV_OVERRIDE.lock().unwrap_or(fs::ROOT_DEV);
	let root = fs::mount(dev)?;
	*slot = Some(root);
	Ok(root)
}

/// Size of the fixed buffer `execve` reads the ELF header and program
/// header table into; segment contents are never read here, only
/// demand-paged in later by the fault handler.
const HEADER_BUF_LEN: usize = 512;

/// Top of user virtual address space; everything from here up is the
/// kernel-shared half of every address space (see
/// `crate::memory::vmem`'s `KERNEL_DIRENT_BASE`).
const USER_SPACE_TOP: u32 = 0x8000_0000;

fn round_up_page(n: u32) -> u32 {
	(n + PAGE_SIZE as u32 - 1) & !(PAGE_SIZE as u32 - 1)
}

/// Replaces the calling process's image with the executable at `path`.
///
/// `regs` is the live trap frame `syscall_entry.s` built for this very
/// syscall, not a copy — rewriting its `eip`/`esp`/`eflags` here is what
/// makes the pending `iret` land in the new image instead of returning to
/// the caller of `execve` the ordinary way, since this is the same thread
/// continuing, not a fresh one being dispatched by the scheduler.
///
/// `argv`/`envp` are accepted, per the syscall ABI, as raw user pointers
/// but are not walked or copied onto the new stack here: marshalling an
/// argument vector is meaningless without a userland C runtime to hand it
/// to, which this core does not provide.
pub fn execve(proc: &Arc<IntMutex<Process>>, regs: &mut Regs, path_ptr: u32, _argv: u32, _envp: u32) -> Result<(), Errno> {
	let (path_buf, path_len) = uaccess::read_cstr(path_ptr)?;
	*regs = load_image(proc, &path_buf[..path_len])?;
	Ok(())
}

/// Installs `init` (already sitting in the process/thread tables via
/// [`process::bootstrap_init`], with no prior image of its own to
/// replace) with the binary at `path`, the one piece of [`load_image`]
/// that differs from an ordinary `execve`: there is no live trap frame
/// to rewrite in place, just a freshly created thread to hand a cold-
/// start entry point to, the same way [`fork`]'s `setup_child` does for
/// a new child.
pub fn bootstrap_exec(proc: &Arc<IntMutex<Process>>, thread: &Arc<IntMutex<Thread>>, path: &[u8]) -> Result<(), Errno> {
	let regs = load_image(proc, path)?;
	let mut t = thread.lock();
	t.regs = regs;
	t.start_user = true;
	t.state = ThreadState::Running;
	Ok(())
}

/// Loads the ELF binary at `path` into `proc`'s address space, replacing
/// whatever was mapped there, and returns the initial register file a
/// cold-started or resumed thread should run with. Shared by [`execve`]
/// (which copies it over a live trap frame) and [`bootstrap_exec`]
/// (which copies it into a thread that has never yet run).
fn load_image(proc: &Arc<IntMutex<Process>>, path: &[u8]) -> Result<Regs, Errno> {
	let root = root_inode()?;
	let cwd = proc.lock().cwd_inode.unwrap_or(root);
	let target = resolve_path(cwd, root, path)?;
	let (file_inode, attr) = fs::inode_get(target.dev, target.inum)?;

	if attr.is_dir() {
		fs::inode_put(file_inode);
		return Err(errno::EACCES);
	}

	let mut header_buf = [0u8; HEADER_BUF_LEN];
	let n = match fs::inode_read(file_inode, &mut header_buf, 0) {
		Ok(n) => n,
		Err(e) => {
			fs::inode_put(file_inode);
			return Err(e);
		}
	};
	let image = match elf::Image::parse(&header_buf[..n]) {
		Ok(img) => img,
		Err(e) => {
			fs::inode_put(file_inode);
			return Err(e);
		}
	};
	if let Err(e) = image.validate_segments(attr.size) {
		fs::inode_put(file_inode);
		return Err(e);
	}
	for ph in image.load_segments() {
		if ph.p_vaddr % PAGE_SIZE as u32 != 0 {
			fs::inode_put(file_inode);
			return Err(errno::ENOEXEC);
		}
	}

	let load_count = image.load_segments().count();
	if load_count == 0 {
		fs::inode_put(file_inode);
		return Err(errno::ENOEXEC);
	}
	if load_count + 1 > crate::config::MAX_MEMORY_MAPS {
		fs::inode_put(file_inode);
		return Err(errno::ENOMEM);
	}

	// Past this point the old image is gone; every step below is expected
	// to succeed (guaranteed by the capacity check just above), so a
	// failure here can no longer be reported back through the still-live
	// trap frame and instead kills the process outright.
	scheduler::stop_other_threads();

	{
		let mut p = proc.lock();
		p.mem_space.free();
		p.mem_space.clear();
	}

	{
		let mut p = proc.lock();
		for ph in image.load_segments() {
			let flags = if ph.writable() { WRITABLE } else { 0 };
			let size = round_up_page(ph.p_memsz);
			if p.mem_space.add_mapping(ph.p_vaddr, size, flags, ph.p_offset as u64, ph.p_filesz, Some(file_inode)).is_err() {
				drop(p);
				scheduler::terminate(128 + crate::process::signal::SIGSEGV as u8);
			}
		}
		let stack_size = crate::config::USER_STACK_SIZE as u32;
		let stack_base = USER_SPACE_TOP - stack_size;
		if p.mem_space.add_mapping(stack_base, stack_size, WRITABLE | STACK, 0, 0, None).is_err() {
			drop(p);
			scheduler::terminate(128 + crate::process::signal::SIGSEGV as u8);
		}
	}

	{
		let mut p = proc.lock();
		if let Some(old_exe) = p.exe_inode.replace(file_inode) {
			fs::inode_put(old_exe);
		}
		p.rtime = 0;
		p.ktime = 0;
		p.utime = 0;
		p.next_tid = p.pid + 1;
		p.thread_count = 1;
		p.signals.reset_dispositions();
		p.fd_table.close_on_exec();
	}

	Ok(Regs {
		ebp: 0,
		esp: USER_SPACE_TOP - crate::config::REDZONE_SIZE as u32,
		eip: image.entry(),
		eflags: crate::process::regs::DEFAULT_EFLAGS,
		eax: 0,
		ebx: 0,
		ecx: 0,
		edx: 0,
	})
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn round_up_page_rounds_partial_page() {
		assert_eq!(round_up_page(1), PAGE_SIZE as u32);
		assert_eq!(round_up_page(PAGE_SIZE as u32), PAGE_SIZE as u32);
		assert_eq!(round_up_page(PAGE_SIZE as u32 + 1), 2 * PAGE_SIZE as u32);
	}

	#[test_case]
	fn resolve_path_absolute_starts_at_root() {
		let root = InodeRef { dev: 0x200, inum: 1 };
		let cwd = InodeRef { dev: 0x200, inum: 7 };
		assert_eq!(resolve_path(cwd, root, b"/"), Ok(root));
	}
}
