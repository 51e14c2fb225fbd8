//! The virtual memory manager for the currently loaded address space.
//!
//! The page directory maps itself at directory entry 1, so virtual
//! addresses `0x0040_0000..0x0080_0000` always resolve to the 1024 page
//! tables of whatever address space is currently loaded in `cr3`, and
//! `0x0040_0000 + DIRENT * 0x1000` resolves to the directory itself. This
//! lets the manager below walk and edit page tables with ordinary loads
//! and stores instead of temporary mappings, at the cost of only ever
//! being able to see the *currently active* address space — operations on
//! another process's memory (`fork_memory`, `free_process_memory`) must
//! run while that process's directory is loaded.
//!
//! Grounded in `mm.c`'s `map_page`/`alloc_page`/`free_page`/`vtophys`/
//! `cowpage`/`fork_memory`/`pagefault`; the per-process memory-map record
//! bookkeeping these build on lives in [`crate::process::mem_space`].

use crate::errno::{AllocError, Errno};
use crate::errno;
use crate::memory::{phys, PAGE_SIZE};
use crate::util::lock::IntMutex;

/// Number of page table entries per table, and directory entries per
/// directory.
const ENTRIES: usize = 1024;

/// Page is present in physical memory.
pub const PAGE_PRESENT: u32 = 1 << 0;
/// Page is writable; absent means read-only.
pub const PAGE_WRITABLE: u32 = 1 << 1;
/// Page is accessible from user mode; absent means kernel-only.
pub const PAGE_USER: u32 = 1 << 2;
/// Software bit (an unused hardware bit, 9) marking a page read-only
/// because it is shared copy-on-write, not because it is meant to stay
/// read-only.
pub const PAGE_COPYONWRITE: u32 = 1 << 9;

const FLAGS_MASK: u32 = PAGE_SIZE as u32 - 1;

/// Directory entry index 1 is reserved for the self-referential mapping.
const SELFREF_DIRENT: usize = 1;
/// Base virtual address of the page-table window (directory entry 1).
const PTABS_BASE: u32 = 0x0040_0000;
/// One scratch page, at the top of the address space, used to map a
/// fresh frame temporarily during copy-on-write duplication and
/// cross-process directory cloning.
const SCRATCH_PAGE: u32 = 0xffff_f000;
/// User mappings live below entry 512; entries 512..1024 (0x8000_0000 and
/// up) are reserved for the kernel and are shared verbatim, never copied,
/// by every address space.
const KERNEL_DIRENT_BASE: usize = 512;

#[inline(always)]
fn dirent(vaddr: u32) -> usize {
	(vaddr >> 22) as usize
}

#[inline(always)]
fn tabent(vaddr: u32) -> usize {
	((vaddr >> 12) & 0x3ff) as usize
}

fn pdir() -> &'static mut [u32; ENTRIES] {
	unsafe { &mut *((PTABS_BASE + (SELFREF_DIRENT as u32) * PAGE_SIZE as u32) as *mut [u32; ENTRIES]) }
}

fn ptab(dirent: usize) -> &'static mut [u32; ENTRIES] {
	unsafe { &mut *((PTABS_BASE + (dirent as u32) * PAGE_SIZE as u32) as *mut [u32; ENTRIES]) }
}

/// Serializes all directory/table edits against the timer ISR and other
/// threads sharing this address space. Mirrors `mm.c`'s `mm_lock`, taken
/// by the process owning the address space before any call in this
/// module touches it.
pub static MM_LOCK: IntMutex<()> = IntMutex::new(());

/// Flushes the whole TLB by reloading `cr3`.
pub fn flush() {
	unsafe { super::tlb_reload() };
}

/// Returns the physical frame backing `vaddr` in the current address
/// space, or `None` if the containing page table is not present.
pub fn resolve(vaddr: u32) -> Option<u32> {
	if pdir()[dirent(vaddr)] & PAGE_PRESENT == 0 {
		return None;
	}
	Some(ptab(dirent(vaddr))[tabent(vaddr)] & !FLAGS_MASK)
}

/// Returns the raw flag bits of `vaddr`'s page table entry, or 0 if its
/// page table is not present (and so the page itself cannot be, either).
pub fn entry_flags(vaddr: u32) -> u32 {
	if pdir()[dirent(vaddr)] & PAGE_PRESENT == 0 {
		return 0;
	}
	ptab(dirent(vaddr))[tabent(vaddr)] & FLAGS_MASK
}

/// Returns whether `vaddr` is backed by a present page.
pub fn is_present(vaddr: u32) -> bool {
	entry_flags(vaddr) & PAGE_PRESENT != 0
}

/// Maps `paddr` at `vaddr` with `flags`, allocating a fresh page table if
/// the covering directory entry is not yet present.
pub fn map(vaddr: u32, paddr: u32, flags: u32) -> Result<(), AllocError> {
	let de = dirent(vaddr);
	if pdir()[de] & PAGE_PRESENT == 0 {
		let table_frame = phys::alloc()?;
		pdir()[de] = phys::frame_to_addr(table_frame) | PAGE_PRESENT | PAGE_WRITABLE | PAGE_USER;
		flush();
		ptab(de).fill(0);
	}
	ptab(de)[tabent(vaddr)] = (paddr & !FLAGS_MASK) | PAGE_PRESENT | flags;
	flush();
	Ok(())
}

/// Allocates a fresh physical frame and maps it at `vaddr`.
pub fn alloc_page(vaddr: u32, flags: u32) -> Result<(), AllocError> {
	let frame = phys::alloc()?;
	map(vaddr, phys::frame_to_addr(frame), flags)
}

/// Unmaps `vaddr` and releases its backing frame back to the pool (via
/// refcounting, so a still-shared copy-on-write page stays resident).
pub fn free_page(vaddr: u32) {
	let de = dirent(vaddr);
	if pdir()[de] & PAGE_PRESENT == 0 {
		return;
	}
	let entry = &mut ptab(de)[tabent(vaddr)];
	let frame = phys::addr_to_frame(*entry & !FLAGS_MASK);
	*entry &= !PAGE_PRESENT;
	phys::put(frame);
	flush();
}

/// Unmaps `vaddr` without touching its backing frame's reference count.
/// For a scratch mapping used only to write through to a frame that is
/// being kept alive under a different, real mapping (or whose lifetime
/// the caller otherwise owns) — unlike [`free_page`], which would wrongly
/// drop the very reference the caller just established.
fn unmap_scratch(vaddr: u32) {
	let de = dirent(vaddr);
	if pdir()[de] & PAGE_PRESENT == 0 {
		return;
	}
	ptab(de)[tabent(vaddr)] &= !PAGE_PRESENT;
	flush();
}

/// Marks `vaddr` writable or read-only in place, without touching its
/// backing frame. Used to re-protect a lazily loaded text page after its
/// contents are read in, and to drop write access when marking a page
/// copy-on-write.
pub fn set_writable(vaddr: u32, writable: bool) {
	let de = dirent(vaddr);
	if pdir()[de] & PAGE_PRESENT == 0 {
		return;
	}
	let entry = &mut ptab(de)[tabent(vaddr)];
	if writable {
		*entry |= PAGE_WRITABLE;
	} else {
		*entry &= !PAGE_WRITABLE;
	}
	flush();
}

/// Marks `vaddr` copy-on-write: clears its writable bit, sets the
/// software copy-on-write bit, and bumps its frame's reference count.
/// Used by `fork_memory` on both the parent's and (implicitly, by virtue
/// of the child sharing the same frames) the child's mapping.
fn mark_cow(vaddr: u32) {
	let flags = entry_flags(vaddr);
	if flags & PAGE_PRESENT == 0 {
		return;
	}
	let de = dirent(vaddr);
	if flags & PAGE_WRITABLE != 0 {
		let entry = &mut ptab(de)[tabent(vaddr)];
		*entry &= !PAGE_WRITABLE;
		*entry |= PAGE_COPYONWRITE;
	}
	let frame = phys::addr_to_frame(ptab(de)[tabent(vaddr)] & !FLAGS_MASK);
	phys::get(frame);
}

/// Reverses a single [`mark_cow`]: restores the writable bit if this was
/// the only owner and drops the frame's extra reference. Used to unwind
/// `fork_memory` when a later step fails partway through.
fn unmark_cow(vaddr: u32) {
	let flags = entry_flags(vaddr);
	if flags & PAGE_PRESENT == 0 {
		return;
	}
	let de = dirent(vaddr);
	let frame = phys::addr_to_frame(ptab(de)[tabent(vaddr)] & !FLAGS_MASK);
	let shared = phys::put(frame);
	if !shared && flags & PAGE_COPYONWRITE != 0 {
		let entry = &mut ptab(de)[tabent(vaddr)];
		*entry &= !PAGE_COPYONWRITE;
		*entry |= PAGE_WRITABLE;
	}
}

/// A second scratch page, one below [`SCRATCH_PAGE`], used to hold a
/// not-currently-loaded process's page directory steady for the
/// duration of [`fork_memory`] while [`SCRATCH_PAGE`] itself cycles
/// through each cloned page table.
const SCRATCH_PAGE2: u32 = 0xffff_e000;

/// Allocates and initializes a fresh page directory for a new process:
/// a physical frame, self-referenced at its own entry 1, with every
/// kernel directory entry ([`KERNEL_DIRENT_BASE`] and up) cloned from
/// the currently loaded address space so the new process shares the
/// kernel's mappings from the moment it is first loaded. Returns the
/// new directory's physical address; no user entries are populated
/// (the caller adds mappings before ever switching `cr3` to it).
pub fn new_address_space() -> Result<u32, Errno> {
	let _guard = MM_LOCK.lock();

	let dir_frame = phys::alloc()?;
	let dir_phys = phys::frame_to_addr(dir_frame);
	map(SCRATCH_PAGE, dir_phys, PAGE_WRITABLE)?;
	let scratch = unsafe { &mut *(SCRATCH_PAGE as *mut [u32; ENTRIES]) };
	scratch.fill(0);
	scratch[SELFREF_DIRENT] = dir_phys | PAGE_PRESENT | PAGE_WRITABLE;
	for de in KERNEL_DIRENT_BASE..ENTRIES {
		scratch[de] = pdir()[de];
	}
	unmap_scratch(SCRATCH_PAGE);
	flush();
	Ok(dir_phys)
}

/// Releases a process's page directory frame itself, once it is no
/// longer loaded anywhere (called by `waitpid`'s reap step, after
/// [`free_process_memory`] has already released the directory's
/// contents while it was still the loaded address space).
pub fn free_address_space(dir_phys: u32) {
	phys::put(phys::addr_to_frame(dir_phys));
}

/// Describes the range of user virtual address space an address space
/// occupies, as recorded per-process in [`crate::process::mem_space`].
/// Only text/data/stack are copy-on-write-shared by `fork_memory`; heap
/// and explicit mappings are walked from the process's own mapping list
/// by the caller.
#[derive(Clone, Copy)]
pub struct Range {
	pub start: u32,
	pub end: u32,
}

/// Marks every present page in `ranges` copy-on-write in the currently
/// loaded (parent) address space, then clones every present user
/// directory entry below [`KERNEL_DIRENT_BASE`] (the kernel-reserved
/// ones are identical in every address space and never copied) into
/// `child_pdir_phys`'s directory, each with a freshly allocated page
/// table sharing the same leaf mappings.
///
/// `child_pdir_phys` need not be (and, for a process being forked,
/// cannot be) the currently loaded directory — it is held steady at
/// [`SCRATCH_PAGE2`] for the duration of this call while [`SCRATCH_PAGE`]
/// itself cycles through each cloned page table.
///
/// On an allocation failure partway through, every directory entry
/// already duplicated into the child's directory is torn down and every
/// copy-on-write mark already applied by this call is undone, leaving
/// both address spaces exactly as they were before the call.
pub fn fork_memory(ranges: &[Range], child_pdir_phys: u32) -> Result<(), Errno> {
	let _guard = MM_LOCK.lock();

	for range in ranges {
		let mut addr = range.start;
		while addr < range.end {
			mark_cow(addr);
			addr = addr.wrapping_add(PAGE_SIZE as u32);
		}
	}

	let mut cloned_to = 0usize;
	let result = (|| -> Result<(), AllocError> {
		map(SCRATCH_PAGE2, child_pdir_phys, PAGE_WRITABLE)?;
		let child_pdir = unsafe { &mut *(SCRATCH_PAGE2 as *mut [u32; ENTRIES]) };

		for de in 0..KERNEL_DIRENT_BASE {
			if de == SELFREF_DIRENT {
				continue;
			}
			if pdir()[de] & PAGE_PRESENT == 0 {
				continue;
			}
			let table_frame = phys::alloc()?;
			map(SCRATCH_PAGE, phys::frame_to_addr(table_frame), PAGE_WRITABLE)?;
			let src = &ptab(de)[..];
			unsafe {
				core::ptr::copy_nonoverlapping(
					src.as_ptr(),
					SCRATCH_PAGE as *mut u32,
					ENTRIES,
				);
			}
			child_pdir[de] = phys::frame_to_addr(table_frame) | PAGE_PRESENT | PAGE_USER | PAGE_WRITABLE;
			unmap_scratch(SCRATCH_PAGE);
			cloned_to = de + 1;
		}
		Ok(())
	})();

	if let Err(e) = result {
		let child_pdir = unsafe { &mut *(SCRATCH_PAGE2 as *mut [u32; ENTRIES]) };
		for de in 0..cloned_to {
			if child_pdir[de] & PAGE_PRESENT != 0 {
				let frame = phys::addr_to_frame(child_pdir[de] & !FLAGS_MASK);
				phys::put(frame);
				child_pdir[de] = 0;
			}
		}
		unmap_scratch(SCRATCH_PAGE2);
		for range in ranges {
			let mut addr = range.start;
			while addr < range.end {
				unmark_cow(addr);
				addr = addr.wrapping_add(PAGE_SIZE as u32);
			}
		}
		flush();
		return Err(e.into());
	}

	unmap_scratch(SCRATCH_PAGE2);
	flush();
	Ok(())
}

/// Frees every present page in `ranges` from the currently loaded address
/// space, then releases every user page table (directory entries below
/// [`KERNEL_DIRENT_BASE`]) back to the physical pool. Run while the
/// exiting process's directory is still loaded.
pub fn free_process_memory(ranges: &[Range]) {
	let _guard = MM_LOCK.lock();

	for range in ranges {
		let mut addr = range.start;
		while addr < range.end {
			free_page(addr);
			addr = addr.wrapping_add(PAGE_SIZE as u32);
		}
	}

	for de in 0..KERNEL_DIRENT_BASE {
		if de == SELFREF_DIRENT {
			continue;
		}
		if pdir()[de] & PAGE_PRESENT != 0 {
			let frame = phys::addr_to_frame(pdir()[de] & !FLAGS_MASK);
			phys::put(frame);
			pdir()[de] = 0;
		}
	}

	flush();
}

/// The outcome of handling a page fault, telling the caller (the fault
/// ISR) what to do next.
pub enum FaultAction {
	/// The fault was resolved; the faulting instruction should retry.
	Resolved,
	/// The fault is not resolvable here (bad user address, or a kernel
	/// mode fault); the caller should deliver `SIGSEGV` to the faulting
	/// thread, or panic if the fault was in kernel mode.
	Unhandled,
}

/// What a faulting address may have meant, supplied by the process's
/// memory-map lookup (`crate::process::mem_space`) so this module does
/// not need to know about executable headers or mapping records itself.
pub enum FaultIntent {
	/// No mapping covers the faulting address.
	Unmapped,
	/// The address falls in a demand-paged region backed by bytes at
	/// `file_offset` (the caller already resolved the containing
	/// segment/mapping and is responsible for reading `len` bytes into
	/// the newly mapped page via the inode read surface).
	DemandPage { file_offset: u64, len: usize, writable: bool },
	/// The address is one page below the current top of an automatically
	/// growing stack.
	GrowStack,
}

/// Implements the four-step page fault policy: a not-present fault in a
/// demand-paged region allocates and is filled in by the caller via the
/// returned [`FaultAction`]; a not-present fault one page below the
/// current stack top grows it; a write fault on a copy-on-write page
/// either reclaims sole ownership in place or copies to a fresh frame;
/// anything else is unhandled and must be signaled to the faulting
/// thread (user mode) or is a kernel bug (kernel mode).
///
/// `fill` is called with the virtual address to fill exactly when a new
/// page was just mapped for a [`FaultIntent::DemandPage`], so the caller
/// can perform the actual inode read without this module depending on
/// the filesystem surface.
pub fn handle_fault(
	addr: u32,
	write: bool,
	present: bool,
	intent: impl FnOnce(u32) -> FaultIntent,
	fill: impl FnOnce(u32, u64, usize) -> Result<(), Errno>,
) -> Result<FaultAction, Errno> {
	let _guard = MM_LOCK.lock();
	let page = addr & !FLAGS_MASK;

	if !present {
		return match intent(page) {
			FaultIntent::DemandPage { file_offset, len, writable } => {
				let map_flags = PAGE_USER | PAGE_WRITABLE;
				alloc_page(page, map_flags).map_err(|_| errno::ENOMEM)?;
				fill(page, file_offset, len)?;
				if !writable {
					set_writable(page, false);
				}
				Ok(FaultAction::Resolved)
			}
			FaultIntent::GrowStack => {
				alloc_page(page, PAGE_USER | PAGE_WRITABLE).map_err(|_| errno::ENOMEM)?;
				Ok(FaultAction::Resolved)
			}
			FaultIntent::Unmapped => Ok(FaultAction::Unhandled),
		};
	}

	if write && entry_flags(page) & PAGE_COPYONWRITE != 0 {
		let frame = phys::addr_to_frame(resolve(page).unwrap());
		if !phys::is_shared(frame) {
			let de = dirent(page);
			let entry = &mut ptab(de)[tabent(page)];
			*entry &= !PAGE_COPYONWRITE;
			*entry |= PAGE_WRITABLE;
		} else {
			let new_frame = phys::alloc().map_err(|_| errno::ENOMEM)?;
			map(SCRATCH_PAGE, phys::frame_to_addr(new_frame), PAGE_WRITABLE).map_err(|_| errno::ENOMEM)?;
			unsafe {
				core::ptr::copy_nonoverlapping(page as *const u8, SCRATCH_PAGE as *mut u8, PAGE_SIZE);
			}
			let de = dirent(page);
			phys::put(frame);
			ptab(de)[tabent(page)] = phys::frame_to_addr(new_frame) | PAGE_PRESENT | PAGE_USER | PAGE_WRITABLE;
			unmap_scratch(SCRATCH_PAGE);
		}
		flush();
		return Ok(FaultAction::Resolved);
	}

	Ok(FaultAction::Unhandled)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn dirent_tabent_split_recombine() {
		let vaddr: u32 = 0x0804_2018;
		let de = dirent(vaddr);
		let te = tabent(vaddr);
		let offset = vaddr & FLAGS_MASK;
		assert_eq!(((de as u32) << 22) | ((te as u32) << 12) | offset, vaddr);
	}

	#[test_case]
	fn selfref_dirent_is_excluded_from_kernel_base() {
		assert!(SELFREF_DIRENT < KERNEL_DIRENT_BASE);
	}
}
