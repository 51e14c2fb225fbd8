//! Per-process memory-map records: the declarative description of a
//! process's address space that the page-fault handler materializes on
//! demand, and the glue between a process and [`crate::memory::vmem`].
//!
//! Grounded in spec's memory-map record shape and `mm.c`'s
//! `fork_memory`/`free_proc_memory`, which walk `text_base..data_top` and
//! `stack_base..0xfffff000` directly; here those two hardcoded ranges
//! become an explicit, inspectable array of records instead.

use crate::config::MAX_MEMORY_MAPS;
use crate::errno::{self, Errno};
use crate::fs::InodeRef;
use crate::memory::vmem::{self, Range};
use crate::memory::PAGE_SIZE;

/// A mapping is read-only unless `WRITABLE` is set.
pub const WRITABLE: u8 = 1 << 0;
/// The mapping is a stack: a fault one page below `base` grows it
/// downward instead of being treated as unmapped.
pub const STACK: u8 = 1 << 1;
/// The mapping is shared (e.g. across future `mmap(MAP_SHARED)`-style
/// use); `fork_memory` does not mark shared mappings copy-on-write since
/// both address spaces must keep observing each other's writes.
pub const SHARED: u8 = 1 << 2;

/// A declarative description of one contiguous region of a process's
/// virtual address space.
#[derive(Clone, Copy)]
pub struct Mapping {
	pub base: u32,
	pub size: u32,
	pub flags: u8,
	pub file_offset: u64,
	pub file_size: u32,
	pub inode: Option<InodeRef>,
}

impl Mapping {
	fn end(&self) -> u32 {
		self.base + self.size
	}

	fn contains(&self, addr: u32) -> bool {
		addr >= self.base && addr < self.end()
	}
}

/// The set of memory-map records describing a process's address space,
/// plus the physical address of its page directory.
pub struct MemSpace {
	mappings: [Option<Mapping>; MAX_MEMORY_MAPS],
	count: usize,
	/// Physical address of this process's page directory, loaded into
	/// `cr3` when it is scheduled. While this is the currently loaded
	/// address space, [`vmem`]'s self-referential window gives direct
	/// access to its contents; [`MemSpace::fork_into`]/[`MemSpace::free`]
	/// work purely off this physical address so they also work on a
	/// child directory that is not (yet) loaded anywhere.
	pub pdir_physical: u32,
}

impl MemSpace {
	/// Creates an empty address space description for a freshly
	/// allocated page directory at `pdir_physical`.
	pub const fn new(pdir_physical: u32) -> Self {
		Self {
			mappings: [None; MAX_MEMORY_MAPS],
			count: 0,
			pdir_physical,
		}
	}

	/// Records a new mapping without allocating any pages for it. Returns
	/// `ENOMEM` if the mapping table is full, `EINVAL` if it overlaps an
	/// existing record.
	pub fn add_mapping(
		&mut self,
		base: u32,
		size: u32,
		flags: u8,
		file_offset: u64,
		file_size: u32,
		inode: Option<InodeRef>,
	) -> Result<(), Errno> {
		let end = base + size;
		for m in self.mappings.iter().flatten() {
			if base < m.end() && m.base < end {
				return Err(errno::EINVAL);
			}
		}
		let slot = self.mappings.iter_mut().find(|m| m.is_none()).ok_or(errno::ENOMEM)?;
		*slot = Some(Mapping {
			base,
			size,
			flags,
			file_offset,
			file_size,
			inode,
		});
		self.count += 1;
		Ok(())
	}

	/// Returns the mapping containing `addr`, if any.
	pub fn find(&self, addr: u32) -> Option<&Mapping> {
		self.mappings.iter().flatten().find(|m| m.contains(addr))
	}

	fn find_mut(&mut self, addr: u32) -> Option<&mut Mapping> {
		self.mappings.iter_mut().flatten().find(|m| m.contains(addr))
	}

	/// Grows a `STACK` mapping down by one page, for the next-fault
	/// policy described in the page-fault handler.
	pub fn grow_stack_down(&mut self, addr: u32) {
		if let Some(m) = self.find_mut(addr) {
			if m.flags & STACK != 0 {
				let grown = PAGE_SIZE as u32;
				m.base -= grown;
				m.size += grown;
			}
		}
	}

	/// Returns an iterator over all live mappings.
	pub fn mappings(&self) -> impl Iterator<Item = &Mapping> {
		self.mappings.iter().flatten()
	}

	/// Clears every mapping record (used by `execve`, after the old
	/// image's pages are already freed).
	pub fn clear(&mut self) {
		self.mappings = [None; MAX_MEMORY_MAPS];
		self.count = 0;
	}

	/// Ranges eligible for copy-on-write sharing on fork: every mapping
	/// that is not `SHARED`.
	fn cow_ranges(&self) -> ([Range; MAX_MEMORY_MAPS], usize) {
		let mut ranges = [Range { start: 0, end: 0 }; MAX_MEMORY_MAPS];
		let mut n = 0;
		for m in self.mappings() {
			if m.flags & SHARED == 0 {
				ranges[n] = Range {
					start: m.base,
					end: m.base + m.size,
				};
				n += 1;
			}
		}
		(ranges, n)
	}

	/// Clones this address space's mapping records into `child` verbatim,
	/// then copy-on-write shares the underlying pages via
	/// [`vmem::fork_memory`]. Must run while this process's directory is
	/// the one currently loaded.
	pub fn fork_into(&self, child: &mut MemSpace) -> Result<(), Errno> {
		child.mappings = self.mappings;
		child.count = self.count;
		let (ranges, n) = self.cow_ranges();
		vmem::fork_memory(&ranges[..n], child.pdir_physical)
	}

	/// Frees every present page covered by this address space's mappings
	/// and releases its user page tables. Must run while this process's
	/// directory is the one currently loaded.
	pub fn free(&self) {
		let (ranges, n) = self.cow_ranges_all();
		vmem::free_process_memory(&ranges[..n]);
	}

	fn cow_ranges_all(&self) -> ([Range; MAX_MEMORY_MAPS], usize) {
		let mut ranges = [Range { start: 0, end: 0 }; MAX_MEMORY_MAPS];
		let mut n = 0;
		for m in self.mappings() {
			ranges[n] = Range {
				start: m.base,
				end: m.base + m.size,
			};
			n += 1;
		}
		(ranges, n)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn mapping_rejects_overlap() {
		let mut ms = MemSpace::new(0);
		ms.add_mapping(0x1000, 0x2000, WRITABLE, 0, 0, None).unwrap();
		assert!(ms.add_mapping(0x1800, 0x1000, WRITABLE, 0, 0, None).is_err());
	}

	#[test_case]
	fn mapping_find() {
		let mut ms = MemSpace::new(0);
		ms.add_mapping(0x1000, 0x2000, WRITABLE, 0, 0, None).unwrap();
		assert!(ms.find(0x1500).is_some());
		assert!(ms.find(0x500).is_none());
	}

	#[test_case]
	fn grow_stack_down_extends_base() {
		let mut ms = MemSpace::new(0);
		ms.add_mapping(0xffff_e000, 0x1000, WRITABLE | STACK, 0, 0, None).unwrap();
		ms.grow_stack_down(0xffff_d000);
		assert!(ms.find(0xffff_d000).is_some());
	}
}
