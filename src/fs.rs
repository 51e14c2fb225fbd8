//! The boundary between the core and the MINIX-v1 file system, inode
//! cache and block device layer it sits on top of. None of that is
//! implemented here: this module only defines the interface the core
//! calls through ([`FileSystem`]) and the on-disk constants its callers
//! need to interpret what comes back (superblock magic, inode/dentry
//! sizes). Writeback is out of scope; there is deliberately no
//! `inode_write`.
//!
//! Grounded in `fs.h`'s `mount`/`iget`/`idup`/`iput`/`iread`/`ilookup`
//! signatures for the interface shape and on-disk layout constants, and
//! on the teacher's `file::inode::INode`/`file::mountpoint` for how this
//! codebase expresses a filesystem abstraction as a trait rather than a
//! concrete struct.

use crate::errno::{self, Errno};
use crate::util::ptr::arc::Arc;
use crate::util::lock::IntMutex;

/// MINIX V1 superblock magic number.
pub const MAGIC: u16 = 0x137f;
/// Block size in bytes.
pub const BLOCKSIZE: u32 = 1024;
/// On-disk size of one inode record.
pub const INODE_SIZE: usize = 32;
/// Inode records packed per block.
pub const INODES_PER_BLOCK: usize = (BLOCKSIZE as usize) / INODE_SIZE;
/// On-disk size of one directory entry.
pub const DENTRY_SIZE: usize = 16;
/// Maximum file name length in a directory entry (NUL-padded).
pub const NAME_MAX: usize = 14;
/// Direct zone pointers in an inode; the core's read path only follows
/// these, not indirect/double-indirect zones.
pub const DIRECT_ZONES: usize = 7;

/// `mode & MODE_TYPE_MASK` yields one of the `IF*` constants below.
pub const MODE_TYPE_MASK: u16 = 0o170000;
pub const IFSOCK: u16 = 0o140000;
pub const IFLNK: u16 = 0o120000;
pub const IFREG: u16 = 0o100000;
pub const IFBLK: u16 = 0o060000;
pub const IFDIR: u16 = 0o040000;
pub const IFCHR: u16 = 0o020000;
pub const IFIFO: u16 = 0o010000;

pub const ISUID: u16 = 0o004000;
pub const ISGID: u16 = 0o002000;
pub const IRUSR: u16 = 0o000400;
pub const IWUSR: u16 = 0o000200;
pub const IXUSR: u16 = 0o000100;

/// A device identifier, `(major << 8) | minor`.
pub type DevId = u16;

pub const fn major(dev: DevId) -> u8 {
	(dev >> 8) as u8
}

pub const fn minor(dev: DevId) -> u8 {
	(dev & 0xff) as u8
}

/// Major number of the bootable root file system device.
pub const ROOT_DEV: DevId = 0x200;

/// Opaque handle to a live inode, stable across `inode_get`/`inode_put`
/// pairs. The core never dereferences file-system-internal inode state
/// directly; it only ever holds one of these.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InodeRef {
	pub dev: DevId,
	pub inum: u32,
}

/// The fields of an inode the core needs to make policy decisions
/// (permission checks, directory-vs-regular dispatch, size for reads
/// past EOF). Mirrors `struct inode`'s on-disk fields, minus the
/// zone list the file system keeps internally.
#[derive(Clone, Copy, Debug)]
pub struct InodeAttr {
	pub mode: u16,
	pub uid: u16,
	pub gid: u8,
	pub size: u32,
	pub nlinks: u8,
	pub time: u32,
}

impl InodeAttr {
	pub fn file_type(&self) -> u16 {
		self.mode & MODE_TYPE_MASK
	}

	pub fn is_dir(&self) -> bool {
		self.file_type() == IFDIR
	}
}

/// The file-system collaborator interface. An implementation owns the
/// superblock/inode/buffer caches and the block device underneath;
/// the core only ever calls through these five operations.
pub trait FileSystem: Send + Sync {
	/// Mounts the file system on `dev`, returning its root inode.
	fn mount(&self, dev: DevId) -> Result<InodeRef, Errno>;

	/// Fetches (or refcounts up) the inode `inum` on `dev`.
	fn inode_get(&self, dev: DevId, inum: u32) -> Result<(InodeRef, InodeAttr), Errno>;

	/// Releases a reference taken by `inode_get`/`inode_lookup`.
	fn inode_put(&self, inode: InodeRef);

	/// Resolves one path component (`name`, no separators) inside
	/// directory `dir`.
	fn inode_lookup(&self, dir: InodeRef, name: &[u8]) -> Result<InodeRef, Errno>;

	/// Reads up to `buf.len()` bytes starting at `offset`, returning the
	/// number of bytes actually read (short on EOF). A negative errno
	/// from the underlying device surfaces as `Err`.
	fn inode_read(&self, inode: InodeRef, buf: &mut [u8], offset: u32) -> Result<usize, Errno>;
}

static COLLABORATOR: IntMutex<Option<Arc<dyn FileSystem>>> = IntMutex::new(None);

/// Registers the file-system collaborator. Called once during kernel
/// init after the boot device is probed; panics if called twice, since
/// that would silently orphan whatever inodes the first collaborator
/// had live.
pub fn register(fs: Arc<dyn FileSystem>) {
	let mut slot = COLLABORATOR.lock();
	assert!(slot.is_none(), "file system collaborator already registered");
	*slot = Some(fs);
}

fn with_fs<R>(f: impl FnOnce(&dyn FileSystem) -> Result<R, Errno>) -> Result<R, Errno> {
	let slot = COLLABORATOR.lock();
	match slot.as_ref() {
		Some(fs) => f(fs.as_ref()),
		None => Err(errno::ENXIO),
	}
}

pub fn mount(dev: DevId) -> Result<InodeRef, Errno> {
	with_fs(|fs| fs.mount(dev))
}

pub fn inode_get(dev: DevId, inum: u32) -> Result<(InodeRef, InodeAttr), Errno> {
	with_fs(|fs| fs.inode_get(dev, inum))
}

pub fn inode_put(inode: InodeRef) {
	let slot = COLLABORATOR.lock();
	if let Some(fs) = slot.as_ref() {
		fs.inode_put(inode);
	}
}

pub fn inode_lookup(dir: InodeRef, name: &[u8]) -> Result<InodeRef, Errno> {
	with_fs(|fs| fs.inode_lookup(dir, name))
}

pub fn inode_read(inode: InodeRef, buf: &mut [u8], offset: u32) -> Result<usize, Errno> {
	with_fs(|fs| fs.inode_read(inode, buf, offset))
}

#[cfg(test)]
mod test {
	use super::*;

	struct FakeFs;

	impl FileSystem for FakeFs {
		fn mount(&self, dev: DevId) -> Result<InodeRef, Errno> {
			Ok(InodeRef { dev, inum: 1 })
		}

		fn inode_get(&self, dev: DevId, inum: u32) -> Result<(InodeRef, InodeAttr), Errno> {
			Ok((
				InodeRef { dev, inum },
				InodeAttr {
					mode: IFREG | IRUSR,
					uid: 0,
					gid: 0,
					size: 4,
					nlinks: 1,
					time: 0,
				},
			))
		}

		fn inode_put(&self, _inode: InodeRef) {}

		fn inode_lookup(&self, dir: InodeRef, _name: &[u8]) -> Result<InodeRef, Errno> {
			Ok(InodeRef {
				dev: dir.dev,
				inum: dir.inum + 1,
			})
		}

		fn inode_read(&self, _inode: InodeRef, buf: &mut [u8], _offset: u32) -> Result<usize, Errno> {
			let n = buf.len().min(4);
			buf[..n].copy_from_slice(&[b't', b'e', b's', b't'][..n]);
			Ok(n)
		}
	}

	#[test_case]
	fn fake_fs_lookup_and_read_roundtrip() {
		let fs = FakeFs;
		let root = fs.mount(ROOT_DEV).unwrap();
		let child = fs.inode_lookup(root, b"bin").unwrap();
		assert_eq!(child.inum, root.inum + 1);
		let mut buf = [0u8; 4];
		assert_eq!(fs.inode_read(child, &mut buf, 0).unwrap(), 4);
		assert_eq!(&buf, b"test");
	}

	#[test_case]
	fn mode_type_extracts_file_kind() {
		let attr = InodeAttr {
			mode: IFDIR | IRUSR,
			uid: 0,
			gid: 0,
			size: 0,
			nlinks: 2,
			time: 0,
		};
		assert!(attr.is_dir());
	}

	#[test_case]
	fn unregistered_collaborator_yields_enxio() {
		assert_eq!(mount(ROOT_DEV), Err(errno::ENXIO));
	}

	#[test_case]
	fn dev_major_minor_split() {
		let dev: DevId = (4 << 8) | 1;
		assert_eq!(major(dev), 4);
		assert_eq!(minor(dev), 1);
	}
}
