//! The `open` syscall: resolves `path` relative to the calling
//! process's `cwd` and installs the result as a new file descriptor.
//! `mode` is accepted, per the POSIX signature, but unused: this core's
//! MINIX-v1 collaborator offers no file-creation path, so `open` can
//! only ever name something that already exists.

use crate::errno::{self, Errno};
use crate::file;
use crate::fs;
use crate::process;
use crate::process::exec::{resolve_path, root_inode};
use crate::process::uaccess;
use macros::syscall;

#[syscall]
pub fn open(path: u32, flags: u32, _mode: u32) -> Result<i32, Errno> {
	let (path_buf, path_len) = uaccess::read_cstr(path)?;
	let path = &path_buf[..path_len];

	let proc = process::current_proc().ok_or(errno::ESRCH)?;
	let root = root_inode()?;
	let cwd = proc.lock().cwd_inode.unwrap_or(root);
	let target = resolve_path(cwd, root, path)?;
	let (inode, attr) = fs::inode_get(target.dev, target.inum)?;

	if attr.is_dir() && flags & 0b11 != file::O_RDONLY {
		fs::inode_put(inode);
		return Err(errno::EISDIR);
	}

	match proc.lock().fd_table.open(inode, flags) {
		Ok(fd) => Ok(fd as i32),
		Err(e) => {
			fs::inode_put(inode);
			Err(e)
		}
	}
}
