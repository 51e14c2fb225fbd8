//! Validated access to user-space memory from syscall handlers.
//!
//! The kernel dereferences a user pointer directly rather than copying
//! through a separate kernel mapping: while a process's own directory is
//! loaded (always true for a syscall running on its behalf), its user
//! pages sit at their ordinary addresses in the current address space.
//! Every access here still checks presence and permission per byte first,
//! since a raw user-supplied pointer is otherwise as trustworthy as any
//! other syscall argument — which is to say, not at all.
//!
//! Grounded in `examples/maestro-os-maestro/src/process/mem_space/ptr.rs`'s
//! `SyscallString`/`SyscallSlice` validate-then-dereference shape, reduced
//! to the two access patterns this core's syscalls need: a bounded
//! NUL-terminated string (`path` arguments) and a single `u32` (`wstatus`,
//! `alarm`'s previous-value style outputs aside, none of this core's
//! syscalls write a larger structure back to userspace).

use crate::errno::{self, Errno};
use crate::memory::vmem;
use crate::util::container::vec::Vec;

/// Upper bound on a path string read out of user memory in one call.
pub const PATH_MAX: usize = 256;

/// Upper bound on a single `read`/`write` transfer, capping the kernel
/// staging buffer a malicious `count` could otherwise force this core to
/// allocate.
pub const MAX_IO_SIZE: usize = 64 * 1024;

fn check_byte(addr: u32, write: bool) -> Result<(), Errno> {
	let flags = vmem::entry_flags(addr);
	if flags & vmem::PAGE_PRESENT == 0 || flags & vmem::PAGE_USER == 0 {
		return Err(errno::EFAULT);
	}
	if write && flags & vmem::PAGE_WRITABLE == 0 {
		return Err(errno::EFAULT);
	}
	Ok(())
}

/// Validates every byte of `addr..addr+len`, for callers that read or
/// write a fixed-size structure in one shot (`sigreturn`'s saved
/// context) rather than one of the byte-at-a-time helpers below.
pub fn check_range(addr: u32, len: u32, write: bool) -> Result<(), Errno> {
	for i in 0..len {
		check_byte(addr.wrapping_add(i), write)?;
	}
	Ok(())
}

/// Reads a NUL-terminated string out of user memory at `ptr`, validating
/// every byte's page as it goes. Returns the buffer and the string's
/// length (excluding the terminator).
pub fn read_cstr(ptr: u32) -> Result<([u8; PATH_MAX], usize), Errno> {
	let mut buf = [0u8; PATH_MAX];
	for (i, slot) in buf.iter_mut().enumerate() {
		let addr = ptr.wrapping_add(i as u32);
		check_byte(addr, false)?;
		let byte = unsafe { *(addr as *const u8) };
		if byte == 0 {
			return Ok((buf, i));
		}
		*slot = byte;
	}
	Err(errno::ENAMETOOLONG)
}

/// Writes `val` to the `u32` at `ptr`. A null `ptr` is accepted as a no-op,
/// matching the POSIX convention of an optional output parameter (e.g.
/// `waitpid`'s `wstatus`).
pub fn write_u32(ptr: u32, val: u32) -> Result<(), Errno> {
	if ptr == 0 {
		return Ok(());
	}
	for i in 0..4 {
		check_byte(ptr + i, true)?;
	}
	unsafe { *(ptr as *mut u32) = val };
	Ok(())
}

/// Copies `len` bytes out of user memory at `ptr` into a freshly
/// allocated kernel buffer, validating every byte's page first.
pub fn read_buf(ptr: u32, len: usize) -> Result<Vec<u8>, Errno> {
	if len > MAX_IO_SIZE {
		return Err(errno::EINVAL);
	}
	let mut buf = Vec::new();
	buf.resize(len, 0u8)?;
	for (i, slot) in buf.iter_mut().enumerate() {
		let addr = ptr.wrapping_add(i as u32);
		check_byte(addr, false)?;
		*slot = unsafe { *(addr as *const u8) };
	}
	Ok(buf)
}

/// Copies `data` into user memory at `ptr`, validating every byte's
/// page first.
pub fn write_buf(ptr: u32, data: &[u8]) -> Result<(), Errno> {
	if data.len() > MAX_IO_SIZE {
		return Err(errno::EINVAL);
	}
	for (i, &byte) in data.iter().enumerate() {
		let addr = ptr.wrapping_add(i as u32);
		check_byte(addr, true)?;
		unsafe { *(addr as *mut u8) = byte };
	}
	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;

	#[test_case]
	fn write_u32_null_pointer_is_noop() {
		assert!(write_u32(0, 42).is_ok());
	}
}
