//! This module stores the errno utilities.
//!
//! Every fallible kernel operation returns `Result<T, Errno>`; the syscall
//! dispatcher (`syscall::mod`) turns `Err(e)` into `-e` in `eax` on the
//! return path, per the syscall ABI (trap `0xFF`, negative errno on error).

use core::fmt;

/// Type representing a Unix errno.
pub type Errno = i32;

/// Operation not permitted.
pub const EPERM: Errno = 1;
/// No such file or directory.
pub const ENOENT: Errno = 2;
/// No such process.
pub const ESRCH: Errno = 3;
/// Interrupted function.
pub const EINTR: Errno = 4;
/// I/O error.
pub const EIO: Errno = 5;
/// No such device or address.
pub const ENXIO: Errno = 6;
/// Bad file descriptor.
pub const EBADF: Errno = 9;
/// No child processes.
pub const ECHILD: Errno = 10;
/// Resource unavailable, try again.
pub const EAGAIN: Errno = 11;
/// Not enough space.
pub const ENOMEM: Errno = 12;
/// Permission denied.
pub const EACCES: Errno = 13;
/// Bad address.
pub const EFAULT: Errno = 14;
/// Device or resource busy.
pub const EBUSY: Errno = 16;
/// File exists.
pub const EEXIST: Errno = 17;
/// Cross-device link.
pub const EXDEV: Errno = 18;
/// No such device.
pub const ENODEV: Errno = 19;
/// Not a directory or a symbolic link to a directory.
pub const ENOTDIR: Errno = 20;
/// Is a directory.
pub const EISDIR: Errno = 21;
/// Invalid argument.
pub const EINVAL: Errno = 22;
/// Too many files open in system.
pub const ENFILE: Errno = 23;
/// File descriptor value too large.
pub const EMFILE: Errno = 24;
/// Inappropriate I/O control operation.
pub const ENOTTY: Errno = 25;
/// File too large.
pub const EFBIG: Errno = 27;
/// No space left on device.
pub const ENOSPC: Errno = 28;
/// Invalid seek.
pub const ESPIPE: Errno = 29;
/// Read-only file system.
pub const EROFS: Errno = 30;
/// Too many links.
pub const EMLINK: Errno = 31;
/// Broken pipe.
pub const EPIPE: Errno = 32;
/// Filename too long.
pub const ENAMETOOLONG: Errno = 36;
/// Functionality not supported.
pub const ENOSYS: Errno = 38;
/// Directory not empty.
pub const ENOTEMPTY: Errno = 39;
/// Executable file format error.
pub const ENOEXEC: Errno = 8;

/// Builds an `Err(Errno)` value, optionally logging the call site when the
/// `strace` feature is enabled.
#[macro_export]
macro_rules! errno {
	($kind:expr) => {{
		#[cfg(feature = "strace")]
		$crate::println!("[errno] {}:{}: {}", file!(), line!(), stringify!($kind));
		Err($kind)
	}};
}

/// Wrapper used to print a human-readable name for an [`Errno`] value, for
/// diagnostics and `strace`-style logging.
pub struct ErrnoDisplay(pub Errno);

impl fmt::Display for ErrnoDisplay {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self.0 {
			EPERM => "EPERM",
			ENOENT => "ENOENT",
			ESRCH => "ESRCH",
			EINTR => "EINTR",
			EIO => "EIO",
			ENXIO => "ENXIO",
			EBADF => "EBADF",
			ECHILD => "ECHILD",
			EAGAIN => "EAGAIN",
			ENOMEM => "ENOMEM",
			EACCES => "EACCES",
			EFAULT => "EFAULT",
			EBUSY => "EBUSY",
			EEXIST => "EEXIST",
			EXDEV => "EXDEV",
			ENODEV => "ENODEV",
			ENOTDIR => "ENOTDIR",
			EISDIR => "EISDIR",
			EINVAL => "EINVAL",
			ENFILE => "ENFILE",
			EMFILE => "EMFILE",
			ENOTTY => "ENOTTY",
			EFBIG => "EFBIG",
			ENOSPC => "ENOSPC",
			ESPIPE => "ESPIPE",
			EROFS => "EROFS",
			EMLINK => "EMLINK",
			EPIPE => "EPIPE",
			ENAMETOOLONG => "ENAMETOOLONG",
			ENOSYS => "ENOSYS",
			ENOTEMPTY => "ENOTEMPTY",
			ENOEXEC => "ENOEXEC",
			_ => "EUNKNOWN",
		};
		write!(f, "{name}")
	}
}

/// Error returned by fallible allocations throughout `util::container` and
/// `util::ptr`. Always maps to [`ENOMEM`] at the syscall boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl From<AllocError> for Errno {
	fn from(_: AllocError) -> Self {
		ENOMEM
	}
}
