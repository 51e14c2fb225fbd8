//! A fallible counterpart to [`Clone`] for types backed by fallible
//! allocation, so cloning a process's memory-map array or fd table can
//! surface `ENOMEM` instead of aborting.

use crate::errno::AllocError;

/// Like [`Clone`], but the clone may fail.
pub trait TryClone: Sized {
	/// The error type returned on failure. Almost always [`AllocError`].
	type Error = AllocError;

	/// Attempts to clone `self`.
	fn try_clone(&self) -> Result<Self, Self::Error>;
}
