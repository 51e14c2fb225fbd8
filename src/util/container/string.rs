//! A fallible byte string, used for paths and command-line fragments that
//! may need to grow from kernel-controlled copies of user-supplied data.

use crate::errno::AllocError;
use crate::util::TryClone;
use core::ops::Deref;

/// An owned, fallibly-allocated byte string (not required to be valid
/// UTF-8, since paths and inode names are not).
#[derive(Debug, Default)]
pub struct String(alloc::vec::Vec<u8>);

impl String {
	/// Creates an empty string.
	pub const fn new() -> Self {
		Self(alloc::vec::Vec::new())
	}

	/// Builds a new string from the bytes in `bytes`.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, AllocError> {
		let mut v = alloc::vec::Vec::new();
		v.try_reserve(bytes.len()).map_err(|_| AllocError)?;
		v.extend_from_slice(bytes);
		Ok(Self(v))
	}

	/// Returns the string's contents as a byte slice.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Appends `bytes` to the end of the string.
	pub fn push_str(&mut self, bytes: &[u8]) -> Result<(), AllocError> {
		self.0.try_reserve(bytes.len()).map_err(|_| AllocError)?;
		self.0.extend_from_slice(bytes);
		Ok(())
	}
}

impl Deref for String {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		&self.0
	}
}

impl TryClone for String {
	fn try_clone(&self) -> Result<Self, AllocError> {
		Self::from_bytes(&self.0)
	}
}

impl PartialEq<[u8]> for String {
	fn eq(&self, other: &[u8]) -> bool {
		self.0 == other
	}
}
