//! Fallible collections built over fixed or growable backing storage.
//! Every growth point returns `Result<_, AllocError>` instead of aborting.

pub mod bitfield;
pub mod map;
pub mod string;
pub mod vec;
