use crate::backing::handle::AnyHandle;
use crate::resource::BufferUsage;
use thiserror::Error;

/// An AccessError is a runtime checked error that usually indicates a programming error, and should usually be
/// handled with a `panic!` (or [`Result::unwrap`]).
#[derive(Error)]
#[non_exhaustive]
pub enum AccessError {
	#[error("{0:?} does not refer to a live resource")]
	StaleHandle(AnyHandle),
	#[error("Resource \"{name}\" is not ready to be used")]
	NotReady { name: String },
	#[error("Buffer \"{name}\" with usages {usage:?} is missing usage {missing_usage:?} for this operation")]
	MissingBufferUsage {
		name: String,
		usage: BufferUsage,
		missing_usage: BufferUsage,
	},
	#[error("Range {offset}..{end} is out of bounds of buffer \"{name}\" of size {size}")]
	OutOfBounds { name: String, offset: u64, end: u64, size: u64 },
}

impl core::fmt::Debug for AccessError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}
