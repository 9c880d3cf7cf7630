use crate::resource::BufferUsage;
use num_derive::{FromPrimitive, ToPrimitive};

/// The barrier state a buffer is tracked in.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, FromPrimitive, ToPrimitive)]
pub enum BufferAccess {
	Undefined,
	General,
	TransferRead,
	TransferWrite,
	ShaderRead,
	ShaderReadWrite,
	GeneralRead,
	GeneralWrite,
	HostAccess,
	IndirectCommandRead,
	IndexRead,
	VertexAttributeRead,
}

impl BufferAccess {
	/// Returns the [`BufferUsage`] flags a buffer must have to be transitioned to this state.
	pub fn required_buffer_usage(&self) -> BufferUsage {
		match self {
			BufferAccess::Undefined => BufferUsage::empty(),
			BufferAccess::General => BufferUsage::empty(),
			BufferAccess::TransferRead => BufferUsage::TRANSFER_SRC,
			BufferAccess::TransferWrite => BufferUsage::TRANSFER_DST,
			BufferAccess::ShaderRead => BufferUsage::STORAGE_BUFFER,
			BufferAccess::ShaderReadWrite => BufferUsage::STORAGE_BUFFER,
			BufferAccess::GeneralRead => BufferUsage::empty(),
			BufferAccess::GeneralWrite => BufferUsage::empty(),
			BufferAccess::HostAccess => BufferUsage::MAP_READ | BufferUsage::MAP_WRITE,
			BufferAccess::IndirectCommandRead => BufferUsage::INDIRECT_BUFFER,
			BufferAccess::IndexRead => BufferUsage::INDEX_BUFFER,
			BufferAccess::VertexAttributeRead => BufferUsage::VERTEX_BUFFER,
		}
	}

	/// Whether a buffer with `usage` may be transitioned to this state. Host access needs either map flag.
	pub fn is_permitted_by(&self, usage: BufferUsage) -> bool {
		match self {
			BufferAccess::HostAccess => usage.is_mappable(),
			access => usage.contains(access.required_buffer_usage()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_permitted_by() {
		let usage = BufferUsage::MAP_WRITE | BufferUsage::STORAGE_BUFFER;
		assert!(BufferAccess::ShaderRead.is_permitted_by(usage));
		assert!(BufferAccess::HostAccess.is_permitted_by(usage));
		assert!(BufferAccess::General.is_permitted_by(usage));
		assert!(!BufferAccess::TransferWrite.is_permitted_by(usage));
		assert!(!BufferAccess::IndexRead.is_permitted_by(usage));
	}
}
