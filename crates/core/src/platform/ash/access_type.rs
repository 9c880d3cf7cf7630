use crate::access::BufferAccess;
use ash::vk::{AccessFlags2, BufferMemoryBarrier2, PipelineStageFlags2, QUEUE_FAMILY_IGNORED, WHOLE_SIZE};

/// The synchronization scope of a [`BufferAccess`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AshBufferAccess {
	pub stage_mask: PipelineStageFlags2,
	pub access_mask: AccessFlags2,
}

impl AshBufferAccess {
	pub const fn new(stage_mask: PipelineStageFlags2, access_mask: AccessFlags2) -> Self {
		Self {
			stage_mask,
			access_mask,
		}
	}
}

impl BufferAccess {
	pub fn to_ash_buffer_access(&self) -> AshBufferAccess {
		const SHADER_STAGES: PipelineStageFlags2 = PipelineStageFlags2::from_raw(
			PipelineStageFlags2::ALL_GRAPHICS.as_raw() | PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
		);
		match self {
			BufferAccess::Undefined => AshBufferAccess::new(PipelineStageFlags2::ALL_COMMANDS, AccessFlags2::NONE),
			BufferAccess::General => AshBufferAccess::new(
				PipelineStageFlags2::ALL_COMMANDS,
				AccessFlags2::MEMORY_READ | AccessFlags2::MEMORY_WRITE,
			),
			BufferAccess::GeneralRead => {
				AshBufferAccess::new(PipelineStageFlags2::ALL_COMMANDS, AccessFlags2::MEMORY_READ)
			}
			BufferAccess::GeneralWrite => {
				AshBufferAccess::new(PipelineStageFlags2::ALL_COMMANDS, AccessFlags2::MEMORY_WRITE)
			}
			BufferAccess::TransferRead => {
				AshBufferAccess::new(PipelineStageFlags2::TRANSFER, AccessFlags2::TRANSFER_READ)
			}
			BufferAccess::TransferWrite => {
				AshBufferAccess::new(PipelineStageFlags2::TRANSFER, AccessFlags2::TRANSFER_WRITE)
			}
			BufferAccess::ShaderRead => AshBufferAccess::new(SHADER_STAGES, AccessFlags2::SHADER_STORAGE_READ),
			BufferAccess::ShaderReadWrite => AshBufferAccess::new(
				SHADER_STAGES,
				AccessFlags2::SHADER_STORAGE_READ | AccessFlags2::SHADER_STORAGE_WRITE,
			),
			BufferAccess::HostAccess => AshBufferAccess::new(
				PipelineStageFlags2::HOST,
				AccessFlags2::HOST_READ | AccessFlags2::HOST_WRITE,
			),
			BufferAccess::IndirectCommandRead => {
				AshBufferAccess::new(PipelineStageFlags2::DRAW_INDIRECT, AccessFlags2::INDIRECT_COMMAND_READ)
			}
			BufferAccess::IndexRead => AshBufferAccess::new(PipelineStageFlags2::INDEX_INPUT, AccessFlags2::INDEX_READ),
			BufferAccess::VertexAttributeRead => AshBufferAccess::new(
				PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
				AccessFlags2::VERTEX_ATTRIBUTE_READ,
			),
		}
	}
}

/// A whole-buffer barrier from `src` to `dst` without queue family ownership transfer.
pub fn ash_buffer_barrier(
	buffer: ash::vk::Buffer,
	src: BufferAccess,
	dst: BufferAccess,
) -> BufferMemoryBarrier2<'static> {
	let src = src.to_ash_buffer_access();
	let dst = dst.to_ash_buffer_access();
	BufferMemoryBarrier2::default()
		.buffer(buffer)
		.offset(0)
		.size(WHOLE_SIZE)
		.src_stage_mask(src.stage_mask)
		.src_access_mask(src.access_mask)
		.dst_stage_mask(dst.stage_mask)
		.dst_access_mask(dst.access_mask)
		.src_queue_family_index(QUEUE_FAMILY_IGNORED)
		.dst_queue_family_index(QUEUE_FAMILY_IGNORED)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_barrier_scopes() {
		let barrier = ash_buffer_barrier(ash::vk::Buffer::null(), BufferAccess::TransferWrite, BufferAccess::ShaderRead);
		assert_eq!(barrier.src_stage_mask, PipelineStageFlags2::TRANSFER);
		assert_eq!(barrier.src_access_mask, AccessFlags2::TRANSFER_WRITE);
		assert!(barrier.dst_stage_mask.contains(PipelineStageFlags2::COMPUTE_SHADER));
		assert_eq!(barrier.dst_access_mask, AccessFlags2::SHADER_STORAGE_READ);
		assert_eq!(barrier.size, WHOLE_SIZE);
	}
}
