use crate::platform::{CommandBufferLevel, SubpassContents};
use crate::resource::{AllocationScheme, BufferUsage, Extent, Format, ImageUsage};
use ash::vk::{
	BufferUsageFlags, Extent2D, Extent3D, ImageAspectFlags, ImageType, ImageUsageFlags, ImageViewType,
};
use gpu_allocator::MemoryLocation;

impl AllocationScheme {
	pub fn to_gpu_allocator_buffer(&self, buffer: ash::vk::Buffer) -> gpu_allocator::vulkan::AllocationScheme {
		match self {
			AllocationScheme::Dedicated => gpu_allocator::vulkan::AllocationScheme::DedicatedBuffer(buffer),
			AllocationScheme::AllocatorManaged => gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
		}
	}

	pub fn to_gpu_allocator_image(&self, image: ash::vk::Image) -> gpu_allocator::vulkan::AllocationScheme {
		match self {
			AllocationScheme::Dedicated => gpu_allocator::vulkan::AllocationScheme::DedicatedImage(image),
			AllocationScheme::AllocatorManaged => gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
		}
	}
}

impl BufferUsage {
	pub fn to_ash_buffer_usage_flags(&self) -> BufferUsageFlags {
		let mut out = BufferUsageFlags::empty();
		if self.contains(BufferUsage::TRANSFER_SRC) {
			out |= BufferUsageFlags::TRANSFER_SRC;
		}
		if self.contains(BufferUsage::TRANSFER_DST) {
			out |= BufferUsageFlags::TRANSFER_DST;
		}
		if self.contains(BufferUsage::UNIFORM_BUFFER) {
			out |= BufferUsageFlags::UNIFORM_BUFFER;
		}
		if self.contains(BufferUsage::STORAGE_BUFFER) {
			out |= BufferUsageFlags::STORAGE_BUFFER;
		}
		if self.contains(BufferUsage::INDEX_BUFFER) {
			out |= BufferUsageFlags::INDEX_BUFFER;
		}
		if self.contains(BufferUsage::VERTEX_BUFFER) {
			out |= BufferUsageFlags::VERTEX_BUFFER;
		}
		if self.contains(BufferUsage::INDIRECT_BUFFER) {
			out |= BufferUsageFlags::INDIRECT_BUFFER;
		}
		if self.contains(BufferUsage::DEVICE_ADDRESS) {
			out |= BufferUsageFlags::SHADER_DEVICE_ADDRESS;
		}
		// empty flags are invalid in vulkan, reachable by a buffer that is only host mappable
		if out.is_empty() {
			BufferUsageFlags::TRANSFER_SRC
		} else {
			out
		}
	}

	/// prioritizes MAP_WRITE over MAP_READ
	pub fn to_gpu_allocator_memory_location(&self) -> MemoryLocation {
		if self.contains(BufferUsage::MAP_WRITE) {
			MemoryLocation::CpuToGpu
		} else if self.contains(BufferUsage::MAP_READ) {
			MemoryLocation::GpuToCpu
		} else {
			MemoryLocation::GpuOnly
		}
	}
}

impl ImageUsage {
	pub fn to_ash_image_usage_flags(&self) -> ImageUsageFlags {
		let mut out = ImageUsageFlags::empty();
		if self.contains(ImageUsage::TRANSFER_SRC) {
			out |= ImageUsageFlags::TRANSFER_SRC;
		}
		if self.contains(ImageUsage::TRANSFER_DST) {
			out |= ImageUsageFlags::TRANSFER_DST;
		}
		if self.contains(ImageUsage::SAMPLED) {
			out |= ImageUsageFlags::SAMPLED;
		}
		if self.contains(ImageUsage::STORAGE) {
			out |= ImageUsageFlags::STORAGE;
		}
		if self.contains(ImageUsage::COLOR_ATTACHMENT) {
			out |= ImageUsageFlags::COLOR_ATTACHMENT;
		}
		if self.contains(ImageUsage::DEPTH_STENCIL_ATTACHMENT) {
			out |= ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
		}
		out
	}
}

impl Extent {
	pub fn to_ash_image_type(&self) -> ImageType {
		if self.is_3d() {
			ImageType::TYPE_3D
		} else {
			ImageType::TYPE_2D
		}
	}

	pub fn to_ash_image_view_type(&self, array_layers: u32) -> ImageViewType {
		match (self.is_3d(), array_layers > 1) {
			(true, _) => ImageViewType::TYPE_3D,
			(false, false) => ImageViewType::TYPE_2D,
			(false, true) => ImageViewType::TYPE_2D_ARRAY,
		}
	}

	pub fn to_ash_extent_2d(&self) -> Extent2D {
		Extent2D {
			width: self.width,
			height: self.height,
		}
	}
}

impl From<Extent> for Extent3D {
	fn from(value: Extent) -> Self {
		Extent3D {
			width: value.width,
			height: value.height,
			depth: value.depth,
		}
	}
}

/// The aspects an image view of `format` covers
pub fn format_aspect(format: Format) -> ImageAspectFlags {
	match format {
		Format::D16_UNORM | Format::X8_D24_UNORM_PACK32 | Format::D32_SFLOAT => ImageAspectFlags::DEPTH,
		Format::S8_UINT => ImageAspectFlags::STENCIL,
		Format::D16_UNORM_S8_UINT | Format::D24_UNORM_S8_UINT | Format::D32_SFLOAT_S8_UINT => {
			ImageAspectFlags::DEPTH | ImageAspectFlags::STENCIL
		}
		_ => ImageAspectFlags::COLOR,
	}
}

impl SubpassContents {
	pub fn to_ash_subpass_contents(&self) -> ash::vk::SubpassContents {
		match self {
			SubpassContents::Inline => ash::vk::SubpassContents::INLINE,
			SubpassContents::SecondaryCommandBuffers => ash::vk::SubpassContents::SECONDARY_COMMAND_BUFFERS,
		}
	}
}

impl CommandBufferLevel {
	pub fn to_ash_command_buffer_level(&self) -> ash::vk::CommandBufferLevel {
		match self {
			CommandBufferLevel::Primary => ash::vk::CommandBufferLevel::PRIMARY,
			CommandBufferLevel::Secondary => ash::vk::CommandBufferLevel::SECONDARY,
		}
	}
}
