use ash::prelude::VkResult;
use ash::vk::{
	CommandBuffer, CommandBufferAllocateInfo, CommandPool, Semaphore, SemaphoreCreateInfo, SemaphoreType,
	SemaphoreTypeCreateInfo,
};
use std::mem::MaybeUninit;

pub trait DeviceExt {
	/// Allocates a single command buffer, without the `Vec` [`ash::Device::allocate_command_buffers`] returns.
	unsafe fn allocate_command_buffer(
		&self,
		pool: CommandPool,
		level: ash::vk::CommandBufferLevel,
	) -> VkResult<CommandBuffer>;

	unsafe fn create_timeline_semaphore(&self, initial_value: u64) -> VkResult<Semaphore>;
}

impl DeviceExt for ash::Device {
	unsafe fn allocate_command_buffer(
		&self,
		pool: CommandPool,
		level: ash::vk::CommandBufferLevel,
	) -> VkResult<CommandBuffer> {
		unsafe {
			let allocate_info = CommandBufferAllocateInfo::default()
				.command_pool(pool)
				.level(level)
				.command_buffer_count(1);
			let mut buffer = MaybeUninit::uninit();
			(self.fp_v1_0().allocate_command_buffers)(self.handle(), &allocate_info, buffer.as_mut_ptr())
				.assume_init_on_success(buffer)
		}
	}

	unsafe fn create_timeline_semaphore(&self, initial_value: u64) -> VkResult<Semaphore> {
		unsafe {
			self.create_semaphore(
				&SemaphoreCreateInfo::default().push_next(
					&mut SemaphoreTypeCreateInfo::default()
						.semaphore_type(SemaphoreType::TIMELINE)
						.initial_value(initial_value),
				),
				None,
			)
		}
	}
}
