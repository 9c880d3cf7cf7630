use crate::epoch::QueueType;
use crate::platform::CommandBufferLevel;
use crate::platform::ash::DeviceExt;
use ash::Device;
use ash::prelude::VkResult;
use ash::vk::{Semaphore, SemaphoreWaitInfo};
use std::time::Duration;

#[derive(Debug)]
pub struct AshCommandPool {
	pub pool: ash::vk::CommandPool,
	pub queue: QueueType,
}

#[derive(Debug)]
pub struct AshCommandBuffer {
	pub cmd: ash::vk::CommandBuffer,
	pub level: CommandBufferLevel,
}

/// One timeline semaphore per [`QueueType`], their counter value is the epoch that completed last.
#[derive(Debug)]
pub struct AshTimelines {
	semaphores: [Semaphore; QueueType::COUNT],
}

impl AshTimelines {
	pub fn new(device: &Device) -> VkResult<Self> {
		let mut semaphores = [Semaphore::null(); QueueType::COUNT];
		for i in 0..QueueType::COUNT {
			match unsafe { device.create_timeline_semaphore(0) } {
				Ok(semaphore) => semaphores[i] = semaphore,
				Err(e) => {
					for semaphore in &semaphores[..i] {
						unsafe { device.destroy_semaphore(*semaphore, None) };
					}
					return Err(e);
				}
			}
		}
		Ok(Self { semaphores })
	}

	#[inline]
	pub fn semaphore(&self, queue: QueueType) -> Semaphore {
		self.semaphores[queue.index()]
	}

	pub fn completed(&self, device: &Device, queue: QueueType) -> VkResult<u64> {
		unsafe { device.get_semaphore_counter_value(self.semaphore(queue)) }
	}

	/// Returns false if `timeout` elapsed before `epoch` was signaled.
	pub fn wait(&self, device: &Device, queue: QueueType, epoch: u64, timeout: Duration) -> VkResult<bool> {
		let timeout = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
		let result = unsafe {
			device.wait_semaphores(
				&SemaphoreWaitInfo::default()
					.semaphores(&[self.semaphore(queue)])
					.values(&[epoch]),
				timeout,
			)
		};
		match result {
			Ok(()) => Ok(true),
			Err(ash::vk::Result::TIMEOUT) => Ok(false),
			Err(e) => Err(e),
		}
	}

	/// # Safety
	/// No submission signaling any of the semaphores may be pending
	pub unsafe fn destroy(&mut self, device: &Device) {
		for semaphore in &mut self.semaphores {
			unsafe { device.destroy_semaphore(*semaphore, None) };
			*semaphore = Semaphore::null();
		}
	}
}
