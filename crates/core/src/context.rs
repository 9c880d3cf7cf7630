//! The [`GraphicsContext`] owns every pool, the epoch counters and the destroy queue, and implements the frame
//! boundary.

use crate::backing::handle::Handle;
use crate::backing::pool::Pools;
use crate::command::{CommandBuffer, CommandError};
use crate::config::{ConfigError, ContextConfig};
use crate::destroy::{DestroyQueue, DestroyRecord, DestroyResource};
use crate::epoch::{QueueEpochs, QueueType};
use crate::platform::{DebugObject, GraphicsPlatform};
use crate::resource::{
	Buffer, BufferCreateInfo, BufferSlot, BufferUsage, DescriptorSet, DescriptorSetSlot, Framebuffer, FramebufferSlot,
	Image, ImageCreateInfo, ImageSlot, Pipeline, PipelineSlot, ResourceKind, TrackedSlot,
};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

pub struct GraphicsContext<P: GraphicsPlatform> {
	platform: P,
	epochs: QueueEpochs,
	pools: Pools<P>,
	destroy_queue: DestroyQueue<P>,
	config: ContextConfig,
}

/// What happened during one [`GraphicsContext::next_frame`]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrameStats {
	/// The frame that was just started
	pub frame: u64,
	/// Soft destroyed resources whose pins were released and that entered the destroy queue
	pub disposed: usize,
	/// Resources whose backing objects were released
	pub released: usize,
	/// Resources that were due for release but are still busy
	pub requeued: usize,
	/// Live resources in all pools
	pub alive: usize,
}

#[derive(Error)]
#[error("Failed to allocate \"{name}\": {source}")]
pub struct AllocationError<P: GraphicsPlatform> {
	pub name: String,
	#[source]
	pub source: P::AllocationError,
}

impl<P: GraphicsPlatform> Debug for AllocationError<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		std::fmt::Display::fmt(self, f)
	}
}

impl<P: GraphicsPlatform> GraphicsContext<P> {
	pub fn new(platform: P, config: ContextConfig) -> Result<Self, ConfigError> {
		config.validate()?;
		Ok(Self {
			platform,
			epochs: QueueEpochs::new(),
			pools: Pools::new(),
			destroy_queue: DestroyQueue::new(config.frame_lag),
			config,
		})
	}

	#[inline]
	pub fn platform(&self) -> &P {
		&self.platform
	}

	#[inline]
	pub fn epochs(&self) -> &QueueEpochs {
		&self.epochs
	}

	#[inline]
	pub fn config(&self) -> &ContextConfig {
		&self.config
	}

	#[inline]
	pub fn frame_lag(&self) -> u32 {
		self.config.frame_lag
	}

	/// The amount of frames started with [`Self::next_frame`]
	#[inline]
	pub fn frame(&self) -> u64 {
		self.destroy_queue.frame()
	}

	#[inline]
	pub fn pools(&self) -> &Pools<P> {
		&self.pools
	}

	/// Amount of retired resources waiting to be released
	#[inline]
	pub fn pending_destroys(&self) -> usize {
		self.destroy_queue.len()
	}

	pub fn create_buffer(&mut self, create_info: &BufferCreateInfo) -> Result<Handle<Buffer>, AllocationError<P>> {
		let wrap = |source| AllocationError {
			name: create_info.name.to_owned(),
			source,
		};
		unsafe {
			let buffer = self.platform.alloc_buffer(create_info).map_err(wrap)?;
			self.platform.set_debug_name(DebugObject::Buffer(&buffer), create_info.name);
			let device_address = if create_info.usage.contains(BufferUsage::DEVICE_ADDRESS) {
				self.platform.buffer_device_address(&buffer)
			} else {
				0
			};
			Ok(self
				.pools
				.buffers
				.create(BufferSlot::new(buffer, create_info, device_address)))
		}
	}

	pub fn create_image(&mut self, create_info: &ImageCreateInfo) -> Result<Handle<Image>, AllocationError<P>> {
		unsafe {
			let image = self.platform.alloc_image(create_info).map_err(|source| AllocationError {
				name: create_info.name.to_owned(),
				source,
			})?;
			self.platform.set_debug_name(DebugObject::Image(&image), create_info.name);
			Ok(self.pools.images.create(ImageSlot::new(image, create_info)))
		}
	}

	pub fn create_framebuffer(
		&mut self,
		name: &str,
		create_info: P::FramebufferCreateInfo,
	) -> Result<Handle<Framebuffer>, AllocationError<P>> {
		let framebuffer = unsafe { self.platform.create_framebuffer(name, create_info) }.map_err(|source| {
			AllocationError {
				name: name.to_owned(),
				source,
			}
		})?;
		Ok(self.pools.framebuffers.create(FramebufferSlot::new(framebuffer, name)))
	}

	pub fn create_pipeline(
		&mut self,
		name: &str,
		create_info: P::PipelineCreateInfo,
	) -> Result<Handle<Pipeline>, AllocationError<P>> {
		let handle = self.reserve_pipeline(name);
		match self.load_pipeline(handle, create_info) {
			Ok(()) => Ok(handle),
			Err(e) => {
				self.destroy(handle);
				Err(e)
			}
		}
	}

	/// Reserves a pipeline slot without a pipeline, which will not be ready until [`Self::load_pipeline`] is called.
	pub fn reserve_pipeline(&mut self, name: &str) -> Handle<Pipeline> {
		self.pools.pipelines.create(PipelineSlot::new(None, name))
	}

	/// Creates the pipeline of a reserved slot. A pipeline that was loaded before is queued for destruction.
	pub fn load_pipeline(
		&mut self,
		handle: Handle<Pipeline>,
		create_info: P::PipelineCreateInfo,
	) -> Result<(), AllocationError<P>> {
		let slot = self.pools.pipelines.get_mut(handle);
		let pipeline = unsafe { self.platform.create_pipeline(slot.resource().name(), create_info) }.map_err(
			|source| AllocationError {
				name: slot.resource().name().to_owned(),
				source,
			},
		)?;
		if let Some(old) = slot.set_pipeline(pipeline) {
			// the old pipeline may still be in use
			self.destroy_queue.push(DestroyRecord {
				resource: Some(DestroyResource::Pipeline(old)),
				epochs: slot.resource().epochs().copy(),
				slot: None,
			});
		}
		Ok(())
	}

	pub fn create_descriptor_set(
		&mut self,
		name: &str,
		create_info: P::DescriptorSetCreateInfo,
	) -> Result<Handle<DescriptorSet>, AllocationError<P>> {
		let descriptor_set = unsafe { self.platform.create_descriptor_set(name, create_info) }.map_err(|source| {
			AllocationError {
				name: name.to_owned(),
				source,
			}
		})?;
		Ok(self
			.pools
			.descriptor_sets
			.create(DescriptorSetSlot::new(descriptor_set, name)))
	}

	/// See [`Pool::get`](crate::backing::pool::Pool::get)
	#[track_caller]
	pub fn get<K: ResourceKind>(&self, handle: Handle<K>) -> &K::Slot<P> {
		K::pool(&self.pools).get(handle)
	}

	#[track_caller]
	pub fn get_mut<K: ResourceKind>(&mut self, handle: Handle<K>) -> &mut K::Slot<P> {
		K::pool_mut(&mut self.pools).get_mut(handle)
	}

	pub fn try_get<K: ResourceKind>(&self, handle: Handle<K>) -> Option<&K::Slot<P>> {
		K::pool(&self.pools).try_get(handle)
	}

	pub fn is_alive<K: ResourceKind>(&self, handle: Handle<K>) -> bool {
		K::pool(&self.pools).is_alive(handle)
	}

	/// See [`Pool::destroy`](crate::backing::pool::Pool::destroy)
	#[track_caller]
	pub fn destroy<K: ResourceKind>(&mut self, handle: Handle<K>) -> bool {
		K::pool_mut(&mut self.pools).destroy(handle, &mut self.destroy_queue)
	}

	/// Whether the resource has a backing object and no other queue has pending work referencing it. False for stale
	/// handles.
	pub fn is_ready<K: ResourceKind>(&self, handle: Handle<K>) -> bool {
		self.try_get(handle)
			.is_some_and(|slot| slot.has_instance() && slot.resource().epochs().is_ready(&self.epochs))
	}

	/// Whether the GPU may still be using the resource, or a command buffer holds a pin on it. False for stale
	/// handles.
	pub fn is_busy<K: ResourceKind>(&self, handle: Handle<K>) -> bool {
		self.try_get(handle).is_some_and(|slot| {
			let resource = slot.resource();
			!slot.has_instance()
				|| resource.pins().is_pinned()
				|| resource.epochs().is_busy(&self.epochs, self.config.frame_lag)
		})
	}

	/// Waits until the frame submitted `frame_lag` frames ago completed, so at most `frame_lag` frames are in flight
	/// once the next frame is submitted.
	///
	/// Returns false if the GPU did not catch up within the emergency timeout, the caller should skip this frame.
	pub fn begin_frame(&self) -> Result<bool, P::SubmitError> {
		profiling::function_scope!();
		let target = (self.epochs.busy_time(QueueType::Frame) + 1).saturating_sub(self.config.frame_lag as u64);
		if target == 0 {
			return Ok(true);
		}
		let completed = self
			.platform
			.wait_epoch(QueueType::Frame, target, self.config.emergency_timeout)?;
		if !completed {
			log::warn!(
				"Frame epoch {} did not complete within {:?}, skipping frame",
				target,
				self.config.emergency_timeout
			);
		}
		Ok(completed)
	}

	/// The frame boundary: retires soft destroyed resources that are no longer pinned, drains the destroy queue and
	/// makes released slots available again.
	pub fn next_frame(&mut self) -> Result<FrameStats, P::SubmitError> {
		profiling::function_scope!();
		let disposed = self.pools.dispose(&mut self.destroy_queue);
		let drain = self.destroy_queue.next_frame(&self.platform, &self.epochs)?;
		let released = drain.released.len();
		for slot in drain.released {
			self.pools.recycle(slot);
		}
		Ok(FrameStats {
			frame: self.destroy_queue.frame(),
			disposed,
			released,
			requeued: drain.requeued,
			alive: self.pools.len(),
		})
	}

	/// Submits the command buffer recording this frame, which must target [`QueueType::Frame`].
	pub fn submit_frame(&self, cmd: &mut CommandBuffer<P>) -> Result<u64, CommandError<P>> {
		let queue = cmd.queue();
		if !queue.is_frame() {
			return Err(CommandError::UnsupportedQueue {
				operation: "submit_frame",
				queue,
			});
		}
		cmd.submit(self)
	}

	/// Blocks until the device finished all submitted work.
	pub fn wait_idle(&self) -> Result<(), P::SubmitError> {
		unsafe { self.platform.wait_idle() }
	}
}

impl<P: GraphicsPlatform> Drop for GraphicsContext<P> {
	fn drop(&mut self) {
		if let Err(e) = self.wait_idle() {
			log::error!("Failed to wait for device idle during teardown: {}", e);
		}
		let retired = self.pools.retire_all(&mut self.destroy_queue);
		// Safety: the device is idle
		let released = unsafe { self.destroy_queue.destroy_all(&self.platform) };
		log::debug!(
			"teardown: retired {} live resources, released {} slots",
			retired,
			released.len()
		);
	}
}

impl<P: GraphicsPlatform> Debug for GraphicsContext<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GraphicsContext")
			.field("epochs", &self.epochs.current())
			.field("pools", &self.pools)
			.field("destroy_queue", &self.destroy_queue)
			.field("config", &self.config)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::platform::headless::Headless;
	use crate::resource::{AllocationScheme, Extent, Format, ImageUsage, PinKind};
	use static_assertions::assert_impl_all;

	assert_impl_all!(GraphicsContext<Headless>: Send, Sync);

	fn context(platform: Headless) -> anyhow::Result<GraphicsContext<Headless>> {
		Ok(GraphicsContext::new(platform, ContextConfig::default())?)
	}

	fn storage_buffer(name: &str) -> BufferCreateInfo<'_> {
		BufferCreateInfo {
			name,
			usage: BufferUsage::STORAGE_BUFFER | BufferUsage::DEVICE_ADDRESS,
			size: 256,
			allocation_scheme: AllocationScheme::AllocatorManaged,
		}
	}

	#[test]
	fn test_create_destroy_buffer() -> anyhow::Result<()> {
		let mut ctx = context(Headless::new())?;
		let buffer = ctx.create_buffer(&storage_buffer("buffer"))?;
		assert_ne!(ctx.get(buffer).device_address(), 0);
		assert_eq!(ctx.get(buffer).size(), 256);
		assert!(ctx.is_ready(buffer));
		assert!(!ctx.is_busy(buffer));

		assert!(ctx.destroy(buffer));
		assert!(!ctx.is_alive(buffer));
		assert_eq!(ctx.pending_destroys(), 1);

		assert_eq!(ctx.next_frame()?.released, 0);
		let stats = ctx.next_frame()?;
		assert_eq!(stats.released, 1);
		assert_eq!(stats.alive, 0);
		assert_eq!(ctx.platform().stats().buffers_destroyed, 1);
		Ok(())
	}

	#[test]
	fn test_create_image() -> anyhow::Result<()> {
		let mut ctx = context(Headless::new())?;
		let image = ctx.create_image(&ImageCreateInfo {
			format: Format::R8G8B8A8_UNORM,
			extent: Extent::new_2d(64, 32),
			usage: ImageUsage::SAMPLED,
			name: "image",
			..ImageCreateInfo::default()
		})?;
		assert_eq!(ctx.get(image).extent(), Extent::new_2d(64, 32));
		assert!(ctx.destroy(image));
		ctx.next_frame()?;
		ctx.next_frame()?;
		assert_eq!(ctx.platform().stats().images_destroyed, 1);
		Ok(())
	}

	#[test]
	fn test_failed_allocation() -> anyhow::Result<()> {
		let mut ctx = context(Headless::new())?;
		ctx.platform().fail_allocations(true);
		let err = match ctx.create_buffer(&storage_buffer("too big")) {
			Err(e) => e,
			Ok(_) => anyhow::bail!("allocation should fail"),
		};
		assert!(err.to_string().contains("too big"));
		assert!(ctx.pools().is_empty());
		Ok(())
	}

	#[test]
	fn test_reserved_pipeline() -> anyhow::Result<()> {
		let mut ctx = context(Headless::new())?;
		let pipeline = ctx.reserve_pipeline("pipeline");
		assert!(!ctx.is_ready(pipeline));
		assert!(ctx.is_busy(pipeline));

		ctx.load_pipeline(pipeline, ())?;
		assert!(ctx.is_ready(pipeline));

		// reloading queues the old pipeline for destruction
		ctx.load_pipeline(pipeline, ())?;
		ctx.next_frame()?;
		ctx.next_frame()?;
		assert_eq!(ctx.platform().stats().pipelines_destroyed, 1);
		assert!(ctx.is_alive(pipeline));
		Ok(())
	}

	#[test]
	fn test_pinned_soft_destroy() -> anyhow::Result<()> {
		let mut ctx = context(Headless::new())?;
		let buffer = ctx.create_buffer(&storage_buffer("pinned"))?;
		let pin = ctx.get(buffer).resource().pin(PinKind::Busy);
		assert!(ctx.is_busy(buffer));
		assert!(!ctx.destroy(buffer));

		for _ in 0..4 {
			let stats = ctx.next_frame()?;
			assert_eq!(stats.disposed, 0);
			assert!(ctx.is_alive(buffer));
		}

		drop(pin);
		assert_eq!(ctx.next_frame()?.disposed, 1);
		assert!(!ctx.is_alive(buffer));
		ctx.next_frame()?;
		ctx.next_frame()?;
		assert_eq!(ctx.platform().stats().buffers_destroyed, 1);
		Ok(())
	}

	#[test]
	fn test_begin_frame_times_out() -> anyhow::Result<()> {
		let ctx = GraphicsContext::new(
			Headless::new_manual(),
			ContextConfig {
				emergency_timeout: std::time::Duration::ZERO,
				..ContextConfig::default()
			},
		)?;
		assert!(ctx.begin_frame()?);
		ctx.epochs().submit(QueueType::Frame);
		assert!(ctx.begin_frame()?);
		ctx.epochs().submit(QueueType::Frame);
		// two frames in flight and the first one did not complete
		assert!(!ctx.begin_frame()?);
		ctx.platform().complete(QueueType::Frame, 1);
		assert!(ctx.begin_frame()?);
		Ok(())
	}

	#[test]
	fn test_drop_releases_everything() -> anyhow::Result<()> {
		let platform = Headless::new_manual();
		let mut ctx = context(platform.clone())?;
		ctx.create_buffer(&storage_buffer("a"))?;
		ctx.create_buffer(&storage_buffer("b"))?;
		let destroyed = ctx.create_buffer(&storage_buffer("c"))?;
		assert!(ctx.destroy(destroyed));
		drop(ctx);
		let stats = platform.stats();
		assert_eq!(stats.buffers_created, 3);
		assert_eq!(stats.buffers_destroyed, 3);
		Ok(())
	}

	#[test]
	fn test_submit_frame_requires_frame_queue() -> anyhow::Result<()> {
		let ctx = context(Headless::new())?;
		let mut cmd = CommandBuffer::new(&ctx, QueueType::Graphics)?;
		cmd.begin(&ctx)?;
		cmd.end(&ctx)?;
		assert!(matches!(
			ctx.submit_frame(&mut cmd),
			Err(CommandError::UnsupportedQueue {
				queue: QueueType::Graphics,
				..
			})
		));
		cmd.reset(&ctx)?;
		cmd.destroy(&ctx)?;

		let mut frame = CommandBuffer::new(&ctx, QueueType::Frame)?;
		frame.begin(&ctx)?;
		frame.end(&ctx)?;
		assert_eq!(ctx.submit_frame(&mut frame)?, 1);
		assert_eq!(ctx.epochs().busy_time(QueueType::Frame), 1);
		frame.destroy(&ctx)?;
		Ok(())
	}

	/// Formats any platform's context, no matter if the platform itself is [`Debug`].
	fn describe<P: GraphicsPlatform>(ctx: &GraphicsContext<P>) -> String {
		format!("{ctx:?}")
	}

	#[test]
	fn test_debug_lists_pools() -> anyhow::Result<()> {
		let mut ctx = context(Headless::new())?;
		ctx.create_buffer(&storage_buffer("buffer"))?;
		let debug = describe(&ctx);
		assert!(debug.starts_with("GraphicsContext"));
		assert!(debug.contains("Pools"));
		assert!(debug.contains("descriptor_sets"));
		Ok(())
	}
}
