use crate::epoch::QueueType;
use crate::platform::ash::{
	AshCommandBuffer, AshCommandPool, AshTimelines, DeviceExt, ash_buffer_barrier, format_aspect,
};
use crate::platform::{
	BufferBarrier, BufferCopy, CommandBufferLevel, DebugObject, GraphicsPlatform, SubpassContents,
};
use crate::resource::{BufferCreateInfo, ImageCreateInfo};
use ash::ext::debug_utils;
use ash::prelude::VkResult;
use ash::vk::{
	BufferDeviceAddressInfo, ClearValue, CommandBufferBeginInfo, CommandBufferInheritanceInfo,
	CommandBufferResetFlags, CommandBufferUsageFlags, CommandPoolCreateFlags, CommandPoolCreateInfo,
	ComponentMapping, DebugUtilsObjectNameInfoEXT, DependencyInfo, DescriptorPool, DescriptorPoolCreateInfo,
	DescriptorPoolSize, DescriptorSetAllocateInfo, DescriptorSetLayout, Extent2D, Fence, FramebufferCreateInfo,
	Handle, ImageLayout, ImageSubresourceRange, ImageTiling, ImageView, ImageViewCreateInfo, MappedMemoryRange,
	MemoryPropertyFlags, Offset2D, PipelineBindPoint, PipelineLayout, Rect2D, RenderPass, RenderPassBeginInfo,
	SampleCountFlags, ShaderStageFlags, SharingMode, SubmitInfo, TimelineSemaphoreSubmitInfo,
};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator};
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use static_assertions::assert_impl_all;
use std::cell::UnsafeCell;
use std::ffi::CString;
use std::fmt::{Debug, Formatter};
use std::ops::{Deref, Range};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The Vulkan [`GraphicsPlatform`]. Every [`QueueType`] signals its epochs on its own timeline semaphore, even if
/// multiple queue types are backed by the same Vulkan queue.
pub struct Ash {
	pub create_info: AshCreateInfo,
	timelines: AshTimelines,
	non_coherent_atom_size: u64,
}
assert_impl_all!(Ash: Send, Sync);

impl Ash {
	pub fn new(create_info: AshCreateInfo) -> VkResult<Self> {
		let timelines = AshTimelines::new(&create_info.device)?;
		let non_coherent_atom_size = unsafe {
			create_info
				.instance
				.get_physical_device_properties(create_info.physical_device)
				.limits
				.non_coherent_atom_size
		};
		Ok(Self {
			create_info,
			timelines,
			non_coherent_atom_size,
		})
	}

	pub unsafe fn set_debug_object_name(&self, handle: impl Handle, name: &str) -> VkResult<()> {
		unsafe {
			if let Some(debug_utils) = self.extensions.debug_utils.as_ref() {
				// names with interior nul bytes stay unnamed
				if let Ok(name) = CString::new(name) {
					debug_utils.set_debug_utils_object_name(
						&DebugUtilsObjectNameInfoEXT::default()
							.object_handle(handle)
							.object_name(&name),
					)?;
				}
			}
			Ok(())
		}
	}

	unsafe fn create_image_view(
		&self,
		image: ash::vk::Image,
		create_info: &ImageCreateInfo,
	) -> Result<Option<ImageView>, AshAllocationError> {
		unsafe {
			if !create_info.usage.has_image_view() {
				return Ok(None);
			}
			let image_view = self.device.create_image_view(
				&ImageViewCreateInfo::default()
					.image(image)
					.view_type(create_info.extent.to_ash_image_view_type(create_info.array_layers))
					.format(create_info.format)
					.components(ComponentMapping::default()) // identity
					.subresource_range(ImageSubresourceRange {
						aspect_mask: format_aspect(create_info.format),
						base_mip_level: 0,
						level_count: create_info.mip_levels,
						base_array_layer: 0,
						layer_count: create_info.array_layers,
					}),
				None,
			)?;
			self.set_debug_object_name(image_view, create_info.name)?;
			Ok(Some(image_view))
		}
	}

	fn queue(&self, queue: QueueType) -> &AshQueue {
		&self.queues[queue.index()]
	}
}

impl Deref for Ash {
	type Target = AshCreateInfo;

	fn deref(&self) -> &Self::Target {
		&self.create_info
	}
}

impl Debug for Ash {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Ash")
			.field("physical_device", &self.physical_device)
			.field("queues", &self.queues)
			.field("timelines", &self.timelines)
			.finish()
	}
}

impl Drop for Ash {
	fn drop(&mut self) {
		unsafe {
			// semaphores may still be waited upon
			if let Err(e) = self.create_info.device.device_wait_idle() {
				log::error!("device_wait_idle failed while dropping the platform: {}", e);
			}
			self.timelines.destroy(&self.create_info.device);
		}
	}
}

/// A Vulkan queue, shared by all [`QueueType`]s it backs.
#[derive(Clone, Debug)]
pub struct AshQueue {
	pub family_index: u32,
	pub queue: Arc<Mutex<ash::vk::Queue>>,
}

pub struct AshCreateInfo {
	pub entry: ash::Entry,
	pub instance: ash::Instance,
	pub physical_device: ash::vk::PhysicalDevice,
	pub device: ash::Device,
	pub memory_allocator: Option<Mutex<Allocator>>,
	/// The queue backing each [`QueueType`], indexed by [`QueueType::index`]
	pub queues: [AshQueue; QueueType::COUNT],
	pub extensions: AshExtensions,
	pub destroy: Option<AshDestroyFn>,
}

pub type AshDestroyFn = Box<dyn FnOnce(&mut AshCreateInfo) + Send + Sync>;

#[derive(Default)]
#[non_exhaustive]
pub struct AshExtensions {
	pub debug_utils: Option<debug_utils::Device>,
}

impl AshCreateInfo {
	/// # Panics
	/// if the allocator was already dropped during teardown
	pub fn memory_allocator(&self) -> MutexGuard<'_, Allocator> {
		match self.memory_allocator.as_ref() {
			Some(allocator) => allocator.lock(),
			None => panic!("memory allocator used after teardown"),
		}
	}
}

impl Drop for AshCreateInfo {
	fn drop(&mut self) {
		if let Some(destroy) = self.destroy.take() {
			destroy(self);
		}
	}
}

/// Wraps gpu-allocator's Allocation to be able to [`Option::take`] it when the resource is destroyed.
///
/// # Safety
/// UnsafeCell: Required to gain mutable access where it is safe to do so, see safety of interface methods.
#[derive(Debug)]
pub struct AshMemoryAllocation(UnsafeCell<Option<Allocation>>);

impl AshMemoryAllocation {
	/// # Safety
	/// You must [`Self::take`] the Allocation and free it manually before dropping self
	pub unsafe fn new(allocation: Allocation) -> Self {
		Self(UnsafeCell::new(Some(allocation)))
	}

	/// # Safety
	/// You must ensure you have exclusive access to the Allocation
	#[allow(clippy::mut_from_ref)]
	pub unsafe fn get_mut(&self) -> &mut Allocation {
		match unsafe { (*self.0.get()).as_mut() } {
			Some(allocation) => allocation,
			None => unreachable!("allocation accessed after it was freed"),
		}
	}

	/// # Safety
	/// No mutable access may exist concurrently
	pub unsafe fn get(&self) -> Option<&Allocation> {
		unsafe { (*self.0.get()).as_ref() }
	}

	pub fn take(&self) -> Option<Allocation> {
		unsafe { (*self.0.get()).take() }
	}
}

/// Safety: Allocation is Send and Sync, it is only taken when destroyed
unsafe impl Send for AshMemoryAllocation {}
unsafe impl Sync for AshMemoryAllocation {}

#[derive(Debug)]
pub struct AshBuffer {
	pub buffer: ash::vk::Buffer,
	pub allocation: AshMemoryAllocation,
}

#[derive(Debug)]
pub struct AshImage {
	pub image: ash::vk::Image,
	pub image_view: Option<ImageView>,
	pub allocation: AshMemoryAllocation,
}

/// Creates a framebuffer for `render_pass`. The render pass is not owned and must outlive the framebuffer.
#[derive(Clone)]
pub struct AshFramebufferCreateInfo {
	pub render_pass: RenderPass,
	pub attachments: SmallVec<[ImageView; 4]>,
	pub extent: Extent2D,
	pub layers: u32,
	/// Clear values used when beginning the render pass, one per attachment
	pub clear_values: SmallVec<[ClearValue; 4]>,
}

impl Debug for AshFramebufferCreateInfo {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AshFramebufferCreateInfo")
			.field("render_pass", &self.render_pass)
			.field("attachments", &self.attachments)
			.field("extent", &self.extent)
			.field("layers", &self.layers)
			.finish()
	}
}

pub struct AshFramebuffer {
	pub framebuffer: ash::vk::Framebuffer,
	pub render_pass: RenderPass,
	pub extent: Extent2D,
	pub clear_values: SmallVec<[ClearValue; 4]>,
}

impl Debug for AshFramebuffer {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AshFramebuffer")
			.field("framebuffer", &self.framebuffer)
			.field("render_pass", &self.render_pass)
			.field("extent", &self.extent)
			.finish()
	}
}

/// Adopts an already created pipeline together with its layout, both are destroyed with the resource.
#[derive(Copy, Clone, Debug)]
pub struct AshPipelineCreateInfo {
	pub pipeline: ash::vk::Pipeline,
	pub layout: PipelineLayout,
	pub bind_point: PipelineBindPoint,
	/// The stages push constants are pushed to
	pub push_constant_stages: ShaderStageFlags,
}

pub type AshPipeline = AshPipelineCreateInfo;

/// Allocates a descriptor set of `layout` from a dedicated pool. The layout is not owned and must outlive the set.
#[derive(Clone, Debug)]
pub struct AshDescriptorSetCreateInfo {
	pub layout: DescriptorSetLayout,
	pub pool_sizes: SmallVec<[DescriptorPoolSize; 4]>,
}

#[derive(Copy, Clone, Debug)]
pub struct AshDescriptorSet {
	pub pool: DescriptorPool,
	pub set: ash::vk::DescriptorSet,
}

impl Deref for AshDescriptorSet {
	type Target = ash::vk::DescriptorSet;

	fn deref(&self) -> &Self::Target {
		&self.set
	}
}

#[derive(Error)]
pub enum AshAllocationError {
	#[error("VkResult: {0}")]
	Vk(#[from] ash::vk::Result),
	#[error("gpu-allocator Error: {0}")]
	Allocation(#[from] gpu_allocator::AllocationError),
}

impl Debug for AshAllocationError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		std::fmt::Display::fmt(self, f)
	}
}

unsafe impl GraphicsPlatform for Ash {
	type Buffer = AshBuffer;
	type Image = AshImage;
	type Framebuffer = AshFramebuffer;
	type Pipeline = AshPipeline;
	type DescriptorSet = AshDescriptorSet;
	type FramebufferCreateInfo = AshFramebufferCreateInfo;
	type PipelineCreateInfo = AshPipelineCreateInfo;
	type DescriptorSetCreateInfo = AshDescriptorSetCreateInfo;
	type CommandPool = AshCommandPool;
	type CommandBuffer = AshCommandBuffer;
	type AllocationError = AshAllocationError;
	type SubmitError = ash::vk::Result;

	unsafe fn alloc_buffer(&self, create_info: &BufferCreateInfo) -> Result<Self::Buffer, Self::AllocationError> {
		unsafe {
			let buffer = self.device.create_buffer(
				&ash::vk::BufferCreateInfo::default()
					.usage(create_info.usage.to_ash_buffer_usage_flags())
					.size(create_info.size)
					.sharing_mode(SharingMode::EXCLUSIVE),
				None,
			)?;
			let requirements = self.device.get_buffer_memory_requirements(buffer);
			let allocation = self.memory_allocator().allocate(&AllocationCreateDesc {
				requirements,
				name: create_info.name,
				location: create_info.usage.to_gpu_allocator_memory_location(),
				allocation_scheme: create_info.allocation_scheme.to_gpu_allocator_buffer(buffer),
				linear: true,
			});
			let allocation = match allocation {
				Ok(allocation) => allocation,
				Err(e) => {
					self.device.destroy_buffer(buffer, None);
					return Err(e.into());
				}
			};
			self.device
				.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
			Ok(AshBuffer {
				buffer,
				allocation: AshMemoryAllocation::new(allocation),
			})
		}
	}

	unsafe fn buffer_device_address(&self, buffer: &Self::Buffer) -> u64 {
		unsafe {
			self.device
				.get_buffer_device_address(&BufferDeviceAddressInfo::default().buffer(buffer.buffer))
		}
	}

	unsafe fn mapped_buffer_to_slab(buffer: &Self::Buffer) -> &mut (impl presser::Slab + '_) {
		unsafe { buffer.allocation.get_mut() }
	}

	unsafe fn flush_mapped_buffer(&self, buffer: &Self::Buffer) -> Result<(), Self::AllocationError> {
		unsafe {
			let Some(allocation) = buffer.allocation.get() else {
				return Ok(());
			};
			if allocation
				.memory_properties()
				.contains(MemoryPropertyFlags::HOST_COHERENT)
			{
				return Ok(());
			}
			let atom = self.non_coherent_atom_size.max(1);
			let offset = allocation.offset() / atom * atom;
			let size = (allocation.offset() + allocation.size() - offset).div_ceil(atom) * atom;
			self.device.flush_mapped_memory_ranges(&[MappedMemoryRange::default()
				.memory(allocation.memory())
				.offset(offset)
				.size(size)])?;
			Ok(())
		}
	}

	unsafe fn alloc_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::AllocationError> {
		unsafe {
			let image = self.device.create_image(
				&ash::vk::ImageCreateInfo::default()
					.image_type(create_info.extent.to_ash_image_type())
					.format(create_info.format)
					.extent(create_info.extent.into())
					.mip_levels(create_info.mip_levels)
					.array_layers(create_info.array_layers)
					.samples(SampleCountFlags::TYPE_1)
					.tiling(ImageTiling::OPTIMAL)
					.usage(create_info.usage.to_ash_image_usage_flags())
					.sharing_mode(SharingMode::EXCLUSIVE)
					.initial_layout(ImageLayout::UNDEFINED),
				None,
			)?;
			let requirements = self.device.get_image_memory_requirements(image);
			let allocation = self.memory_allocator().allocate(&AllocationCreateDesc {
				requirements,
				name: create_info.name,
				location: gpu_allocator::MemoryLocation::GpuOnly,
				allocation_scheme: create_info.allocation_scheme.to_gpu_allocator_image(image),
				linear: false,
			});
			let allocation = match allocation {
				Ok(allocation) => allocation,
				Err(e) => {
					self.device.destroy_image(image, None);
					return Err(e.into());
				}
			};
			self.device
				.bind_image_memory(image, allocation.memory(), allocation.offset())?;
			let allocation = AshMemoryAllocation::new(allocation);
			match self.create_image_view(image, create_info) {
				Ok(image_view) => Ok(AshImage {
					image,
					image_view,
					allocation,
				}),
				Err(e) => {
					self.destroy_images([AshImage {
						image,
						image_view: None,
						allocation,
					}]
					.into_iter());
					Err(e)
				}
			}
		}
	}

	unsafe fn create_framebuffer(
		&self,
		name: &str,
		create_info: Self::FramebufferCreateInfo,
	) -> Result<Self::Framebuffer, Self::AllocationError> {
		unsafe {
			let framebuffer = self.device.create_framebuffer(
				&FramebufferCreateInfo::default()
					.render_pass(create_info.render_pass)
					.attachments(&create_info.attachments)
					.width(create_info.extent.width)
					.height(create_info.extent.height)
					.layers(create_info.layers),
				None,
			)?;
			self.set_debug_object_name(framebuffer, name)?;
			Ok(AshFramebuffer {
				framebuffer,
				render_pass: create_info.render_pass,
				extent: create_info.extent,
				clear_values: create_info.clear_values,
			})
		}
	}

	unsafe fn create_pipeline(
		&self,
		name: &str,
		create_info: Self::PipelineCreateInfo,
	) -> Result<Self::Pipeline, Self::AllocationError> {
		unsafe {
			self.set_debug_object_name(create_info.pipeline, name)?;
			Ok(create_info)
		}
	}

	unsafe fn create_descriptor_set(
		&self,
		name: &str,
		create_info: Self::DescriptorSetCreateInfo,
	) -> Result<Self::DescriptorSet, Self::AllocationError> {
		unsafe {
			let pool = self.device.create_descriptor_pool(
				&DescriptorPoolCreateInfo::default()
					.pool_sizes(&create_info.pool_sizes)
					.max_sets(1),
				None,
			)?;
			let sets = self.device.allocate_descriptor_sets(
				&DescriptorSetAllocateInfo::default()
					.descriptor_pool(pool)
					.set_layouts(&[create_info.layout]),
			);
			let set = match sets.map(|sets| sets.into_iter().next()) {
				Ok(Some(set)) => set,
				Ok(None) => {
					self.device.destroy_descriptor_pool(pool, None);
					return Err(ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY.into());
				}
				Err(e) => {
					self.device.destroy_descriptor_pool(pool, None);
					return Err(e.into());
				}
			};
			self.set_debug_object_name(set, name)?;
			Ok(AshDescriptorSet { pool, set })
		}
	}

	unsafe fn set_debug_name(&self, object: DebugObject<'_, Self>, name: &str) {
		let result = unsafe {
			match object {
				DebugObject::Buffer(buffer) => self.set_debug_object_name(buffer.buffer, name),
				DebugObject::Image(image) => self.set_debug_object_name(image.image, name),
				DebugObject::CommandBuffer(cmd) => self.set_debug_object_name(cmd.cmd, name),
			}
		};
		if let Err(e) = result {
			log::warn!("Failed to set debug name \"{}\": {}", name, e);
		}
	}

	unsafe fn destroy_buffers(&self, buffers: impl Iterator<Item = Self::Buffer>) {
		unsafe {
			let mut allocator = self.memory_allocator();
			for buffer in buffers {
				if let Some(allocation) = buffer.allocation.take() {
					if let Err(e) = allocator.free(allocation) {
						log::error!("Failed to free buffer memory: {}", e);
					}
				}
				self.device.destroy_buffer(buffer.buffer, None);
			}
		}
	}

	unsafe fn destroy_images(&self, images: impl Iterator<Item = Self::Image>) {
		unsafe {
			let mut allocator = self.memory_allocator();
			for image in images {
				if let Some(allocation) = image.allocation.take() {
					if let Err(e) = allocator.free(allocation) {
						log::error!("Failed to free image memory: {}", e);
					}
				}
				if let Some(image_view) = image.image_view {
					self.device.destroy_image_view(image_view, None);
				}
				self.device.destroy_image(image.image, None);
			}
		}
	}

	unsafe fn destroy_framebuffers(&self, framebuffers: impl Iterator<Item = Self::Framebuffer>) {
		unsafe {
			for framebuffer in framebuffers {
				self.device.destroy_framebuffer(framebuffer.framebuffer, None);
			}
		}
	}

	unsafe fn destroy_pipelines(&self, pipelines: impl Iterator<Item = Self::Pipeline>) {
		unsafe {
			for pipeline in pipelines {
				self.device.destroy_pipeline(pipeline.pipeline, None);
				self.device.destroy_pipeline_layout(pipeline.layout, None);
			}
		}
	}

	unsafe fn destroy_descriptor_sets(&self, descriptor_sets: impl Iterator<Item = Self::DescriptorSet>) {
		unsafe {
			for set in descriptor_sets {
				// sets allocated from the pool are freed implicitly
				self.device.destroy_descriptor_pool(set.pool, None);
			}
		}
	}

	unsafe fn create_command_pool(&self, queue: QueueType) -> Result<Self::CommandPool, Self::SubmitError> {
		unsafe {
			let pool = self.device.create_command_pool(
				&CommandPoolCreateInfo::default()
					.flags(CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
					.queue_family_index(self.queue(queue).family_index),
				None,
			)?;
			Ok(AshCommandPool { pool, queue })
		}
	}

	unsafe fn destroy_command_pool(&self, pool: Self::CommandPool) {
		unsafe { self.device.destroy_command_pool(pool.pool, None) }
	}

	unsafe fn allocate_command_buffer(
		&self,
		pool: &mut Self::CommandPool,
		level: CommandBufferLevel,
	) -> Result<Self::CommandBuffer, Self::SubmitError> {
		unsafe {
			let cmd = self
				.device
				.allocate_command_buffer(pool.pool, level.to_ash_command_buffer_level())?;
			Ok(AshCommandBuffer { cmd, level })
		}
	}

	unsafe fn reset_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError> {
		unsafe {
			self.device
				.reset_command_buffer(cmd.cmd, CommandBufferResetFlags::empty())
		}
	}

	unsafe fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError> {
		unsafe {
			self.device.begin_command_buffer(
				cmd.cmd,
				&CommandBufferBeginInfo::default().flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT),
			)
		}
	}

	unsafe fn begin_secondary_command_buffer(
		&self,
		cmd: &mut Self::CommandBuffer,
		framebuffer: &Self::Framebuffer,
		subpass: u32,
	) -> Result<(), Self::SubmitError> {
		unsafe {
			self.device.begin_command_buffer(
				cmd.cmd,
				&CommandBufferBeginInfo::default()
					.flags(CommandBufferUsageFlags::ONE_TIME_SUBMIT | CommandBufferUsageFlags::RENDER_PASS_CONTINUE)
					.inheritance_info(
						&CommandBufferInheritanceInfo::default()
							.render_pass(framebuffer.render_pass)
							.subpass(subpass)
							.framebuffer(framebuffer.framebuffer),
					),
			)
		}
	}

	unsafe fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError> {
		unsafe { self.device.end_command_buffer(cmd.cmd) }
	}

	unsafe fn cmd_buffer_barriers(&self, cmd: &mut Self::CommandBuffer, barriers: &[BufferBarrier<'_, Self>]) {
		unsafe {
			let barriers = barriers
				.iter()
				.map(|b| ash_buffer_barrier(b.buffer.buffer, b.src, b.dst))
				.collect::<SmallVec<[_; 8]>>();
			self.device
				.cmd_pipeline_barrier2(cmd.cmd, &DependencyInfo::default().buffer_memory_barriers(&barriers));
		}
	}

	unsafe fn cmd_begin_render_pass(
		&self,
		cmd: &mut Self::CommandBuffer,
		framebuffer: &Self::Framebuffer,
		contents: SubpassContents,
	) {
		unsafe {
			self.device.cmd_begin_render_pass(
				cmd.cmd,
				&RenderPassBeginInfo::default()
					.render_pass(framebuffer.render_pass)
					.framebuffer(framebuffer.framebuffer)
					.render_area(Rect2D {
						offset: Offset2D { x: 0, y: 0 },
						extent: framebuffer.extent,
					})
					.clear_values(&framebuffer.clear_values),
				contents.to_ash_subpass_contents(),
			)
		}
	}

	unsafe fn cmd_next_subpass(&self, cmd: &mut Self::CommandBuffer, contents: SubpassContents) {
		unsafe {
			self.device
				.cmd_next_subpass(cmd.cmd, contents.to_ash_subpass_contents())
		}
	}

	unsafe fn cmd_end_render_pass(&self, cmd: &mut Self::CommandBuffer) {
		unsafe { self.device.cmd_end_render_pass(cmd.cmd) }
	}

	unsafe fn cmd_execute_commands(&self, cmd: &mut Self::CommandBuffer, secondaries: &[&Self::CommandBuffer]) {
		unsafe {
			let secondaries = secondaries.iter().map(|s| s.cmd).collect::<SmallVec<[_; 16]>>();
			if !secondaries.is_empty() {
				self.device.cmd_execute_commands(cmd.cmd, &secondaries);
			}
		}
	}

	unsafe fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, pipeline: &Self::Pipeline) {
		unsafe {
			self.device
				.cmd_bind_pipeline(cmd.cmd, pipeline.bind_point, pipeline.pipeline)
		}
	}

	unsafe fn cmd_bind_descriptor_set(
		&self,
		cmd: &mut Self::CommandBuffer,
		pipeline: &Self::Pipeline,
		descriptor_set: &Self::DescriptorSet,
	) {
		unsafe {
			self.device.cmd_bind_descriptor_sets(
				cmd.cmd,
				pipeline.bind_point,
				pipeline.layout,
				0,
				&[descriptor_set.set],
				&[],
			)
		}
	}

	unsafe fn cmd_push_constants(&self, cmd: &mut Self::CommandBuffer, pipeline: &Self::Pipeline, bytes: &[u8]) {
		unsafe {
			self.device
				.cmd_push_constants(cmd.cmd, pipeline.layout, pipeline.push_constant_stages, 0, bytes)
		}
	}

	unsafe fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertices: Range<u32>, instances: Range<u32>) {
		unsafe {
			self.device.cmd_draw(
				cmd.cmd,
				vertices.len() as u32,
				instances.len() as u32,
				vertices.start,
				instances.start,
			)
		}
	}

	unsafe fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, group_counts: [u32; 3]) {
		unsafe {
			let [x, y, z] = group_counts;
			self.device.cmd_dispatch(cmd.cmd, x, y, z)
		}
	}

	unsafe fn cmd_copy_buffer(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Buffer,
		dst: &Self::Buffer,
		regions: &[BufferCopy],
	) {
		unsafe {
			let regions = regions
				.iter()
				.map(|r| ash::vk::BufferCopy {
					src_offset: r.src_offset,
					dst_offset: r.dst_offset,
					size: r.size,
				})
				.collect::<SmallVec<[_; 4]>>();
			self.device
				.cmd_copy_buffer(cmd.cmd, src.buffer, dst.buffer, &regions)
		}
	}

	unsafe fn submit(&self, queue: QueueType, cmd: &Self::CommandBuffer, epoch: u64) -> Result<(), Self::SubmitError> {
		unsafe {
			let semaphore = self.timelines.semaphore(queue);
			let vk_queue = self.queue(queue).queue.lock();
			self.device.queue_submit(
				*vk_queue,
				&[SubmitInfo::default()
					.command_buffers(&[cmd.cmd])
					.signal_semaphores(&[semaphore])
					.push_next(&mut TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&[epoch]))],
				Fence::null(),
			)
		}
	}

	fn completed_epoch(&self, queue: QueueType) -> Result<u64, Self::SubmitError> {
		self.timelines.completed(&self.device, queue)
	}

	fn wait_epoch(&self, queue: QueueType, epoch: u64, timeout: Duration) -> Result<bool, Self::SubmitError> {
		self.timelines.wait(&self.device, queue, epoch, timeout)
	}

	unsafe fn wait_idle(&self) -> Result<(), Self::SubmitError> {
		unsafe { self.device.device_wait_idle() }
	}
}
