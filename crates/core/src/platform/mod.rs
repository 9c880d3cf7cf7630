pub mod ash;
#[cfg(any(test, feature = "headless"))]
pub mod headless;

use crate::access::BufferAccess;
use crate::epoch::QueueType;
use crate::resource::{BufferCreateInfo, ImageCreateInfo};
use std::error::Error;
use std::ops::Range;
use std::time::Duration;

/// Internal interface to the graphics API, may change at any time!
///
/// All `unsafe` methods require the caller to uphold the graphics API's external synchronization and lifetime rules:
/// objects passed in must be alive and must not be in use by the GPU when destroyed or reset.
pub unsafe trait GraphicsPlatform: Sized + Send + Sync + 'static {
	type Buffer: 'static + Send + Sync;
	type Image: 'static + Send + Sync;
	type Framebuffer: 'static + Send + Sync;
	type Pipeline: 'static + Send + Sync;
	type DescriptorSet: 'static + Send + Sync;
	type FramebufferCreateInfo;
	type PipelineCreateInfo;
	type DescriptorSetCreateInfo;
	type CommandPool: 'static + Send;
	type CommandBuffer: 'static + Send;
	type AllocationError: 'static + Error + Send + Sync;
	type SubmitError: 'static + Error + Send + Sync;

	unsafe fn alloc_buffer(&self, create_info: &BufferCreateInfo) -> Result<Self::Buffer, Self::AllocationError>;

	/// Only valid for buffers created with [`BufferUsage::DEVICE_ADDRESS`]
	///
	/// [`BufferUsage::DEVICE_ADDRESS`]: crate::resource::BufferUsage::DEVICE_ADDRESS
	unsafe fn buffer_device_address(&self, buffer: &Self::Buffer) -> u64;

	/// Exclusive access to the host mapped memory of a buffer created with a map usage.
	#[allow(clippy::mut_from_ref)]
	unsafe fn mapped_buffer_to_slab(buffer: &Self::Buffer) -> &mut (impl presser::Slab + '_);

	/// Makes host writes to the mapped memory of `buffer` visible to the device.
	unsafe fn flush_mapped_buffer(&self, buffer: &Self::Buffer) -> Result<(), Self::AllocationError>;

	unsafe fn alloc_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::AllocationError>;

	unsafe fn create_framebuffer(
		&self,
		name: &str,
		create_info: Self::FramebufferCreateInfo,
	) -> Result<Self::Framebuffer, Self::AllocationError>;

	unsafe fn create_pipeline(
		&self,
		name: &str,
		create_info: Self::PipelineCreateInfo,
	) -> Result<Self::Pipeline, Self::AllocationError>;

	unsafe fn create_descriptor_set(
		&self,
		name: &str,
		create_info: Self::DescriptorSetCreateInfo,
	) -> Result<Self::DescriptorSet, Self::AllocationError>;

	unsafe fn set_debug_name(&self, object: DebugObject<'_, Self>, name: &str);

	unsafe fn destroy_buffers(&self, buffers: impl Iterator<Item = Self::Buffer>);

	unsafe fn destroy_images(&self, images: impl Iterator<Item = Self::Image>);

	unsafe fn destroy_framebuffers(&self, framebuffers: impl Iterator<Item = Self::Framebuffer>);

	unsafe fn destroy_pipelines(&self, pipelines: impl Iterator<Item = Self::Pipeline>);

	unsafe fn destroy_descriptor_sets(&self, descriptor_sets: impl Iterator<Item = Self::DescriptorSet>);

	/// Creates a pool to allocate command buffers from, to be used by a single thread at a time.
	unsafe fn create_command_pool(&self, queue: QueueType) -> Result<Self::CommandPool, Self::SubmitError>;

	/// Destroys the pool together with all command buffers allocated from it.
	unsafe fn destroy_command_pool(&self, pool: Self::CommandPool);

	unsafe fn allocate_command_buffer(
		&self,
		pool: &mut Self::CommandPool,
		level: CommandBufferLevel,
	) -> Result<Self::CommandBuffer, Self::SubmitError>;

	unsafe fn reset_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError>;

	unsafe fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError>;

	/// Begins a secondary command buffer that continues `subpass` of the render pass of `framebuffer`.
	unsafe fn begin_secondary_command_buffer(
		&self,
		cmd: &mut Self::CommandBuffer,
		framebuffer: &Self::Framebuffer,
		subpass: u32,
	) -> Result<(), Self::SubmitError>;

	unsafe fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError>;

	unsafe fn cmd_buffer_barriers(&self, cmd: &mut Self::CommandBuffer, barriers: &[BufferBarrier<'_, Self>]);

	unsafe fn cmd_begin_render_pass(
		&self,
		cmd: &mut Self::CommandBuffer,
		framebuffer: &Self::Framebuffer,
		contents: SubpassContents,
	);

	unsafe fn cmd_next_subpass(&self, cmd: &mut Self::CommandBuffer, contents: SubpassContents);

	unsafe fn cmd_end_render_pass(&self, cmd: &mut Self::CommandBuffer);

	unsafe fn cmd_execute_commands(&self, cmd: &mut Self::CommandBuffer, secondaries: &[&Self::CommandBuffer]);

	unsafe fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, pipeline: &Self::Pipeline);

	unsafe fn cmd_bind_descriptor_set(
		&self,
		cmd: &mut Self::CommandBuffer,
		pipeline: &Self::Pipeline,
		descriptor_set: &Self::DescriptorSet,
	);

	unsafe fn cmd_push_constants(&self, cmd: &mut Self::CommandBuffer, pipeline: &Self::Pipeline, bytes: &[u8]);

	unsafe fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertices: Range<u32>, instances: Range<u32>);

	unsafe fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, group_counts: [u32; 3]);

	unsafe fn cmd_copy_buffer(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Buffer,
		dst: &Self::Buffer,
		regions: &[BufferCopy],
	);

	/// Submits `cmd` to `queue`, signalling `epoch` on the queue's timeline once it completed.
	unsafe fn submit(&self, queue: QueueType, cmd: &Self::CommandBuffer, epoch: u64) -> Result<(), Self::SubmitError>;

	/// The highest epoch the device signalled completion of on `queue`.
	fn completed_epoch(&self, queue: QueueType) -> Result<u64, Self::SubmitError>;

	/// Blocks until `epoch` completed on `queue` or `timeout` elapsed. Returns false on timeout.
	fn wait_epoch(&self, queue: QueueType, epoch: u64, timeout: Duration) -> Result<bool, Self::SubmitError>;

	unsafe fn wait_idle(&self) -> Result<(), Self::SubmitError>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandBufferLevel {
	Primary,
	Secondary,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubpassContents {
	Inline,
	SecondaryCommandBuffers,
}

/// Transition of a whole buffer between two barrier states.
pub struct BufferBarrier<'a, P: GraphicsPlatform> {
	pub buffer: &'a P::Buffer,
	pub src: BufferAccess,
	pub dst: BufferAccess,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BufferCopy {
	pub src_offset: u64,
	pub dst_offset: u64,
	pub size: u64,
}

/// Objects that may be named for debugging tools.
pub enum DebugObject<'a, P: GraphicsPlatform> {
	Buffer(&'a P::Buffer),
	Image(&'a P::Image),
	CommandBuffer(&'a P::CommandBuffer),
}
