//! A CPU-only [`GraphicsPlatform`] for tests.
//!
//! Backing objects are plain structs with unique ids, mapped buffers are host memory and command buffers record a
//! list of [`HeadlessCommand`]s. Every submission completes immediately, unless created with
//! [`Headless::new_manual`], where the test drives completion with [`Headless::complete`] to simulate a GPU lagging
//! behind.

use crate::access::BufferAccess;
use crate::epoch::QueueType;
use crate::platform::{
	BufferBarrier, BufferCopy, CommandBufferLevel, DebugObject, GraphicsPlatform, SubpassContents,
};
use crate::resource::{BufferCreateInfo, BufferUsage, Extent, ImageCreateInfo};
use parking_lot::Mutex;
use presser::Slab;
use std::cell::UnsafeCell;
use std::ops::Range;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Fake device addresses start here, so that a valid address is never 0
pub const DEVICE_ADDRESS_BASE: u64 = 0x1_0000_0000;
/// Distance between the fake device addresses of two buffers
pub const DEVICE_ADDRESS_STRIDE: u64 = 0x1_0000;

/// Clones share the same state, so a test can keep observing a platform that was moved into a context.
#[derive(Clone, Debug)]
pub struct Headless {
	inner: Arc<HeadlessShared>,
}

#[derive(Debug)]
struct HeadlessShared {
	next_id: AtomicU64,
	auto_complete: bool,
	fail_allocations: AtomicBool,
	completed: [AtomicU64; QueueType::COUNT],
	stats: Mutex<HeadlessStats>,
	submissions: Mutex<Vec<HeadlessSubmission>>,
}

/// Counters of the calls made into a [`Headless`] platform
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HeadlessStats {
	pub buffers_created: u32,
	pub buffers_destroyed: u32,
	pub images_created: u32,
	pub images_destroyed: u32,
	pub framebuffers_destroyed: u32,
	pub pipelines_destroyed: u32,
	pub descriptor_sets_destroyed: u32,
	/// calls to [`GraphicsPlatform::flush_mapped_buffer`]
	pub uploads: u32,
	pub submissions: u32,
}

#[derive(Clone, Debug)]
pub struct HeadlessSubmission {
	pub queue: QueueType,
	pub epoch: u64,
	pub commands: Vec<HeadlessCommand>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HeadlessCommand {
	Barriers(Vec<(u64, BufferAccess, BufferAccess)>),
	BeginRenderPass { framebuffer: u64, contents: SubpassContents },
	NextSubpass(SubpassContents),
	EndRenderPass,
	/// The commands of the executed secondary command buffers, in execution order
	Execute(Vec<Vec<HeadlessCommand>>),
	BindPipeline(u64),
	BindDescriptorSet(u64),
	PushConstants(Vec<u8>),
	Draw { vertices: Range<u32>, instances: Range<u32> },
	Dispatch([u32; 3]),
	CopyBuffer { src: u64, dst: u64, regions: Vec<BufferCopy> },
}

impl Headless {
	/// A platform on which every submission completes immediately.
	pub fn new() -> Self {
		Self::with_auto_complete(true)
	}

	/// A platform on which submissions only complete once [`Self::complete`] is called.
	pub fn new_manual() -> Self {
		Self::with_auto_complete(false)
	}

	fn with_auto_complete(auto_complete: bool) -> Self {
		Self {
			inner: Arc::new(HeadlessShared {
				next_id: AtomicU64::new(1),
				auto_complete,
				fail_allocations: AtomicBool::new(false),
				completed: core::array::from_fn(|_| AtomicU64::new(0)),
				stats: Mutex::new(HeadlessStats::default()),
				submissions: Mutex::new(Vec::new()),
			}),
		}
	}

	/// Signals completion of all submissions on `queue` up to `epoch`.
	pub fn complete(&self, queue: QueueType, epoch: u64) {
		self.inner.completed[queue.index()].fetch_max(epoch, Relaxed);
	}

	/// Completes every submission made so far.
	pub fn complete_all(&self) {
		for submission in self.inner.submissions.lock().iter() {
			self.complete(submission.queue, submission.epoch);
		}
	}

	/// Makes all following allocations fail, or succeed again.
	pub fn fail_allocations(&self, fail: bool) {
		self.inner.fail_allocations.store(fail, Relaxed);
	}

	pub fn stats(&self) -> HeadlessStats {
		*self.inner.stats.lock()
	}

	pub fn submissions(&self) -> Vec<HeadlessSubmission> {
		self.inner.submissions.lock().clone()
	}

	fn next_id(&self) -> u64 {
		self.inner.next_id.fetch_add(1, Relaxed)
	}

	fn check_allocation(&self, size: u64) -> Result<(), HeadlessError> {
		if self.inner.fail_allocations.load(Relaxed) {
			Err(HeadlessError::OutOfMemory(size))
		} else {
			Ok(())
		}
	}
}

impl Default for Headless {
	fn default() -> Self {
		Self::new()
	}
}

#[derive(Error)]
pub enum HeadlessError {
	#[error("Out of memory allocating {0} bytes")]
	OutOfMemory(u64),
	#[error("Command buffer is in the wrong state: {0}")]
	InvalidState(&'static str),
}

impl core::fmt::Debug for HeadlessError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

/// Host memory standing in for mapped device memory, aligned to 8 bytes.
#[derive(Debug)]
pub struct HeadlessMemory(Vec<u64>);

unsafe impl Slab for HeadlessMemory {
	fn base_ptr(&self) -> *const u8 {
		self.0.as_ptr().cast()
	}

	fn base_ptr_mut(&mut self) -> *mut u8 {
		self.0.as_mut_ptr().cast()
	}

	fn size(&self) -> usize {
		self.0.len() * std::mem::size_of::<u64>()
	}
}

#[derive(Debug)]
pub struct HeadlessBuffer {
	pub id: u64,
	pub size: u64,
	pub usage: BufferUsage,
	memory: Option<UnsafeCell<HeadlessMemory>>,
}

/// Safety: the memory is only accessed through [`GraphicsPlatform::mapped_buffer_to_slab`], whose caller guarantees
/// exclusive access
unsafe impl Sync for HeadlessBuffer {}

impl HeadlessBuffer {
	/// Copies the mapped memory, empty if the buffer is not mappable.
	pub fn mapped_bytes(&self) -> Vec<u8> {
		match &self.memory {
			// Safety: shared read while no mapping is handed out, as required by mapped_buffer_to_slab
			Some(memory) => bytemuck::cast_slice(unsafe { &(*memory.get()).0 }).to_vec(),
			None => Vec::new(),
		}
	}

	/// The mapped memory read as `u64`s.
	pub fn mapped_u64(&self) -> Vec<u64> {
		match &self.memory {
			// Safety: see mapped_bytes
			Some(memory) => unsafe { (*memory.get()).0.clone() },
			None => Vec::new(),
		}
	}
}

#[derive(Debug)]
pub struct HeadlessImage {
	pub id: u64,
	pub extent: Extent,
}

#[derive(Debug)]
pub struct HeadlessObject {
	pub id: u64,
	pub name: String,
}

#[derive(Debug)]
pub struct HeadlessCommandPool {
	pub queue: QueueType,
	pub allocated: u32,
}

#[derive(Debug)]
pub struct HeadlessCommandBuffer {
	pub id: u64,
	pub level: CommandBufferLevel,
	pub recording: bool,
	pub commands: Vec<HeadlessCommand>,
}

unsafe impl GraphicsPlatform for Headless {
	type Buffer = HeadlessBuffer;
	type Image = HeadlessImage;
	type Framebuffer = HeadlessObject;
	type Pipeline = HeadlessObject;
	type DescriptorSet = HeadlessObject;
	type FramebufferCreateInfo = ();
	type PipelineCreateInfo = ();
	type DescriptorSetCreateInfo = ();
	type CommandPool = HeadlessCommandPool;
	type CommandBuffer = HeadlessCommandBuffer;
	type AllocationError = HeadlessError;
	type SubmitError = HeadlessError;

	unsafe fn alloc_buffer(&self, create_info: &BufferCreateInfo) -> Result<Self::Buffer, Self::AllocationError> {
		self.check_allocation(create_info.size)?;
		self.inner.stats.lock().buffers_created += 1;
		let memory = create_info
			.usage
			.is_mappable()
			.then(|| UnsafeCell::new(HeadlessMemory(vec![0; create_info.size.div_ceil(8) as usize])));
		Ok(HeadlessBuffer {
			id: self.next_id(),
			size: create_info.size,
			usage: create_info.usage,
			memory,
		})
	}

	unsafe fn buffer_device_address(&self, buffer: &Self::Buffer) -> u64 {
		DEVICE_ADDRESS_BASE + buffer.id * DEVICE_ADDRESS_STRIDE
	}

	unsafe fn mapped_buffer_to_slab(buffer: &Self::Buffer) -> &mut (impl Slab + '_) {
		match &buffer.memory {
			Some(memory) => unsafe { &mut *memory.get() },
			None => panic!("buffer {} is not mappable", buffer.id),
		}
	}

	unsafe fn flush_mapped_buffer(&self, _buffer: &Self::Buffer) -> Result<(), Self::AllocationError> {
		self.inner.stats.lock().uploads += 1;
		Ok(())
	}

	unsafe fn alloc_image(&self, create_info: &ImageCreateInfo) -> Result<Self::Image, Self::AllocationError> {
		let extent = create_info.extent;
		self.check_allocation(extent.width as u64 * extent.height as u64 * extent.depth as u64)?;
		self.inner.stats.lock().images_created += 1;
		Ok(HeadlessImage {
			id: self.next_id(),
			extent,
		})
	}

	unsafe fn create_framebuffer(&self, name: &str, _: ()) -> Result<Self::Framebuffer, Self::AllocationError> {
		Ok(HeadlessObject {
			id: self.next_id(),
			name: name.to_owned(),
		})
	}

	unsafe fn create_pipeline(&self, name: &str, _: ()) -> Result<Self::Pipeline, Self::AllocationError> {
		Ok(HeadlessObject {
			id: self.next_id(),
			name: name.to_owned(),
		})
	}

	unsafe fn create_descriptor_set(&self, name: &str, _: ()) -> Result<Self::DescriptorSet, Self::AllocationError> {
		self.check_allocation(0)?;
		Ok(HeadlessObject {
			id: self.next_id(),
			name: name.to_owned(),
		})
	}

	unsafe fn set_debug_name(&self, _object: DebugObject<'_, Self>, _name: &str) {}

	unsafe fn destroy_buffers(&self, buffers: impl Iterator<Item = Self::Buffer>) {
		self.inner.stats.lock().buffers_destroyed += buffers.count() as u32;
	}

	unsafe fn destroy_images(&self, images: impl Iterator<Item = Self::Image>) {
		self.inner.stats.lock().images_destroyed += images.count() as u32;
	}

	unsafe fn destroy_framebuffers(&self, framebuffers: impl Iterator<Item = Self::Framebuffer>) {
		self.inner.stats.lock().framebuffers_destroyed += framebuffers.count() as u32;
	}

	unsafe fn destroy_pipelines(&self, pipelines: impl Iterator<Item = Self::Pipeline>) {
		self.inner.stats.lock().pipelines_destroyed += pipelines.count() as u32;
	}

	unsafe fn destroy_descriptor_sets(&self, descriptor_sets: impl Iterator<Item = Self::DescriptorSet>) {
		self.inner.stats.lock().descriptor_sets_destroyed += descriptor_sets.count() as u32;
	}

	unsafe fn create_command_pool(&self, queue: QueueType) -> Result<Self::CommandPool, Self::SubmitError> {
		Ok(HeadlessCommandPool { queue, allocated: 0 })
	}

	unsafe fn destroy_command_pool(&self, _pool: Self::CommandPool) {}

	unsafe fn allocate_command_buffer(
		&self,
		pool: &mut Self::CommandPool,
		level: CommandBufferLevel,
	) -> Result<Self::CommandBuffer, Self::SubmitError> {
		pool.allocated += 1;
		Ok(HeadlessCommandBuffer {
			id: self.next_id(),
			level,
			recording: false,
			commands: Vec::new(),
		})
	}

	unsafe fn reset_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError> {
		cmd.recording = false;
		cmd.commands.clear();
		Ok(())
	}

	unsafe fn begin_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError> {
		if cmd.recording {
			return Err(HeadlessError::InvalidState("begin while recording"));
		}
		cmd.recording = true;
		cmd.commands.clear();
		Ok(())
	}

	unsafe fn begin_secondary_command_buffer(
		&self,
		cmd: &mut Self::CommandBuffer,
		_framebuffer: &Self::Framebuffer,
		_subpass: u32,
	) -> Result<(), Self::SubmitError> {
		if cmd.level != CommandBufferLevel::Secondary {
			return Err(HeadlessError::InvalidState("primary begun as secondary"));
		}
		unsafe { self.begin_command_buffer(cmd) }
	}

	unsafe fn end_command_buffer(&self, cmd: &mut Self::CommandBuffer) -> Result<(), Self::SubmitError> {
		if !cmd.recording {
			return Err(HeadlessError::InvalidState("end while not recording"));
		}
		cmd.recording = false;
		Ok(())
	}

	unsafe fn cmd_buffer_barriers(&self, cmd: &mut Self::CommandBuffer, barriers: &[BufferBarrier<'_, Self>]) {
		cmd.commands.push(HeadlessCommand::Barriers(
			barriers.iter().map(|b| (b.buffer.id, b.src, b.dst)).collect(),
		));
	}

	unsafe fn cmd_begin_render_pass(
		&self,
		cmd: &mut Self::CommandBuffer,
		framebuffer: &Self::Framebuffer,
		contents: SubpassContents,
	) {
		cmd.commands.push(HeadlessCommand::BeginRenderPass {
			framebuffer: framebuffer.id,
			contents,
		});
	}

	unsafe fn cmd_next_subpass(&self, cmd: &mut Self::CommandBuffer, contents: SubpassContents) {
		cmd.commands.push(HeadlessCommand::NextSubpass(contents));
	}

	unsafe fn cmd_end_render_pass(&self, cmd: &mut Self::CommandBuffer) {
		cmd.commands.push(HeadlessCommand::EndRenderPass);
	}

	unsafe fn cmd_execute_commands(&self, cmd: &mut Self::CommandBuffer, secondaries: &[&Self::CommandBuffer]) {
		cmd.commands.push(HeadlessCommand::Execute(
			secondaries.iter().map(|s| s.commands.clone()).collect(),
		));
	}

	unsafe fn cmd_bind_pipeline(&self, cmd: &mut Self::CommandBuffer, pipeline: &Self::Pipeline) {
		cmd.commands.push(HeadlessCommand::BindPipeline(pipeline.id));
	}

	unsafe fn cmd_bind_descriptor_set(
		&self,
		cmd: &mut Self::CommandBuffer,
		_pipeline: &Self::Pipeline,
		descriptor_set: &Self::DescriptorSet,
	) {
		cmd.commands.push(HeadlessCommand::BindDescriptorSet(descriptor_set.id));
	}

	unsafe fn cmd_push_constants(&self, cmd: &mut Self::CommandBuffer, _pipeline: &Self::Pipeline, bytes: &[u8]) {
		cmd.commands.push(HeadlessCommand::PushConstants(bytes.to_vec()));
	}

	unsafe fn cmd_draw(&self, cmd: &mut Self::CommandBuffer, vertices: Range<u32>, instances: Range<u32>) {
		cmd.commands.push(HeadlessCommand::Draw { vertices, instances });
	}

	unsafe fn cmd_dispatch(&self, cmd: &mut Self::CommandBuffer, group_counts: [u32; 3]) {
		cmd.commands.push(HeadlessCommand::Dispatch(group_counts));
	}

	unsafe fn cmd_copy_buffer(
		&self,
		cmd: &mut Self::CommandBuffer,
		src: &Self::Buffer,
		dst: &Self::Buffer,
		regions: &[BufferCopy],
	) {
		cmd.commands.push(HeadlessCommand::CopyBuffer {
			src: src.id,
			dst: dst.id,
			regions: regions.to_vec(),
		});
	}

	unsafe fn submit(&self, queue: QueueType, cmd: &Self::CommandBuffer, epoch: u64) -> Result<(), Self::SubmitError> {
		if cmd.recording {
			return Err(HeadlessError::InvalidState("submitted while recording"));
		}
		self.inner.stats.lock().submissions += 1;
		self.inner.submissions.lock().push(HeadlessSubmission {
			queue,
			epoch,
			commands: cmd.commands.clone(),
		});
		if self.inner.auto_complete {
			self.complete(queue, epoch);
		}
		Ok(())
	}

	fn completed_epoch(&self, queue: QueueType) -> Result<u64, Self::SubmitError> {
		Ok(self.inner.completed[queue.index()].load(Relaxed))
	}

	/// Never blocks: an epoch that did not complete yet times out immediately.
	fn wait_epoch(&self, queue: QueueType, epoch: u64, _timeout: Duration) -> Result<bool, Self::SubmitError> {
		Ok(self.completed_epoch(queue)? >= epoch)
	}

	unsafe fn wait_idle(&self) -> Result<(), Self::SubmitError> {
		self.complete_all();
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::resource::AllocationScheme;

	#[test]
	fn test_mapped_memory() -> anyhow::Result<()> {
		let platform = Headless::new();
		unsafe {
			let buffer = platform.alloc_buffer(&BufferCreateInfo {
				name: "mapped",
				usage: BufferUsage::MAP_WRITE,
				size: 24,
				allocation_scheme: AllocationScheme::AllocatorManaged,
			})?;
			let slab = Headless::mapped_buffer_to_slab(&buffer);
			presser::copy_from_slice_to_offset(&[1u64, 2, 3], slab, 0)?;
			assert_eq!(buffer.mapped_u64(), vec![1, 2, 3]);
		}
		Ok(())
	}

	#[test]
	fn test_manual_completion() -> anyhow::Result<()> {
		let platform = Headless::new_manual();
		assert!(!platform.wait_epoch(QueueType::Frame, 1, Duration::ZERO)?);
		platform.complete(QueueType::Frame, 2);
		assert!(platform.wait_epoch(QueueType::Frame, 1, Duration::ZERO)?);
		// completion never goes backwards
		platform.complete(QueueType::Frame, 1);
		assert_eq!(platform.completed_epoch(QueueType::Frame)?, 2);
		Ok(())
	}

	#[test]
	fn test_failing_allocation() {
		let platform = Headless::new();
		platform.fail_allocations(true);
		let result = unsafe {
			platform.alloc_buffer(&BufferCreateInfo {
				name: "fails",
				usage: BufferUsage::STORAGE_BUFFER,
				size: 16,
				allocation_scheme: AllocationScheme::AllocatorManaged,
			})
		};
		assert!(matches!(result, Err(HeadlessError::OutOfMemory(16))));
	}
}
