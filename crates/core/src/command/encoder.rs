use crate::access::{AccessError, BufferAccess};
use crate::backing::handle::{AnyHandle, Handle};
use crate::command::CommandError;
use crate::context::GraphicsContext;
use crate::epoch::QueueType;
use crate::platform::{BufferBarrier, BufferCopy, GraphicsPlatform};
use crate::resource::{
	Buffer, BufferSlot, DescriptorSet, Pin, PinKind, Pipeline, PipelineSlot, ResourceKind, TrackedSlot,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::ops::Range;

/// The pins a recording holds on the resources it referenced, at most one per resource.
#[derive(Debug)]
pub struct ResourceTracker {
	queue: QueueType,
	pins: FxHashMap<AnyHandle, Pin>,
}

impl ResourceTracker {
	pub fn new(queue: QueueType) -> Self {
		Self {
			queue,
			pins: FxHashMap::default(),
		}
	}

	#[inline]
	pub fn queue(&self) -> QueueType {
		self.queue
	}

	/// Amount of pinned resources
	#[inline]
	pub fn len(&self) -> usize {
		self.pins.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.pins.is_empty()
	}

	pub fn is_pinned<K: ResourceKind>(&self, handle: Handle<K>) -> bool {
		self.pins.contains_key(&handle.erase())
	}

	/// Takes a ready pin on a resource ahead of recording.
	pub fn reserve<'c, P: GraphicsPlatform, K: ResourceKind>(
		&mut self,
		ctx: &'c GraphicsContext<P>,
		handle: Handle<K>,
	) -> Result<&'c K::Slot<P>, AccessError> {
		let slot = ctx.try_get(handle).ok_or(AccessError::StaleHandle(handle.erase()))?;
		self.pins
			.entry(handle.erase())
			.or_insert_with(|| slot.resource().pin(PinKind::Ready));
		Ok(slot)
	}

	/// Marks the resource as used by the upcoming submission on this queue. Outside the frame queue, which is
	/// protected by the frame lag, the resource is also pinned until the submission retires.
	pub fn use_resource<'c, P: GraphicsPlatform, K: ResourceKind>(
		&mut self,
		ctx: &'c GraphicsContext<P>,
		handle: Handle<K>,
	) -> Result<&'c K::Slot<P>, AccessError> {
		let slot = ctx.try_get(handle).ok_or(AccessError::StaleHandle(handle.erase()))?;
		let resource = slot.resource();
		if !slot.has_instance() || !resource.epochs().is_ready_on(ctx.epochs(), self.queue) {
			return Err(AccessError::NotReady {
				name: resource.name().to_owned(),
			});
		}
		resource.mark_used(self.queue, ctx.epochs());
		if !self.queue.is_frame() {
			self.pins
				.entry(handle.erase())
				.or_insert_with(|| resource.pin(PinKind::Busy));
		}
		Ok(slot)
	}

	/// Turns all ready pins into busy pins, once recording begins.
	pub fn promote(&mut self) {
		for pin in self.pins.values_mut() {
			pin.promote();
		}
	}

	/// Takes over the pins of `other`, pins of resources already pinned are released.
	pub fn merge(&mut self, other: ResourceTracker) {
		for (handle, pin) in other.pins {
			self.pins.entry(handle).or_insert(pin);
		}
	}

	pub fn release(&mut self) {
		self.pins.clear();
	}
}

/// Records commands into a platform command buffer, tracking the resources they use.
pub struct Encoder<'a, 'c, P: GraphicsPlatform> {
	pub(crate) ctx: &'c GraphicsContext<P>,
	pub(crate) cmd: &'a mut P::CommandBuffer,
	pub(crate) tracker: &'a mut ResourceTracker,
}

impl<'c, P: GraphicsPlatform> Encoder<'_, 'c, P> {
	#[inline]
	pub fn ctx(&self) -> &'c GraphicsContext<P> {
		self.ctx
	}

	#[inline]
	pub fn queue(&self) -> QueueType {
		self.tracker.queue()
	}

	pub fn use_resource<K: ResourceKind>(&mut self, handle: Handle<K>) -> Result<&'c K::Slot<P>, AccessError> {
		self.tracker.use_resource(self.ctx, handle)
	}

	pub(crate) fn require_queue(&self, operation: &'static str, graphics: bool) -> Result<(), CommandError<P>> {
		let queue = self.queue();
		let supported = match queue {
			QueueType::Frame | QueueType::Graphics => true,
			QueueType::ComputeOnly => !graphics,
			QueueType::TransferOnly => false,
		};
		if supported {
			Ok(())
		} else {
			Err(CommandError::UnsupportedQueue { operation, queue })
		}
	}

	fn pipeline(&mut self, handle: Handle<Pipeline>) -> Result<&'c P::Pipeline, AccessError> {
		let slot: &'c PipelineSlot<P> = self.use_resource(handle)?;
		slot.pipeline().ok_or_else(|| AccessError::NotReady {
			name: slot.resource().name().to_owned(),
		})
	}

	/// Transitions every buffer whose tracked barrier state differs from the requested one in a single batch.
	/// Returns the amount of transitioned buffers.
	///
	/// Fails without changing any tracked barrier state if a buffer lacks the usage its new state requires.
	pub fn buffer_barriers(&mut self, barriers: &[(Handle<Buffer>, BufferAccess)]) -> Result<usize, CommandError<P>> {
		self.transition_buffers(barriers, true)
	}

	pub(crate) fn transition_buffers(
		&mut self,
		barriers: &[(Handle<Buffer>, BufferAccess)],
		check_usage: bool,
	) -> Result<usize, CommandError<P>> {
		let mut slots = SmallVec::<[(&'c BufferSlot<P>, BufferAccess); 8]>::with_capacity(barriers.len());
		for &(handle, dst) in barriers {
			let slot: &'c BufferSlot<P> = self.use_resource(handle)?;
			if check_usage {
				slot.check_access(dst)?;
			}
			slots.push((slot, dst));
		}

		let mut batch = SmallVec::<[BufferBarrier<'c, P>; 8]>::new();
		for (slot, dst) in slots {
			let src = slot.access().swap(dst);
			if src != dst {
				batch.push(BufferBarrier {
					buffer: &slot.buffer,
					src,
					dst,
				});
			}
		}
		if !batch.is_empty() {
			unsafe { self.ctx.platform().cmd_buffer_barriers(self.cmd, &batch) };
		}
		Ok(batch.len())
	}

	pub fn bind_pipeline(&mut self, pipeline: Handle<Pipeline>) -> Result<(), CommandError<P>> {
		let pipeline = self.pipeline(pipeline)?;
		unsafe { self.ctx.platform().cmd_bind_pipeline(self.cmd, pipeline) };
		Ok(())
	}

	pub fn bind_descriptor_set(
		&mut self,
		pipeline: Handle<Pipeline>,
		descriptor_set: Handle<DescriptorSet>,
	) -> Result<(), CommandError<P>> {
		let pipeline = self.pipeline(pipeline)?;
		let descriptor_set = &self.use_resource(descriptor_set)?.descriptor_set;
		unsafe {
			self.ctx
				.platform()
				.cmd_bind_descriptor_set(self.cmd, pipeline, descriptor_set)
		};
		Ok(())
	}

	/// Pushes `constants` for all shader stages of `pipeline`.
	pub fn push_constants<T: bytemuck::Pod>(
		&mut self,
		pipeline: Handle<Pipeline>,
		constants: &T,
	) -> Result<(), CommandError<P>> {
		let pipeline = self.pipeline(pipeline)?;
		unsafe {
			self.ctx
				.platform()
				.cmd_push_constants(self.cmd, pipeline, bytemuck::bytes_of(constants))
		};
		Ok(())
	}

	pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> Result<(), CommandError<P>> {
		self.require_queue("draw", true)?;
		unsafe { self.ctx.platform().cmd_draw(self.cmd, vertices, instances) };
		Ok(())
	}

	pub fn dispatch(&mut self, group_counts: [u32; 3]) -> Result<(), CommandError<P>> {
		self.require_queue("dispatch", false)?;
		unsafe { self.ctx.platform().cmd_dispatch(self.cmd, group_counts) };
		Ok(())
	}

	pub fn copy_buffer(
		&mut self,
		src: Handle<Buffer>,
		dst: Handle<Buffer>,
		regions: &[BufferCopy],
	) -> Result<(), CommandError<P>> {
		let src: &'c BufferSlot<P> = self.use_resource(src)?;
		let dst: &'c BufferSlot<P> = self.use_resource(dst)?;
		src.check_access(BufferAccess::TransferRead)?;
		dst.check_access(BufferAccess::TransferWrite)?;
		for region in regions {
			check_bounds(src, region.src_offset, region.size)?;
			check_bounds(dst, region.dst_offset, region.size)?;
		}
		unsafe {
			self.ctx
				.platform()
				.cmd_copy_buffer(self.cmd, &src.buffer, &dst.buffer, regions)
		};
		Ok(())
	}
}

fn check_bounds<P: GraphicsPlatform>(buffer: &BufferSlot<P>, offset: u64, size: u64) -> Result<(), AccessError> {
	match offset.checked_add(size) {
		Some(end) if end <= buffer.size() => Ok(()),
		end => Err(AccessError::OutOfBounds {
			name: buffer.resource().name().to_owned(),
			offset,
			end: end.unwrap_or(u64::MAX),
			size: buffer.size(),
		}),
	}
}
