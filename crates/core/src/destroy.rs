//! Delayed destruction of GPU objects.
//!
//! Retired objects are queued into the fill bucket of the current frame. Once the ring wrapped around, `frame_lag`
//! frames later, the bucket is drained and every object whose epochs completed on all queues is released. Objects
//! that are still busy are moved to the new fill bucket and checked again another `frame_lag` frames later.

use crate::backing::handle::PoolKind;
use crate::backing::ring::RingArray;
use crate::epoch::{EpochCopy, QueueEpochs, QueueType};
use crate::platform::GraphicsPlatform;
use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};
use std::mem;

/// The backing objects of a retired resource.
pub enum DestroyResource<P: GraphicsPlatform> {
	Buffer(P::Buffer),
	Image(P::Image),
	Framebuffer(P::Framebuffer),
	Pipeline(P::Pipeline),
	DescriptorSet(P::DescriptorSet),
}

impl<P: GraphicsPlatform> DestroyResource<P> {
	pub fn kind(&self) -> PoolKind {
		match self {
			DestroyResource::Buffer(_) => PoolKind::Buffer,
			DestroyResource::Image(_) => PoolKind::Image,
			DestroyResource::Framebuffer(_) => PoolKind::Framebuffer,
			DestroyResource::Pipeline(_) => PoolKind::Pipeline,
			DestroyResource::DescriptorSet(_) => PoolKind::DescriptorSet,
		}
	}
}

impl<P: GraphicsPlatform> Debug for DestroyResource<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("DestroyResource").field(&self.kind()).finish()
	}
}

/// The pool slot a [`DestroyRecord`] keeps occupied until it is released.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlotRef {
	pub kind: PoolKind,
	/// 1-based slot index, like [`Handle::index`]
	///
	/// [`Handle::index`]: crate::backing::handle::Handle::index
	pub index: u32,
}

#[derive(Debug)]
pub struct DestroyRecord<P: GraphicsPlatform> {
	pub resource: Option<DestroyResource<P>>,
	pub epochs: EpochCopy,
	pub slot: Option<SlotRef>,
}

/// Result of draining one bucket of the [`DestroyQueue`]
#[derive(Debug, Default)]
pub struct Drain {
	/// Slots whose backing objects were released and may be recycled by their pool.
	pub released: Vec<SlotRef>,
	/// Amount of records that were still busy and got queued again.
	pub requeued: usize,
}

pub struct DestroyQueue<P: GraphicsPlatform> {
	buckets: RingArray<Vec<DestroyRecord<P>>>,
	frame: u64,
	frame_lag: u32,
}

impl<P: GraphicsPlatform> DestroyQueue<P> {
	pub fn new(frame_lag: u32) -> Self {
		Self {
			buckets: RingArray::new(frame_lag, Vec::new),
			frame: 0,
			frame_lag,
		}
	}

	#[inline]
	pub fn frame(&self) -> u64 {
		self.frame
	}

	#[inline]
	pub fn frame_lag(&self) -> u32 {
		self.frame_lag
	}

	/// Amount of records waiting in all buckets
	pub fn len(&self) -> usize {
		(0..self.frame_lag as u64).map(|i| self.buckets[i].len()).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Queues `record` into the bucket of the current frame, it is released no earlier than `frame_lag` frames later.
	pub fn push(&mut self, record: DestroyRecord<P>) {
		self.buckets[self.frame].push(record);
	}

	/// Advances to the next frame and drains the bucket filled `frame_lag` frames ago, which then becomes the new
	/// fill bucket.
	pub fn next_frame(&mut self, platform: &P, epochs: &QueueEpochs) -> Result<Drain, P::SubmitError> {
		profiling::function_scope!();
		self.frame += 1;
		let drained = mem::take(&mut self.buckets[self.frame]);
		if drained.is_empty() {
			return Ok(Drain::default());
		}

		let mut completed = [0; QueueType::COUNT];
		for queue in QueueType::VALUES {
			completed[queue.index()] = platform.completed_epoch(queue)?;
		}

		let mut drain = Drain::default();
		let mut release = Vec::with_capacity(drained.len());
		for record in drained {
			if record.epochs.is_busy(epochs, self.frame_lag) || !record.epochs.has_completed(&completed) {
				drain.requeued += 1;
				self.buckets[self.frame].push(record);
			} else {
				drain.released.extend(record.slot);
				release.extend(record.resource);
			}
		}
		// Safety: every released object is unpinned and all submissions referencing it completed
		unsafe { release_all(platform, release) };
		log::debug!(
			"frame {}: released {} slots, requeued {} still busy",
			self.frame,
			drain.released.len(),
			drain.requeued
		);
		Ok(drain)
	}

	/// Releases every queued object regardless of its epochs.
	///
	/// # Safety
	/// The device must be idle.
	pub unsafe fn destroy_all(&mut self, platform: &P) -> Vec<SlotRef> {
		let mut released = Vec::new();
		let mut release = Vec::new();
		for bucket in self.buckets.iter_mut() {
			for record in bucket.drain(..) {
				released.extend(record.slot);
				release.extend(record.resource);
			}
		}
		unsafe { release_all(platform, release) };
		released
	}
}

impl<P: GraphicsPlatform> Debug for DestroyQueue<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DestroyQueue")
			.field("frame", &self.frame)
			.field("frame_lag", &self.frame_lag)
			.field("len", &self.len())
			.finish()
	}
}

/// Groups the objects by type to release them in batches.
///
/// # Safety
/// No object may be in use by the device.
unsafe fn release_all<P: GraphicsPlatform>(platform: &P, resources: Vec<DestroyResource<P>>) {
	let mut buffers = SmallVec::<[_; 8]>::new();
	let mut images = SmallVec::<[_; 8]>::new();
	let mut framebuffers = SmallVec::<[_; 4]>::new();
	let mut pipelines = SmallVec::<[_; 4]>::new();
	let mut descriptor_sets = SmallVec::<[_; 4]>::new();
	for resource in resources {
		match resource {
			DestroyResource::Buffer(b) => buffers.push(b),
			DestroyResource::Image(i) => images.push(i),
			DestroyResource::Framebuffer(f) => framebuffers.push(f),
			DestroyResource::Pipeline(p) => pipelines.push(p),
			DestroyResource::DescriptorSet(d) => descriptor_sets.push(d),
		}
	}
	unsafe {
		// framebuffers reference image views, destroy them first
		platform.destroy_framebuffers(framebuffers.into_iter());
		platform.destroy_descriptor_sets(descriptor_sets.into_iter());
		platform.destroy_pipelines(pipelines.into_iter());
		platform.destroy_images(images.into_iter());
		platform.destroy_buffers(buffers.into_iter());
	}
}
