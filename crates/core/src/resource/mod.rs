//! Tracking state shared by every pooled GPU object, and the slot types stored per resource kind.

mod buffer;
mod framebuffer;
mod image;
mod pin;
mod pipeline;

pub use buffer::*;
pub use framebuffer::*;
pub use image::*;
pub use pin::*;
pub use pipeline::*;

use crate::backing::handle::PoolKind;
use crate::backing::pool::{Pool, Pools};
use crate::destroy::DestroyResource;
use crate::epoch::{EpochSnapshot, QueueEpochs, QueueType};
use crate::platform::GraphicsPlatform;
use std::sync::Arc;

/// Epoch and pin tracking embedded in every slot.
#[derive(Debug)]
pub struct Resource {
	name: String,
	epochs: EpochSnapshot,
	pins: Arc<PinState>,
}

impl Resource {
	pub fn new(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			epochs: EpochSnapshot::new(),
			pins: PinState::new(),
		}
	}

	#[inline]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[inline]
	pub fn epochs(&self) -> &EpochSnapshot {
		&self.epochs
	}

	#[inline]
	pub fn pins(&self) -> &PinState {
		&self.pins
	}

	/// Records that the resource is referenced by the upcoming submission on `queue`.
	#[inline]
	pub fn mark_used(&self, queue: QueueType, epochs: &QueueEpochs) {
		self.epochs.mark(queue, epochs.busy_time(queue));
	}

	#[inline]
	pub fn pin(&self, kind: PinKind) -> Pin {
		Pin::new(&self.pins, kind)
	}
}

/// Backing objects of one resource kind together with their [`Resource`] tracking.
pub trait TrackedSlot<P: GraphicsPlatform>: Send + Sync + Sized + 'static {
	fn resource(&self) -> &Resource;

	/// False while the backing object is still being created, for example a pipeline that is compiled elsewhere.
	#[inline]
	fn has_instance(&self) -> bool {
		true
	}

	/// Moves the backing objects out to be released by the destroy queue.
	fn into_destroy(self) -> Option<DestroyResource<P>>;
}

/// Marker type selecting one of the pools of a [`GraphicsContext`].
///
/// [`GraphicsContext`]: crate::context::GraphicsContext
pub trait ResourceKind: Sized + 'static {
	const KIND: PoolKind;
	type Slot<P: GraphicsPlatform>: TrackedSlot<P>;

	fn pool<P: GraphicsPlatform>(pools: &Pools<P>) -> &Pool<P, Self>;

	fn pool_mut<P: GraphicsPlatform>(pools: &mut Pools<P>) -> &mut Pool<P, Self>;
}

macro_rules! resource_kind {
	($kind:ident, $slot:ident, $field:ident) => {
		#[derive(Debug)]
		pub enum $kind {}

		impl ResourceKind for $kind {
			const KIND: PoolKind = PoolKind::$kind;
			type Slot<P: GraphicsPlatform> = $slot<P>;

			#[inline]
			fn pool<P: GraphicsPlatform>(pools: &Pools<P>) -> &Pool<P, Self> {
				&pools.$field
			}

			#[inline]
			fn pool_mut<P: GraphicsPlatform>(pools: &mut Pools<P>) -> &mut Pool<P, Self> {
				&mut pools.$field
			}
		}
	};
}

resource_kind!(Buffer, BufferSlot, buffers);
resource_kind!(Image, ImageSlot, images);
resource_kind!(Framebuffer, FramebufferSlot, framebuffers);
resource_kind!(Pipeline, PipelineSlot, pipelines);
resource_kind!(DescriptorSet, DescriptorSetSlot, descriptor_sets);

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum AllocationScheme {
	/// Perform a dedicated, driver-managed allocation for the given buffer or image, allowing it to perform
	/// optimizations on this type of allocation.
	Dedicated,
	/// The memory for this resource will be allocated and managed by gpu-allocator.
	#[default]
	AllocatorManaged,
}
