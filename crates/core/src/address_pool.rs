//! The bindless device address table. Shaders dereference buffers by a small `u32` index into a GPU-visible array
//! of `u64` device addresses, of which one copy exists per frame in flight.

use crate::access::BufferAccess;
use crate::backing::handle::Handle;
use crate::backing::in_flight::{FrameInFlight, ResourceInFlight, SeedInFlight};
use crate::command::{CommandBuffer, CommandError};
use crate::context::{AllocationError, GraphicsContext};
use crate::epoch::QueueType;
use crate::platform::GraphicsPlatform;
use crate::resource::{AllocationScheme, Buffer, BufferCreateInfo, BufferUsage};
use rustc_hash::FxHashSet;
use std::fmt::{Debug, Display, Formatter};
use std::mem;
use thiserror::Error;

/// The GPU-visible copy of the address table for one frame in flight.
#[derive(Debug)]
struct AddressBuffer {
	buffer: Handle<Buffer>,
	/// amount of addresses `buffer` can hold
	capacity: u32,
	is_flushed: bool,
}

pub struct AddressPool {
	addresses: Vec<u64>,
	/// The buffer each index was last assigned, kept after [`AddressPool::free`] so barriers still cover it
	owners: Vec<Handle<Buffer>>,
	free: Vec<u32>,
	capacity: u32,
	max_bindless_count: u32,
	buffers: ResourceInFlight<AddressBuffer>,
	in_flight: FrameInFlight,
}

/// What a [`AddressPool::flush`] did.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AddressFlush {
	/// The address table was copied into the mapped buffer
	pub uploaded: bool,
	/// The buffer was (re)created, descriptors referencing the previous one must be updated
	pub new_address_buffer: bool,
}

#[derive(Error)]
pub enum AddressFlushError<P: GraphicsPlatform> {
	#[error("Address buffer allocation failed: {0}")]
	Allocation(#[from] AllocationError<P>),
	#[error("Address table does not fit its buffer: {0}")]
	Copy(#[from] presser::CopyError),
	#[error("Failed to flush address buffer: {0}")]
	Flush(#[source] P::AllocationError),
}

impl<P: GraphicsPlatform> Debug for AddressFlushError<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(self, f)
	}
}

impl AddressPool {
	/// [`AddressPool::free`] ignores this index, so it may be used for never allocated entries.
	pub const INVALID_INDEX: u32 = u32::MAX;

	/// Creates an empty table. The per-frame buffers are only allocated by the first [`Self::flush`].
	pub fn new<P: GraphicsPlatform>(ctx: &GraphicsContext<P>) -> Self {
		let config = ctx.config();
		let seed = SeedInFlight::new(config.frame_lag);
		Self {
			addresses: Vec::new(),
			owners: Vec::new(),
			free: Vec::new(),
			capacity: config.initial_address_capacity,
			max_bindless_count: config.max_bindless_count,
			buffers: ResourceInFlight::new(seed, |_| AddressBuffer {
				buffer: Handle::NULL,
				capacity: 0,
				is_flushed: false,
			}),
			in_flight: FrameInFlight::new(seed, 0),
		}
	}

	/// Amount of allocated indices
	#[inline]
	pub fn len(&self) -> usize {
		self.addresses.len() - self.free.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Amount of addresses the per-frame buffers are sized for, doubling whenever the table outgrows it.
	#[inline]
	pub fn capacity(&self) -> u32 {
		self.capacity
	}

	/// The address stored at `index`, 0 for freed indices and null buffers.
	#[inline]
	pub fn address(&self, index: u32) -> u64 {
		self.addresses[index as usize]
	}

	/// The buffer last assigned to `index`, which may already be freed or destroyed.
	#[inline]
	pub fn owner(&self, index: u32) -> Handle<Buffer> {
		self.owners[index as usize]
	}

	#[inline]
	pub fn in_flight_index(&self) -> u32 {
		self.in_flight.frame_index() as u32
	}

	/// The address buffer of frame `in_flight_index`, [`Handle::NULL`] until it was first flushed.
	#[inline]
	pub fn address_buffer(&self, in_flight_index: u32) -> Handle<Buffer> {
		self.frame(in_flight_index).buffer
	}

	#[inline]
	pub fn is_flushed(&self, in_flight_index: u32) -> bool {
		self.frame(in_flight_index).is_flushed
	}

	fn frame(&self, in_flight_index: u32) -> &AddressBuffer {
		self.buffers.index(FrameInFlight::new(self.buffers.seed(), in_flight_index))
	}

	fn mark_dirty(&mut self) {
		for buffer in self.buffers.iter_mut() {
			buffer.is_flushed = false;
		}
	}

	fn device_address<P: GraphicsPlatform>(ctx: &GraphicsContext<P>, buffer: Handle<Buffer>) -> u64 {
		if buffer.is_null() {
			return 0;
		}
		let slot = ctx.get(buffer);
		debug_assert!(
			slot.usage().contains(BufferUsage::DEVICE_ADDRESS),
			"buffer {:?} registered in the address pool lacks BufferUsage::DEVICE_ADDRESS",
			buffer
		);
		slot.device_address()
	}

	/// Registers the device address of `buffer`, returning the index shaders can look it up at.
	pub fn allocate<P: GraphicsPlatform>(&mut self, ctx: &GraphicsContext<P>, buffer: Handle<Buffer>) -> u32 {
		let address = Self::device_address(ctx, buffer);
		let index = match self.free.pop() {
			Some(index) => {
				self.addresses[index as usize] = address;
				self.owners[index as usize] = buffer;
				index
			}
			None => {
				let index = self.addresses.len() as u32;
				debug_assert!(
					index < self.max_bindless_count,
					"address pool exceeded the max_bindless_count of {}",
					self.max_bindless_count
				);
				if index == self.capacity {
					self.capacity *= 2;
					log::debug!("address pool grew to a capacity of {}", self.capacity);
				}
				self.addresses.push(address);
				self.owners.push(buffer);
				index
			}
		};
		self.mark_dirty();
		index
	}

	/// Points `index` at `buffer`, a null buffer stores address 0. Only a new non-zero address needs an upload.
	pub fn update<P: GraphicsPlatform>(&mut self, ctx: &GraphicsContext<P>, index: u32, buffer: Handle<Buffer>) {
		let address = Self::device_address(ctx, buffer);
		self.owners[index as usize] = buffer;
		let old = mem::replace(&mut self.addresses[index as usize], address);
		// removals leave the uploaded tables as they are
		if address != 0 && old != address {
			self.mark_dirty();
		}
	}

	/// Returns `index` to the free list. Freeing [`Self::INVALID_INDEX`] does nothing.
	#[track_caller]
	pub fn free(&mut self, index: u32) {
		if index == Self::INVALID_INDEX {
			return;
		}
		if cfg!(debug_assertions) {
			assert!(
				(index as usize) < self.addresses.len(),
				"address pool index {} was never allocated",
				index
			);
			assert!(!self.free.contains(&index), "double free of address pool index {}", index);
		}
		let old = mem::replace(&mut self.addresses[index as usize], 0);
		self.free.push(index);
		if old != 0 {
			self.mark_dirty();
		}
	}

	/// Uploads the address table into the buffer of frame `in_flight_index`, unless it is already up to date. The
	/// buffer is recreated if the table outgrew it, the previous one is destroyed through the context.
	pub fn flush<P: GraphicsPlatform>(
		&mut self,
		ctx: &mut GraphicsContext<P>,
		in_flight_index: u32,
	) -> Result<AddressFlush, AddressFlushError<P>> {
		profiling::function_scope!();
		let capacity = self.capacity;
		let frame = self
			.buffers
			.index_mut(FrameInFlight::new(self.buffers.seed(), in_flight_index));
		if frame.is_flushed {
			return Ok(AddressFlush::default());
		}

		let new_address_buffer = frame.buffer.is_null() || frame.capacity < capacity;
		if new_address_buffer {
			let buffer = ctx.create_buffer(&BufferCreateInfo {
				name: &format!("address pool {in_flight_index}"),
				usage: BufferUsage::MAP_WRITE | BufferUsage::STORAGE_BUFFER | BufferUsage::DEVICE_ADDRESS,
				size: capacity as u64 * mem::size_of::<u64>() as u64,
				allocation_scheme: AllocationScheme::AllocatorManaged,
			})?;
			let old = mem::replace(&mut frame.buffer, buffer);
			frame.capacity = capacity;
			if !old.is_null() {
				ctx.destroy(old);
			}
			log::debug!(
				"address pool allocated buffer {:?} for frame {} with a capacity of {}",
				buffer,
				in_flight_index,
				capacity
			);
		}

		let slot = ctx.get(frame.buffer);
		// Safety: the buffer is owned by this pool and the frame using it completed
		unsafe {
			presser::copy_from_slice_to_offset(&self.addresses, P::mapped_buffer_to_slab(&slot.buffer), 0)?;
			ctx.platform()
				.flush_mapped_buffer(&slot.buffer)
				.map_err(AddressFlushError::Flush)?;
		}
		frame.is_flushed = true;
		Ok(AddressFlush {
			uploaded: true,
			new_address_buffer,
		})
	}

	/// Advances to the next frame in flight, to be called together with [`GraphicsContext::next_frame`].
	pub fn next_frame(&mut self) {
		self.in_flight = self.in_flight.next();
	}

	/// Transitions every live buffer referenced by the table to `new_state`, as a single barrier batch recorded
	/// into `cmd`. Returns the amount of transitioned buffers.
	pub fn add_buffer_barriers<P: GraphicsPlatform>(
		&self,
		ctx: &GraphicsContext<P>,
		cmd: &mut CommandBuffer<P>,
		new_state: BufferAccess,
	) -> Result<usize, CommandError<P>> {
		let mut seen = FxHashSet::default();
		let barriers = self
			.owners
			.iter()
			.filter(|&&owner| !owner.is_null() && ctx.is_alive(owner) && seen.insert(owner))
			.map(|&owner| (owner, new_state))
			.collect::<Vec<_>>();
		let check_usage = cfg!(debug_assertions)
			&& matches!(cmd.queue(), QueueType::TransferOnly | QueueType::ComputeOnly);
		cmd.encoder(ctx)?.transition_buffers(&barriers, check_usage)
	}

	/// Destroys the buffers of all frames in flight.
	pub fn destroy<P: GraphicsPlatform>(self, ctx: &mut GraphicsContext<P>) {
		for frame in self.buffers.iter() {
			if !frame.buffer.is_null() {
				ctx.destroy(frame.buffer);
			}
		}
	}
}

impl Debug for AddressPool {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AddressPool")
			.field("len", &self.len())
			.field("capacity", &self.capacity)
			.field("in_flight", &self.in_flight)
			.field("buffers", &self.buffers)
			.finish()
	}
}
