use crate::access::{AccessError, AccessState, BufferAccess};
use crate::destroy::DestroyResource;
use crate::platform::GraphicsPlatform;
use crate::resource::{AllocationScheme, Resource, TrackedSlot};

bitflags::bitflags! {
	/// Buffer usage specify how you may use a buffer. Missing flags are only validated during runtime.
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
	pub struct BufferUsage: u64 {
		/// Can be used as a source of transfer operations
		const TRANSFER_SRC = 0b1;
		/// Can be used as a destination of transfer operations
		const TRANSFER_DST = 0b10;
		/// Allows a buffer to be mapped into host memory. The mapping will optimize for reading from the device.
		const MAP_READ = 0b100;
		/// Allows a buffer to be mapped into host memory. The mapping will optimize for writing to the device.
		const MAP_WRITE = 0b1000;
		/// Can be used as uniform buffer
		const UNIFORM_BUFFER = 0b1_0000;
		/// Can be used as storage buffer
		const STORAGE_BUFFER = 0b10_0000;
		/// Can be used as source of fixed-function index fetch (index buffer)
		const INDEX_BUFFER = 0b100_0000;
		/// Can be used as source of fixed-function vertex fetch (VBO)
		const VERTEX_BUFFER = 0b1000_0000;
		/// Can be the source of indirect parameters (e.g. indirect buffer, parameter buffer)
		const INDIRECT_BUFFER = 0b1_0000_0000;
		/// Has a device address that shaders may dereference, required to be registered in an `AddressPool`
		const DEVICE_ADDRESS = 0b10_0000_0000;
	}
}

impl BufferUsage {
	#[inline]
	pub fn is_mappable(&self) -> bool {
		self.intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE)
	}

	#[inline]
	pub fn initial_buffer_access(&self) -> BufferAccess {
		if self.is_mappable() {
			BufferAccess::General
		} else {
			BufferAccess::Undefined
		}
	}
}

#[derive(Copy, Clone, Debug)]
pub struct BufferCreateInfo<'a> {
	/// Name of the buffer, for tracking and debugging purposes
	pub name: &'a str,
	/// Buffer usage specify how you may use a buffer. Missing flags are only validated during runtime.
	pub usage: BufferUsage,
	/// Size in bytes
	pub size: u64,
	/// Determines how this allocation should be managed.
	pub allocation_scheme: AllocationScheme,
}

pub struct BufferSlot<P: GraphicsPlatform> {
	pub buffer: P::Buffer,
	resource: Resource,
	usage: BufferUsage,
	size: u64,
	device_address: u64,
	access: AccessState<BufferAccess>,
}

impl<P: GraphicsPlatform> BufferSlot<P> {
	pub fn new(buffer: P::Buffer, create_info: &BufferCreateInfo, device_address: u64) -> Self {
		Self {
			buffer,
			resource: Resource::new(create_info.name),
			usage: create_info.usage,
			size: create_info.size,
			device_address,
			access: AccessState::new(create_info.usage.initial_buffer_access()),
		}
	}

	#[inline]
	pub fn usage(&self) -> BufferUsage {
		self.usage
	}

	#[inline]
	pub fn size(&self) -> u64 {
		self.size
	}

	/// The device address of this buffer, 0 if it was created without [`BufferUsage::DEVICE_ADDRESS`].
	#[inline]
	pub fn device_address(&self) -> u64 {
		self.device_address
	}

	/// The barrier state this buffer was last transitioned to.
	#[inline]
	pub fn access(&self) -> &AccessState<BufferAccess> {
		&self.access
	}

	/// Checks that this buffer was created with the usages required to be transitioned to `access`.
	pub fn check_access(&self, access: BufferAccess) -> Result<(), AccessError> {
		if access.is_permitted_by(self.usage) {
			Ok(())
		} else {
			Err(AccessError::MissingBufferUsage {
				name: self.resource.name().to_owned(),
				usage: self.usage,
				missing_usage: access.required_buffer_usage().difference(self.usage),
			})
		}
	}
}

impl<P: GraphicsPlatform> TrackedSlot<P> for BufferSlot<P> {
	#[inline]
	fn resource(&self) -> &Resource {
		&self.resource
	}

	fn into_destroy(self) -> Option<DestroyResource<P>> {
		Some(DestroyResource::Buffer(self.buffer))
	}
}
