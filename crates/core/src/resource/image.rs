use crate::destroy::DestroyResource;
use crate::platform::GraphicsPlatform;
use crate::resource::{AllocationScheme, Resource, TrackedSlot};

bitflags::bitflags! {
	/// Image usage specify how you may use the image. Missing flags are only validated during runtime.
	#[repr(transparent)]
	#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
	pub struct ImageUsage: u64 {
		/// Can be used as a source of transfer operations
		const TRANSFER_SRC = 0b1;
		/// Can be used as a destination of transfer operations
		const TRANSFER_DST = 0b10;
		/// Can be sampled from with a sampler
		const SAMPLED = 0b100;
		/// Can be used as storage image
		const STORAGE = 0b1000;
		/// Can be used as framebuffer color attachment
		const COLOR_ATTACHMENT = 0b1_0000;
		/// Can be used as framebuffer depth/stencil attachment
		const DEPTH_STENCIL_ATTACHMENT = 0b10_0000;
	}
}

impl ImageUsage {
	/// Whether an image view has to be created alongside the image
	#[inline]
	pub fn has_image_view(&self) -> bool {
		self.intersects(
			ImageUsage::SAMPLED
				| ImageUsage::STORAGE
				| ImageUsage::COLOR_ATTACHMENT
				| ImageUsage::DEPTH_STENCIL_ATTACHMENT,
		)
	}
}

pub type Format = ash::vk::Format;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Extent {
	pub width: u32,
	pub height: u32,
	pub depth: u32,
}

impl Extent {
	#[inline]
	pub const fn new_2d(width: u32, height: u32) -> Self {
		Self {
			width,
			height,
			depth: 1,
		}
	}

	#[inline]
	pub const fn is_3d(&self) -> bool {
		self.depth > 1
	}
}

impl From<[u32; 2]> for Extent {
	fn from([width, height]: [u32; 2]) -> Self {
		Self::new_2d(width, height)
	}
}

impl From<[u32; 3]> for Extent {
	fn from([width, height, depth]: [u32; 3]) -> Self {
		Self { width, height, depth }
	}
}

#[derive(Copy, Clone, Debug)]
pub struct ImageCreateInfo<'a> {
	/// The image format
	pub format: Format,
	/// The extent of the image. A depth greater than 1 creates a 3D image, otherwise a 2D image.
	pub extent: Extent,
	/// The amount of mip levels.
	pub mip_levels: u32,
	/// The amount of array layers. Must be `1` for 3D images.
	pub array_layers: u32,
	/// Image usage specify how you may use the image. Missing flags are only validated during runtime.
	pub usage: ImageUsage,
	/// Determines how this allocation should be managed.
	pub allocation_scheme: AllocationScheme,
	/// Name of the image, for tracking and debugging purposes
	pub name: &'a str,
}

impl Default for ImageCreateInfo<'_> {
	fn default() -> Self {
		Self {
			format: Format::UNDEFINED,
			extent: Extent::default(),
			mip_levels: 1,
			array_layers: 1,
			usage: ImageUsage::empty(),
			allocation_scheme: AllocationScheme::default(),
			name: "",
		}
	}
}

pub struct ImageSlot<P: GraphicsPlatform> {
	pub image: P::Image,
	resource: Resource,
	format: Format,
	extent: Extent,
	usage: ImageUsage,
}

impl<P: GraphicsPlatform> ImageSlot<P> {
	pub fn new(image: P::Image, create_info: &ImageCreateInfo) -> Self {
		Self {
			image,
			resource: Resource::new(create_info.name),
			format: create_info.format,
			extent: create_info.extent,
			usage: create_info.usage,
		}
	}

	#[inline]
	pub fn format(&self) -> Format {
		self.format
	}

	#[inline]
	pub fn extent(&self) -> Extent {
		self.extent
	}

	#[inline]
	pub fn usage(&self) -> ImageUsage {
		self.usage
	}
}

impl<P: GraphicsPlatform> TrackedSlot<P> for ImageSlot<P> {
	#[inline]
	fn resource(&self) -> &Resource {
		&self.resource
	}

	fn into_destroy(self) -> Option<DestroyResource<P>> {
		Some(DestroyResource::Image(self.image))
	}
}
