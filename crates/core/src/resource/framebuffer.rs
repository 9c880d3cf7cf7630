use crate::destroy::DestroyResource;
use crate::platform::GraphicsPlatform;
use crate::resource::{Resource, TrackedSlot};

pub struct FramebufferSlot<P: GraphicsPlatform> {
	pub framebuffer: P::Framebuffer,
	resource: Resource,
}

impl<P: GraphicsPlatform> FramebufferSlot<P> {
	pub fn new(framebuffer: P::Framebuffer, name: &str) -> Self {
		Self {
			framebuffer,
			resource: Resource::new(name),
		}
	}
}

impl<P: GraphicsPlatform> TrackedSlot<P> for FramebufferSlot<P> {
	#[inline]
	fn resource(&self) -> &Resource {
		&self.resource
	}

	fn into_destroy(self) -> Option<DestroyResource<P>> {
		Some(DestroyResource::Framebuffer(self.framebuffer))
	}
}
