use crate::destroy::DestroyResource;
use crate::platform::GraphicsPlatform;
use crate::resource::{Resource, TrackedSlot};

/// A pipeline that may still be loading: reserved slots exist before their pipeline was created.
pub struct PipelineSlot<P: GraphicsPlatform> {
	pipeline: Option<P::Pipeline>,
	resource: Resource,
}

impl<P: GraphicsPlatform> PipelineSlot<P> {
	pub fn new(pipeline: Option<P::Pipeline>, name: &str) -> Self {
		Self {
			pipeline,
			resource: Resource::new(name),
		}
	}

	#[inline]
	pub fn pipeline(&self) -> Option<&P::Pipeline> {
		self.pipeline.as_ref()
	}

	/// Installs the created pipeline, returning the one it replaces.
	pub(crate) fn set_pipeline(&mut self, pipeline: P::Pipeline) -> Option<P::Pipeline> {
		self.pipeline.replace(pipeline)
	}
}

impl<P: GraphicsPlatform> TrackedSlot<P> for PipelineSlot<P> {
	#[inline]
	fn resource(&self) -> &Resource {
		&self.resource
	}

	#[inline]
	fn has_instance(&self) -> bool {
		self.pipeline.is_some()
	}

	fn into_destroy(self) -> Option<DestroyResource<P>> {
		self.pipeline.map(DestroyResource::Pipeline)
	}
}

pub struct DescriptorSetSlot<P: GraphicsPlatform> {
	pub descriptor_set: P::DescriptorSet,
	resource: Resource,
}

impl<P: GraphicsPlatform> DescriptorSetSlot<P> {
	pub fn new(descriptor_set: P::DescriptorSet, name: &str) -> Self {
		Self {
			descriptor_set,
			resource: Resource::new(name),
		}
	}
}

impl<P: GraphicsPlatform> TrackedSlot<P> for DescriptorSetSlot<P> {
	#[inline]
	fn resource(&self) -> &Resource {
		&self.resource
	}

	fn into_destroy(self) -> Option<DestroyResource<P>> {
		Some(DestroyResource::DescriptorSet(self.descriptor_set))
	}
}
