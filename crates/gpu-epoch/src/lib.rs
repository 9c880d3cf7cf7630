/// The primary platform is Ash
#[cfg(feature = "ash")]
pub type P = gpu_epoch_core::platform::ash::Ash;
/// The primary platform is the CPU-only headless platform
#[cfg(all(feature = "headless", not(feature = "ash")))]
pub type P = gpu_epoch_core::platform::headless::Headless;
#[cfg(not(any(feature = "ash", feature = "headless")))]
compile_error!("Must select a primary platform by enabling a feature like \"ash\"");

pub mod access {
	pub use gpu_epoch_core::access::*;
}

pub mod address_pool {
	pub type AddressFlushError = gpu_epoch_core::address_pool::AddressFlushError<crate::P>;

	pub use gpu_epoch_core::address_pool::*;
}

pub mod backing {
	pub use gpu_epoch_core::backing::*;
}

pub mod command {
	pub type CommandBuffer = gpu_epoch_core::command::CommandBuffer<crate::P>;
	pub type CommandError = gpu_epoch_core::command::CommandError<crate::P>;
	pub type Encoder<'a, 'c> = gpu_epoch_core::command::Encoder<'a, 'c, crate::P>;
	pub type ParallelRecorder = gpu_epoch_core::command::ParallelRecorder<crate::P>;
	pub type RenderPassRecording<'a> = gpu_epoch_core::command::RenderPassRecording<'a, crate::P>;
	pub type SecondaryCommandBuffer = gpu_epoch_core::command::SecondaryCommandBuffer<crate::P>;
	pub type SecondaryRecording<'a> = gpu_epoch_core::command::SecondaryRecording<'a, crate::P>;

	pub use gpu_epoch_core::command::*;
}

pub mod config {
	pub use gpu_epoch_core::config::*;
}

pub mod context {
	pub type GraphicsContext = gpu_epoch_core::context::GraphicsContext<crate::P>;
	pub type AllocationError = gpu_epoch_core::context::AllocationError<crate::P>;

	pub use gpu_epoch_core::context::*;
}

pub mod destroy {
	pub type DestroyQueue = gpu_epoch_core::destroy::DestroyQueue<crate::P>;
	pub type DestroyRecord = gpu_epoch_core::destroy::DestroyRecord<crate::P>;
	pub type DestroyResource = gpu_epoch_core::destroy::DestroyResource<crate::P>;

	pub use gpu_epoch_core::destroy::*;
}

pub mod epoch {
	pub use gpu_epoch_core::epoch::*;
}

pub mod platform {
	pub use gpu_epoch_core::platform::*;
}

pub mod resource {
	pub type BufferSlot = gpu_epoch_core::resource::BufferSlot<crate::P>;
	pub type ImageSlot = gpu_epoch_core::resource::ImageSlot<crate::P>;
	pub type FramebufferSlot = gpu_epoch_core::resource::FramebufferSlot<crate::P>;
	pub type PipelineSlot = gpu_epoch_core::resource::PipelineSlot<crate::P>;
	pub type DescriptorSetSlot = gpu_epoch_core::resource::DescriptorSetSlot<crate::P>;

	pub use gpu_epoch_core::resource::*;
}
