use gpu_epoch::config::ContextConfig;
use gpu_epoch::context::GraphicsContext;
use gpu_epoch::resource::{AllocationScheme, BufferCreateInfo, BufferUsage};

pub mod address_growth;
pub mod frame_loop;
pub mod parallel;
pub mod pinning;

/// Installs a logger printing into the test output, repeated calls are ignored.
pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

pub fn context(platform: gpu_epoch::P, config: ContextConfig) -> anyhow::Result<GraphicsContext> {
	init_logger();
	Ok(GraphicsContext::new(platform, config)?)
}

/// A storage buffer with a device address, so it can be put into an address pool
pub fn storage_buffer(name: &str) -> BufferCreateInfo<'_> {
	BufferCreateInfo {
		name,
		usage: BufferUsage::STORAGE_BUFFER | BufferUsage::DEVICE_ADDRESS,
		size: 1024,
		allocation_scheme: AllocationScheme::AllocatorManaged,
	}
}
