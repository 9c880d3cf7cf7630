//! The Vulkan platform, using timeline semaphores to signal epochs and `gpu-allocator` for memory.

mod access_type;
mod ash_ext;
mod command;
mod convert;
mod device;
pub mod init;

pub use access_type::*;
pub use ash_ext::*;
pub use command::*;
pub use convert::*;
pub use device::*;
