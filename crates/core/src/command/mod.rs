//! Recording and submission of command buffers, pinning every resource they reference until the GPU is done with
//! them.

mod buffer;
mod encoder;
mod parallel;
mod render_pass;

pub use buffer::*;
pub use encoder::*;
pub use parallel::*;
pub use render_pass::*;

use crate::access::AccessError;
use crate::epoch::QueueType;
use crate::platform::{GraphicsPlatform, SubpassContents};
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandBufferState {
	/// May reserve resources and begin recording
	Initial,
	Recording,
	/// Ended, may be submitted
	Executable,
	/// Submitted, until the platform signals its epoch
	Pending,
}

#[derive(Error)]
pub enum CommandError<P: GraphicsPlatform> {
	#[error("Platform Error: {0}")]
	Platform(#[source] P::SubmitError),
	#[error("Access Error: {0}")]
	AccessError(#[from] AccessError),
	#[error("Command buffer is {actual:?} but must be {expected:?}")]
	InvalidState {
		expected: CommandBufferState,
		actual: CommandBufferState,
	},
	#[error("{operation} can not be recorded on the {queue:?} queue")]
	UnsupportedQueue { operation: &'static str, queue: QueueType },
	#[error("Render pass subpass was begun with {0:?} contents")]
	WrongSubpassContents(SubpassContents),
	#[error("Failed to spawn recording threads: {0}")]
	ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl<P: GraphicsPlatform> Debug for CommandError<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self, f)
	}
}
