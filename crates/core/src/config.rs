use crate::backing::in_flight::FRAMES_LIMIT;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

/// Runtime configuration of a [`GraphicsContext`] and the subsystems driven by it.
///
/// [`GraphicsContext`]: crate::context::GraphicsContext
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ContextConfig {
	/// Maximum amount of frames the GPU may trail behind the CPU.
	pub frame_lag: u32,
	/// Initial capacity of an [`AddressPool`], doubled whenever it is exhausted.
	///
	/// [`AddressPool`]: crate::address_pool::AddressPool
	pub initial_address_capacity: u32,
	/// Upper bound of live [`AddressPool`] allocations, usually the device's descriptor limit.
	///
	/// [`AddressPool`]: crate::address_pool::AddressPool
	pub max_bindless_count: u32,
	/// Threads of the parallel secondary command buffer recorder, 0 for the available parallelism.
	pub worker_count: usize,
	/// How long [`GraphicsContext::begin_frame`] waits on the GPU before giving up on a frame.
	///
	/// [`GraphicsContext::begin_frame`]: crate::context::GraphicsContext::begin_frame
	pub emergency_timeout: Duration,
}

impl ContextConfig {
	pub const REASONABLE_DEFAULTS: Self = Self {
		frame_lag: 2,
		initial_address_capacity: 16,
		max_bindless_count: 10_000,
		worker_count: 0,
		emergency_timeout: Duration::from_secs(5),
	};

	/// The configured worker count, resolving 0 to the available parallelism.
	pub fn workers(&self) -> usize {
		match self.worker_count {
			0 => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
			n => n,
		}
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if !(1..=FRAMES_LIMIT).contains(&self.frame_lag) {
			return Err(ConfigError::FrameLag(self.frame_lag));
		}
		if !self.initial_address_capacity.is_power_of_two() {
			return Err(ConfigError::AddressCapacity(self.initial_address_capacity));
		}
		if self.max_bindless_count < self.initial_address_capacity {
			return Err(ConfigError::MaxBindlessCount {
				max_bindless_count: self.max_bindless_count,
				initial_address_capacity: self.initial_address_capacity,
			});
		}
		Ok(())
	}
}

impl Default for ContextConfig {
	fn default() -> Self {
		Self::REASONABLE_DEFAULTS
	}
}

#[derive(Error)]
pub enum ConfigError {
	#[error("frame_lag of {0} must be within 1..={limit}", limit = FRAMES_LIMIT)]
	FrameLag(u32),
	#[error("initial_address_capacity of {0} must be a non-zero power of two")]
	AddressCapacity(u32),
	#[error(
		"max_bindless_count of {max_bindless_count} must be at least the initial_address_capacity of {initial_address_capacity}"
	)]
	MaxBindlessCount {
		max_bindless_count: u32,
		initial_address_capacity: u32,
	},
}

impl core::fmt::Debug for ConfigError {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		core::fmt::Display::fmt(self, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_are_valid() {
		assert!(ContextConfig::default().validate().is_ok());
		assert!(ContextConfig::default().workers() >= 1);
	}

	#[test]
	fn test_invalid() {
		let config = ContextConfig {
			frame_lag: 0,
			..ContextConfig::default()
		};
		assert!(matches!(config.validate(), Err(ConfigError::FrameLag(0))));

		let config = ContextConfig {
			frame_lag: FRAMES_LIMIT + 1,
			..ContextConfig::default()
		};
		assert!(config.validate().is_err());

		let config = ContextConfig {
			initial_address_capacity: 12,
			..ContextConfig::default()
		};
		assert!(matches!(config.validate(), Err(ConfigError::AddressCapacity(12))));

		let config = ContextConfig {
			max_bindless_count: 8,
			..ContextConfig::default()
		};
		assert!(matches!(config.validate(), Err(ConfigError::MaxBindlessCount { .. })));
	}
}
