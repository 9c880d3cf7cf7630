use smallvec::SmallVec;
use std::fmt::{Debug, Formatter};

/// The upper bound of frames that may be in flight at the same time
pub const FRAMES_LIMIT: u32 = 8;
/// Inline capacity of per-frame storage, double buffering and triple buffering don't allocate
pub const FRAMES_SMALLVEC: usize = 3;

/// The amount of frames that may be in flight at the same time.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SeedInFlight(u32);

impl SeedInFlight {
	#[inline]
	pub fn new(frames_in_flight: u32) -> Self {
		assert!(
			(1..=FRAMES_LIMIT).contains(&frames_in_flight),
			"frames_in_flight {} must be within 1..={}",
			frames_in_flight,
			FRAMES_LIMIT
		);
		Self(frames_in_flight)
	}

	#[inline]
	pub fn frames_in_flight(&self) -> u32 {
		self.0
	}
}

/// The index of a frame that is in flight.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FrameInFlight {
	seed: SeedInFlight,
	index: u32,
}

impl FrameInFlight {
	#[inline]
	pub fn new(seed: impl Into<SeedInFlight>, index: u32) -> Self {
		let seed = seed.into();
		assert!(
			index < seed.frames_in_flight(),
			"frame index {} out of bounds for {} frames in flight",
			index,
			seed.frames_in_flight()
		);
		Self { seed, index }
	}

	#[inline]
	pub fn seed(&self) -> SeedInFlight {
		self.seed
	}

	#[inline]
	pub fn frame_index(&self) -> usize {
		self.index as usize
	}

	/// The frame following this one, wrapping around
	#[inline]
	pub fn next(&self) -> Self {
		Self {
			seed: self.seed,
			index: (self.index + 1) % self.seed.frames_in_flight(),
		}
	}
}

impl Debug for FrameInFlight {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FrameInFlight")
			.field("frames_in_flight", &self.seed.frames_in_flight())
			.field("frame_index", &self.index)
			.finish()
	}
}

impl From<FrameInFlight> for SeedInFlight {
	fn from(value: FrameInFlight) -> Self {
		value.seed
	}
}

/// A resource allocated once per frame that may be in flight at the same time.
#[derive(Debug)]
pub struct ResourceInFlight<T> {
	vec: SmallVec<[T; FRAMES_SMALLVEC]>,
	seed: SeedInFlight,
}

impl<T> ResourceInFlight<T> {
	#[must_use]
	pub fn new<F>(seed: impl Into<SeedInFlight>, mut f: F) -> Self
	where
		F: FnMut(FrameInFlight) -> T,
	{
		let seed = seed.into();
		let vec = (0..seed.frames_in_flight())
			.map(|i| f(FrameInFlight::new(seed, i)))
			.collect();
		Self { vec, seed }
	}

	#[inline]
	pub fn seed(&self) -> SeedInFlight {
		self.seed
	}

	#[must_use]
	#[inline]
	pub fn index(&self, fif: FrameInFlight) -> &T {
		assert_eq!(self.seed, fif.seed());
		&self.vec[fif.frame_index()]
	}

	#[must_use]
	#[inline]
	pub fn index_mut(&mut self, fif: FrameInFlight) -> &mut T {
		assert_eq!(self.seed, fif.seed());
		&mut self.vec[fif.frame_index()]
	}

	pub fn iter(&self) -> impl Iterator<Item = &T> {
		self.vec.iter()
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
		self.vec.iter_mut()
	}
}

impl<T> From<&ResourceInFlight<T>> for SeedInFlight {
	fn from(value: &ResourceInFlight<T>) -> Self {
		value.seed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::rc::Rc;

	#[test]
	fn resource_happy() {
		for n in 1..=FRAMES_LIMIT {
			let seed = SeedInFlight::new(n);
			let resource = ResourceInFlight::new(seed, |i| i.frame_index() as u32);
			for i in 0..n {
				assert_eq!(*resource.index(FrameInFlight::new(seed, i)), i);
			}
		}
	}

	#[test]
	fn frame_next_wraps() {
		let seed = SeedInFlight::new(3);
		let fif = FrameInFlight::new(seed, 2);
		assert_eq!(fif.next().frame_index(), 0);
		assert_eq!(fif.next().next().frame_index(), 1);
	}

	#[test]
	fn resource_drop() {
		for i in 1..FRAMES_LIMIT {
			let seed = SeedInFlight::new(i);
			let rc = Rc::new(());
			let resource = ResourceInFlight::new(seed, |_| rc.clone());
			assert_eq!(Rc::strong_count(&rc), i as usize + 1);
			drop(resource);
			assert_eq!(Rc::strong_count(&rc), 1);
		}
	}

	#[test]
	#[should_panic]
	fn seed_zero() {
		let _ = SeedInFlight::new(0);
	}

	#[test]
	#[should_panic]
	fn frame_out_of_bounds() {
		let _ = FrameInFlight::new(SeedInFlight::new(2), 2);
	}

	#[test]
	#[should_panic]
	fn resource_wrong_seed() {
		let resource = ResourceInFlight::new(SeedInFlight::new(2), |_| ());
		let _ = resource.index(FrameInFlight::new(SeedInFlight::new(3), 0));
	}
}
