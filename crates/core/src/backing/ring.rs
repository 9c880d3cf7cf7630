use smallvec::SmallVec;
use std::ops::{Index, IndexMut};

/// A fixed ring of `N` slots indexed by a monotonic frame counter, slot `frame % N`.
///
/// Generalizes double buffering to any runtime frame lag.
#[derive(Clone, Debug)]
pub struct RingArray<T>(SmallVec<[T; 2]>);

impl<T> RingArray<T> {
	#[inline]
	pub fn new(len: u32, f: impl FnMut() -> T) -> Self {
		assert_ne!(len, 0, "RingArray must have at least one slot");
		Self(std::iter::repeat_with(f).take(len as usize).collect())
	}

	#[inline]
	pub fn len(&self) -> u32 {
		self.0.len() as u32
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[inline]
	pub fn slot(&self, frame: u64) -> usize {
		(frame % self.0.len() as u64) as usize
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
		self.0.iter_mut()
	}
}

impl<T> Index<u64> for RingArray<T> {
	type Output = T;

	#[inline]
	fn index(&self, frame: u64) -> &Self::Output {
		&self.0[self.slot(frame)]
	}
}

impl<T> IndexMut<u64> for RingArray<T> {
	#[inline]
	fn index_mut(&mut self, frame: u64) -> &mut Self::Output {
		let slot = self.slot(frame);
		&mut self.0[slot]
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_ring() {
		let mut ring = RingArray::new(3, || 0);
		assert_eq!(ring.len(), 3);
		ring[0] = 42;
		ring[4] = 69;
		assert_eq!(ring[3], 42);
		assert_eq!(ring[1], 69);
		assert_eq!(ring[2], 0);
	}

	#[test]
	fn test_single_slot() {
		let mut ring = RingArray::new(1, Vec::new);
		ring[7].push(1);
		assert_eq!(ring[0], vec![1]);
	}
}
