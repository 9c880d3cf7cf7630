use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

/// An atomic cell holding the tracked barrier state `A` of a resource.
///
/// Only the thread recording barriers writes it, but it is shared with recording threads reading resources.
pub struct AccessState<A: Copy + FromPrimitive + ToPrimitive> {
	atomic: AtomicU32,
	_phantom: PhantomData<A>,
}

impl<A: Copy + FromPrimitive + ToPrimitive> AccessState<A> {
	pub fn new(a: A) -> Self {
		Self {
			atomic: AtomicU32::new(Self::a_to_u32(a)),
			_phantom: PhantomData,
		}
	}

	pub fn load(&self) -> A {
		Self::u32_to_a(self.atomic.load(Relaxed))
	}

	/// Sets the new state and returns the previous one.
	pub fn swap(&self, a: A) -> A {
		Self::u32_to_a(self.atomic.swap(Self::a_to_u32(a), Relaxed))
	}

	fn a_to_u32(a: A) -> u32 {
		match a.to_u32() {
			Some(i) => i,
			None => unreachable!("access enum must be representable as u32"),
		}
	}

	fn u32_to_a(i: u32) -> A {
		match A::from_u32(i) {
			Some(a) => a,
			None => unreachable!("AccessState only ever stores valid enum values, got {}", i),
		}
	}
}

impl<A: Copy + FromPrimitive + ToPrimitive + Debug> Debug for AccessState<A> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("AccessState").field(&self.load()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::access::BufferAccess;

	#[test]
	fn test_swap() {
		let state = AccessState::new(BufferAccess::Undefined);
		assert_eq!(state.swap(BufferAccess::ShaderRead), BufferAccess::Undefined);
		assert_eq!(state.load(), BufferAccess::ShaderRead);
		assert_eq!(state.swap(BufferAccess::ShaderRead), BufferAccess::ShaderRead);
	}
}
