use crate::resource::ResourceKind;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A typed, generational reference to a resource owned by a [`Pool`].
///
/// `index` is 1-based, so the all-zero handle is [`Handle::NULL`]. The `version` is the generation of the slot at the
/// time the handle was created. Once the slot is retired, the handle can never be dereferenced again, even if the
/// slot index is later reused for a different resource.
///
/// [`Pool`]: crate::backing::pool::Pool
pub struct Handle<K: ResourceKind> {
	index: u32,
	version: u32,
	_phantom: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> Handle<K> {
	pub const NULL: Self = Self {
		index: 0,
		version: 0,
		_phantom: PhantomData,
	};

	/// # Safety
	/// Must only be constructed by a [`Pool`] for a slot it owns.
	///
	/// [`Pool`]: crate::backing::pool::Pool
	#[inline]
	pub(crate) const unsafe fn new(index: u32, version: u32) -> Self {
		Self {
			index,
			version,
			_phantom: PhantomData,
		}
	}

	/// The 1-based slot index, 0 for [`Handle::NULL`]
	#[inline]
	pub const fn index(&self) -> u32 {
		self.index
	}

	#[inline]
	pub const fn version(&self) -> u32 {
		self.version
	}

	#[inline]
	pub const fn is_null(&self) -> bool {
		self.index == 0
	}

	/// Erases the kind, used for deduplicating pins of different resource kinds in one set.
	#[inline]
	pub fn erase(&self) -> AnyHandle {
		AnyHandle {
			kind: K::KIND,
			index: self.index,
			version: self.version,
		}
	}

	/// The position of this handle's slot in the pool's backing storage.
	#[inline]
	pub(crate) fn slot_index(&self) -> Option<usize> {
		self.index.checked_sub(1).map(|i| i as usize)
	}
}

impl<K: ResourceKind> Copy for Handle<K> {}

impl<K: ResourceKind> Clone for Handle<K> {
	#[inline]
	fn clone(&self) -> Self {
		*self
	}
}

impl<K: ResourceKind> Default for Handle<K> {
	#[inline]
	fn default() -> Self {
		Self::NULL
	}
}

impl<K: ResourceKind> PartialEq for Handle<K> {
	#[inline]
	fn eq(&self, other: &Self) -> bool {
		self.index == other.index && self.version == other.version
	}
}

impl<K: ResourceKind> Eq for Handle<K> {}

impl<K: ResourceKind> Hash for Handle<K> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.index.hash(state);
		self.version.hash(state);
	}
}

impl<K: ResourceKind> Debug for Handle<K> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if self.is_null() {
			write!(f, "Handle<{:?}>(null)", K::KIND)
		} else {
			write!(f, "Handle<{:?}>({}v{})", K::KIND, self.index, self.version)
		}
	}
}

/// The kind of [`Pool`] a slot belongs to.
///
/// [`Pool`]: crate::backing::pool::Pool
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PoolKind {
	Buffer,
	Image,
	Framebuffer,
	Pipeline,
	DescriptorSet,
}

impl PoolKind {
	pub const VALUES: [PoolKind; 5] = [
		PoolKind::Buffer,
		PoolKind::Image,
		PoolKind::Framebuffer,
		PoolKind::Pipeline,
		PoolKind::DescriptorSet,
	];
}

/// A [`Handle`] with its kind erased.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct AnyHandle {
	pub kind: PoolKind,
	pub index: u32,
	pub version: u32,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::resource::{Buffer, Image};
	use std::collections::HashSet;

	#[test]
	fn test_null() {
		let null = Handle::<Buffer>::NULL;
		assert!(null.is_null());
		assert_eq!(null.slot_index(), None);
		assert_eq!(null, Handle::default());
		assert_eq!(format!("{null:?}"), "Handle<Buffer>(null)");
	}

	#[test]
	fn test_identity() {
		let a = unsafe { Handle::<Buffer>::new(3, 0) };
		let b = unsafe { Handle::<Buffer>::new(3, 1) };
		assert_ne!(a, b);
		assert_eq!(a.slot_index(), Some(2));
		assert_eq!(format!("{b:?}"), "Handle<Buffer>(3v1)");
	}

	#[test]
	fn test_erase_keeps_kinds_apart() {
		let buffer = unsafe { Handle::<Buffer>::new(1, 0) };
		let image = unsafe { Handle::<Image>::new(1, 0) };
		let set = HashSet::from([buffer.erase(), image.erase()]);
		assert_eq!(set.len(), 2);
	}
}
