use crate::backing::handle::{Handle, PoolKind};
use crate::destroy::{DestroyQueue, DestroyRecord, SlotRef};
use crate::platform::GraphicsPlatform;
use crate::resource::{Buffer, DescriptorSet, Framebuffer, Image, Pipeline, ResourceKind, TrackedSlot};
use std::fmt::{Debug, Formatter};
use std::mem;

enum SlotState<T> {
	Vacant,
	Alive { value: T, destroy_requested: bool },
	/// Handed to the destroy queue, may only be reused once the queue released it.
	Retired,
}

struct Slot<T> {
	version: u32,
	state: SlotState<T>,
}

/// An arena owning all resources of kind `K`, addressed by generational [`Handle`]s.
pub struct Pool<P: GraphicsPlatform, K: ResourceKind> {
	slots: Vec<Slot<K::Slot<P>>>,
	/// vacant slot positions, reused LIFO
	vacant: Vec<u32>,
	/// positions of slots that were requested to be destroyed while pinned
	soft_destroyed: Vec<u32>,
	len: usize,
}

impl<P: GraphicsPlatform, K: ResourceKind> Pool<P, K> {
	pub fn new() -> Self {
		Self {
			slots: Vec::new(),
			vacant: Vec::new(),
			soft_destroyed: Vec::new(),
			len: 0,
		}
	}

	/// Amount of live resources
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn create(&mut self, value: K::Slot<P>) -> Handle<K> {
		let pos = match self.vacant.pop() {
			Some(pos) => {
				let slot = &mut self.slots[pos as usize];
				debug_assert!(matches!(slot.state, SlotState::Vacant));
				slot.state = SlotState::Alive {
					value,
					destroy_requested: false,
				};
				pos
			}
			None => {
				let pos = u32::try_from(self.slots.len())
					.ok()
					.filter(|pos| *pos < u32::MAX)
					.unwrap_or_else(|| panic!("{:?} pool ran out of slot indices", K::KIND));
				self.slots.push(Slot {
					version: 0,
					state: SlotState::Alive {
						value,
						destroy_requested: false,
					},
				});
				pos
			}
		};
		self.len += 1;
		// Safety: the slot at pos is owned by this pool and was just made alive
		unsafe { Handle::new(pos + 1, self.slots[pos as usize].version) }
	}

	fn slot(&self, handle: Handle<K>) -> Option<&Slot<K::Slot<P>>> {
		let slot = self.slots.get(handle.slot_index()?)?;
		(slot.version == handle.version()).then_some(slot)
	}

	pub fn try_get(&self, handle: Handle<K>) -> Option<&K::Slot<P>> {
		match &self.slot(handle)?.state {
			SlotState::Alive { value, .. } => Some(value),
			_ => None,
		}
	}

	pub fn try_get_mut(&mut self, handle: Handle<K>) -> Option<&mut K::Slot<P>> {
		let slot = self.slots.get_mut(handle.slot_index()?)?;
		if slot.version != handle.version() {
			return None;
		}
		match &mut slot.state {
			SlotState::Alive { value, .. } => Some(value),
			_ => None,
		}
	}

	/// Dereferences `handle`.
	///
	/// # Panics
	/// If the handle is null or refers to a resource that was destroyed.
	#[track_caller]
	pub fn get(&self, handle: Handle<K>) -> &K::Slot<P> {
		match self.try_get(handle) {
			Some(value) => value,
			None => panic!("{:?} does not refer to a live resource", handle),
		}
	}

	/// Dereferences `handle` mutably.
	///
	/// # Panics
	/// If the handle is null or refers to a resource that was destroyed.
	#[track_caller]
	pub fn get_mut(&mut self, handle: Handle<K>) -> &mut K::Slot<P> {
		match self.try_get_mut(handle) {
			Some(value) => value,
			None => panic!("{:?} does not refer to a live resource", handle),
		}
	}

	#[inline]
	pub fn is_alive(&self, handle: Handle<K>) -> bool {
		self.try_get(handle).is_some()
	}

	/// Destroys the resource `handle` refers to, returning true if nothing is left alive.
	///
	/// * a null handle is a no-op returning true
	/// * a pinned resource is only marked to be destroyed by a later [`Self::dispose`] and stays usable, returns false
	/// * otherwise the slot is retired and its backing objects are queued into `queue`, the handle is stale from now
	///   on
	///
	/// Destroying a stale handle or a resource reserved by a command buffer that has not begun recording is a
	/// contract violation, panicking in debug builds and returning false in release builds.
	#[track_caller]
	pub fn destroy(&mut self, handle: Handle<K>, queue: &mut DestroyQueue<P>) -> bool {
		let Some(pos) = handle.slot_index() else {
			return true;
		};
		let Some(SlotState::Alive {
			value,
			destroy_requested,
		}) = self
			.slots
			.get_mut(pos)
			.filter(|slot| slot.version == handle.version())
			.map(|slot| &mut slot.state)
		else {
			if cfg!(debug_assertions) {
				panic!("double destroy of {:?}", handle);
			}
			return false;
		};

		let pins = value.resource().pins();
		if pins.ready_lock() != 0 {
			if cfg!(debug_assertions) {
				panic!(
					"{:?} \"{}\" is reserved by a command buffer that has not begun recording",
					handle,
					value.resource().name()
				);
			}
			return false;
		}
		if pins.busy_lock() != 0 {
			if !*destroy_requested {
				*destroy_requested = true;
				self.soft_destroyed.push(pos as u32);
			}
			return false;
		}
		self.retire(pos, queue);
		true
	}

	/// Retires all resources that were requested to be destroyed while pinned and are no longer pinned. Returns the
	/// amount of retired resources.
	pub fn dispose(&mut self, queue: &mut DestroyQueue<P>) -> usize {
		let mut pending = mem::take(&mut self.soft_destroyed);
		let mut retired = 0;
		pending.retain(|&pos| {
			let pinned = match &self.slots[pos as usize].state {
				SlotState::Alive {
					value,
					destroy_requested: true,
				} => value.resource().pins().is_pinned(),
				// destroyed explicitly in the meantime
				_ => return false,
			};
			if !pinned {
				self.retire(pos as usize, queue);
				retired += 1;
			}
			pinned
		});
		self.soft_destroyed = pending;
		retired
	}

	/// Makes a slot released by the destroy queue available again, invalidating all handles to it.
	pub fn recycle(&mut self, index: u32) {
		let pos = index as usize - 1;
		let slot = &mut self.slots[pos];
		assert!(
			matches!(slot.state, SlotState::Retired),
			"recycling {:?} slot {} that is not retired",
			K::KIND,
			index
		);
		// slots whose version would overflow are never reused
		if let Some(version) = slot.version.checked_add(1) {
			slot.version = version;
			slot.state = SlotState::Vacant;
			self.vacant.push(pos as u32);
		}
	}

	/// Retires every live resource regardless of pins, used during teardown. Returns the amount of retired resources.
	pub fn retire_all(&mut self, queue: &mut DestroyQueue<P>) -> usize {
		let alive = (0..self.slots.len())
			.filter(|&pos| matches!(self.slots[pos].state, SlotState::Alive { .. }))
			.collect::<Vec<_>>();
		for &pos in &alive {
			self.retire(pos, queue);
		}
		self.soft_destroyed.clear();
		alive.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &K::Slot<P>)> {
		self.slots.iter().enumerate().filter_map(|(pos, slot)| match &slot.state {
			// Safety: pos is a slot of this pool
			SlotState::Alive { value, .. } => Some((unsafe { Handle::new(pos as u32 + 1, slot.version) }, value)),
			_ => None,
		})
	}

	fn retire(&mut self, pos: usize, queue: &mut DestroyQueue<P>) {
		let slot = &mut self.slots[pos];
		let SlotState::Alive { value, .. } = mem::replace(&mut slot.state, SlotState::Retired) else {
			unreachable!("only live slots can be retired");
		};
		self.len -= 1;
		let epochs = value.resource().epochs().copy();
		queue.push(DestroyRecord {
			resource: value.into_destroy(),
			epochs,
			slot: Some(SlotRef {
				kind: K::KIND,
				index: pos as u32 + 1,
			}),
		});
	}
}

impl<P: GraphicsPlatform, K: ResourceKind> Default for Pool<P, K> {
	fn default() -> Self {
		Self::new()
	}
}

impl<P: GraphicsPlatform, K: ResourceKind> Debug for Pool<P, K> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pool")
			.field("kind", &K::KIND)
			.field("len", &self.len)
			.field("slots", &self.slots.len())
			.field("soft_destroyed", &self.soft_destroyed.len())
			.finish()
	}
}

/// One [`Pool`] per resource kind.
pub struct Pools<P: GraphicsPlatform> {
	pub buffers: Pool<P, Buffer>,
	pub images: Pool<P, Image>,
	pub framebuffers: Pool<P, Framebuffer>,
	pub pipelines: Pool<P, Pipeline>,
	pub descriptor_sets: Pool<P, DescriptorSet>,
}

impl<P: GraphicsPlatform> Debug for Pools<P> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pools")
			.field("buffers", &self.buffers)
			.field("images", &self.images)
			.field("framebuffers", &self.framebuffers)
			.field("pipelines", &self.pipelines)
			.field("descriptor_sets", &self.descriptor_sets)
			.finish()
	}
}

impl<P: GraphicsPlatform> Pools<P> {
	pub fn new() -> Self {
		Self {
			buffers: Pool::new(),
			images: Pool::new(),
			framebuffers: Pool::new(),
			pipelines: Pool::new(),
			descriptor_sets: Pool::new(),
		}
	}

	pub fn dispose(&mut self, queue: &mut DestroyQueue<P>) -> usize {
		profiling::function_scope!();
		self.buffers.dispose(queue)
			+ self.images.dispose(queue)
			+ self.framebuffers.dispose(queue)
			+ self.pipelines.dispose(queue)
			+ self.descriptor_sets.dispose(queue)
	}

	pub fn recycle(&mut self, slot: SlotRef) {
		match slot.kind {
			PoolKind::Buffer => self.buffers.recycle(slot.index),
			PoolKind::Image => self.images.recycle(slot.index),
			PoolKind::Framebuffer => self.framebuffers.recycle(slot.index),
			PoolKind::Pipeline => self.pipelines.recycle(slot.index),
			PoolKind::DescriptorSet => self.descriptor_sets.recycle(slot.index),
		}
	}

	pub fn retire_all(&mut self, queue: &mut DestroyQueue<P>) -> usize {
		self.buffers.retire_all(queue)
			+ self.images.retire_all(queue)
			+ self.framebuffers.retire_all(queue)
			+ self.pipelines.retire_all(queue)
			+ self.descriptor_sets.retire_all(queue)
	}

	/// Amount of live resources in all pools
	pub fn len(&self) -> usize {
		self.buffers.len()
			+ self.images.len()
			+ self.framebuffers.len()
			+ self.pipelines.len()
			+ self.descriptor_sets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<P: GraphicsPlatform> Default for Pools<P> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::platform::headless::Headless;
	use crate::resource::{PinKind, PipelineSlot};

	type PipelinePool = Pool<Headless, Pipeline>;

	fn slot(name: &str) -> PipelineSlot<Headless> {
		PipelineSlot::new(None, name)
	}

	fn release_all(pool: &mut PipelinePool, queue: &mut DestroyQueue<Headless>) {
		let released = unsafe { queue.destroy_all(&Headless::new()) };
		for slot in released {
			pool.recycle(slot.index);
		}
	}

	#[test]
	fn test_create_get() {
		let mut pool = PipelinePool::new();
		let a = pool.create(slot("a"));
		let b = pool.create(slot("b"));
		assert_eq!(pool.len(), 2);
		assert_eq!(pool.get(a).resource().name(), "a");
		assert_eq!(pool.get(b).resource().name(), "b");
		assert_eq!((a.index(), b.index()), (1, 2));
		assert_eq!(pool.iter().count(), 2);
	}

	#[test]
	fn test_destroy_null() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		assert!(pool.destroy(Handle::NULL, &mut queue));
		assert!(queue.is_empty());
	}

	#[test]
	fn test_destroy_then_recycle() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let a = pool.create(slot("a"));
		assert!(pool.destroy(a, &mut queue));
		assert!(!pool.is_alive(a));
		assert!(pool.try_get(a).is_none());
		assert_eq!(queue.len(), 1);
		assert_eq!(pool.len(), 0);

		// retired slots are not reused until released
		let b = pool.create(slot("b"));
		assert_eq!(b.index(), 2);

		release_all(&mut pool, &mut queue);
		let c = pool.create(slot("c"));
		assert_eq!(c.index(), a.index());
		assert_ne!(c.version(), a.version());
		assert!(!pool.is_alive(a));
		assert_eq!(pool.get(c).resource().name(), "c");
	}

	#[test]
	fn test_vacant_reuse_is_lifo() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let handles = (0..4).map(|_| pool.create(slot(""))).collect::<Vec<_>>();
		for h in &handles {
			assert!(pool.destroy(*h, &mut queue));
		}
		release_all(&mut pool, &mut queue);
		// released in order 1, 2, 3, 4 and popped in reverse
		let indices = (0..4).map(|_| pool.create(slot("")).index()).collect::<Vec<_>>();
		assert_eq!(indices, vec![4, 3, 2, 1]);
	}

	#[test]
	#[should_panic(expected = "double destroy")]
	#[cfg(debug_assertions)]
	fn test_double_destroy() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let a = pool.create(slot("a"));
		assert!(pool.destroy(a, &mut queue));
		pool.destroy(a, &mut queue);
	}

	#[test]
	#[should_panic(expected = "does not refer to a live resource")]
	fn test_get_stale() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let a = pool.create(slot("a"));
		pool.destroy(a, &mut queue);
		let _ = pool.get(a);
	}

	#[test]
	fn test_busy_pins_soft_destroy() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let a = pool.create(slot("a"));
		let pin1 = pool.get(a).resource().pin(PinKind::Busy);
		let pin2 = pool.get(a).resource().pin(PinKind::Busy);

		assert!(!pool.destroy(a, &mut queue));
		assert!(!pool.destroy(a, &mut queue));
		assert!(pool.is_alive(a));
		assert_eq!(pool.dispose(&mut queue), 0);

		drop(pin1);
		assert_eq!(pool.dispose(&mut queue), 0);
		drop(pin2);
		assert!(pool.destroy(a, &mut queue));
		assert!(!pool.is_alive(a));
		// the explicit destroy already retired it
		assert_eq!(pool.dispose(&mut queue), 0);
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn test_dispose_retires_unpinned() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let a = pool.create(slot("a"));
		let pin = pool.get(a).resource().pin(PinKind::Busy);
		assert!(!pool.destroy(a, &mut queue));
		drop(pin);
		assert_eq!(pool.dispose(&mut queue), 1);
		assert!(!pool.is_alive(a));
		assert_eq!(queue.len(), 1);
	}

	#[test]
	#[should_panic(expected = "has not begun recording")]
	#[cfg(debug_assertions)]
	fn test_destroy_ready_pinned() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(2);
		let a = pool.create(slot("a"));
		let _pin = pool.get(a).resource().pin(PinKind::Ready);
		pool.destroy(a, &mut queue);
	}

	#[test]
	fn test_version_overflow_is_never_reused() {
		let mut pool = PipelinePool::new();
		let mut queue = DestroyQueue::new(1);
		let a = pool.create(slot("a"));
		pool.slots[0].version = u32::MAX;
		let a = unsafe { Handle::new(a.index(), u32::MAX) };
		assert!(pool.destroy(a, &mut queue));
		release_all(&mut pool, &mut queue);
		let b = pool.create(slot("b"));
		assert_eq!(b.index(), 2);
	}
}
