use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::Arc;

/// The pin counters of a resource. A resource with any pin may not be retired.
#[derive(Debug, Default)]
pub struct PinState {
	/// reserved by a command buffer that did not begin recording yet
	ready_lock: AtomicU32,
	/// referenced by a recording or an unretired submission
	busy_lock: AtomicU32,
}

impl PinState {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	#[inline]
	pub fn ready_lock(&self) -> u32 {
		self.ready_lock.load(Acquire)
	}

	#[inline]
	pub fn busy_lock(&self) -> u32 {
		self.busy_lock.load(Acquire)
	}

	#[inline]
	pub fn is_pinned(&self) -> bool {
		self.ready_lock() != 0 || self.busy_lock() != 0
	}

	fn counter(&self, kind: PinKind) -> &AtomicU32 {
		match kind {
			PinKind::Ready => &self.ready_lock,
			PinKind::Busy => &self.busy_lock,
		}
	}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinKind {
	Ready,
	Busy,
}

/// An RAII increment of one of the [`PinState`] counters.
pub struct Pin {
	state: Arc<PinState>,
	kind: PinKind,
}

impl Pin {
	pub fn new(state: &Arc<PinState>, kind: PinKind) -> Self {
		state.counter(kind).fetch_add(1, Relaxed);
		Self {
			state: state.clone(),
			kind,
		}
	}

	#[inline]
	pub fn kind(&self) -> PinKind {
		self.kind
	}

	#[inline]
	pub fn state(&self) -> &Arc<PinState> {
		&self.state
	}

	/// Turns a ready pin into a busy pin, the resource is never observably unpinned in between.
	pub fn promote(&mut self) {
		if self.kind == PinKind::Ready {
			self.state.busy_lock.fetch_add(1, Relaxed);
			self.state.ready_lock.fetch_sub(1, Release);
			self.kind = PinKind::Busy;
		}
	}
}

impl Debug for Pin {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("Pin").field(&self.kind).finish()
	}
}

impl Drop for Pin {
	fn drop(&mut self) {
		if self.state.counter(self.kind).fetch_sub(1, Release) == 0 {
			panic!("{:?} pin count underflow", self.kind);
		}
	}
}
