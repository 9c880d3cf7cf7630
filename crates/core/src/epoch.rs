//! Busy-time epochs: every queue counts its submissions, and every resource remembers the count of each queue at the
//! time it was last referenced. Comparing the two answers "may the GPU still be using this?" without touching fences.
//!
//! A snapshot of `s` means the resource was recorded into the submission that will carry epoch `s + 1`. The epoch
//! values double as the timeline semaphore values a platform signals once a submission completes.

use crossbeam_utils::CachePadded;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

/// Snapshot value of a queue that never referenced a resource
pub const NEVER: u64 = u64::MAX;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum QueueType {
	/// The per-frame graphics submission, throttled by the frame lag.
	Frame,
	Graphics,
	TransferOnly,
	ComputeOnly,
}

impl QueueType {
	pub const COUNT: usize = 4;
	pub const VALUES: [QueueType; Self::COUNT] = [
		QueueType::Frame,
		QueueType::Graphics,
		QueueType::TransferOnly,
		QueueType::ComputeOnly,
	];
	/// Queues whose busy state is derived from the ready check rather than the frame lag
	pub const NON_FRAME: [QueueType; 3] = [QueueType::Graphics, QueueType::TransferOnly, QueueType::ComputeOnly];

	#[inline]
	pub const fn index(self) -> usize {
		self as usize
	}

	#[inline]
	pub const fn is_frame(self) -> bool {
		matches!(self, QueueType::Frame)
	}
}

/// The monotonic submission counters of all queues.
#[derive(Debug)]
pub struct QueueEpochs {
	busy: [CachePadded<AtomicU64>; QueueType::COUNT],
}

impl QueueEpochs {
	pub fn new() -> Self {
		Self {
			busy: core::array::from_fn(|_| CachePadded::new(AtomicU64::new(0))),
		}
	}

	/// The epoch of the latest submission on `queue`, 0 if nothing was submitted yet.
	#[inline]
	pub fn busy_time(&self, queue: QueueType) -> u64 {
		self.busy[queue.index()].load(Acquire)
	}

	/// Advances `queue` by one submission and returns the new epoch, which is the value the submission signals once
	/// it completed.
	#[inline]
	pub fn submit(&self, queue: QueueType) -> u64 {
		self.busy[queue.index()].fetch_add(1, AcqRel) + 1
	}

	pub fn current(&self) -> [u64; QueueType::COUNT] {
		QueueType::VALUES.map(|q| self.busy_time(q))
	}
}

impl Default for QueueEpochs {
	fn default() -> Self {
		Self::new()
	}
}

/// Per-resource snapshot of the queue epochs at the time of its last use.
///
/// Written concurrently by recording threads, which all store the current epoch of their queue, so a relaxed store
/// is sufficient: racing writers write the same value.
#[derive(Debug)]
pub struct EpochSnapshot {
	epochs: [AtomicU64; QueueType::COUNT],
}

impl EpochSnapshot {
	pub fn new() -> Self {
		Self {
			epochs: core::array::from_fn(|_| AtomicU64::new(NEVER)),
		}
	}

	#[inline]
	pub fn mark(&self, queue: QueueType, epoch: u64) {
		self.epochs[queue.index()].store(epoch, Release);
	}

	#[inline]
	pub fn get(&self, queue: QueueType) -> Option<u64> {
		match self.epochs[queue.index()].load(Acquire) {
			NEVER => None,
			e => Some(e),
		}
	}

	/// Plain copy of this snapshot, taken when the resource leaves its pool.
	pub fn copy(&self) -> EpochCopy {
		EpochCopy(core::array::from_fn(|i| self.epochs[i].load(Relaxed)))
	}

	#[inline]
	pub fn is_ready(&self, epochs: &QueueEpochs) -> bool {
		self.copy().is_ready(epochs)
	}

	#[inline]
	pub fn is_ready_on(&self, epochs: &QueueEpochs, queue: QueueType) -> bool {
		self.copy().is_ready_on(epochs, queue)
	}

	#[inline]
	pub fn is_busy(&self, epochs: &QueueEpochs, frame_lag: u32) -> bool {
		self.copy().is_busy(epochs, frame_lag)
	}
}

impl Default for EpochSnapshot {
	fn default() -> Self {
		Self::new()
	}
}

/// A non-atomic [`EpochSnapshot`], carried by destroy records.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EpochCopy(pub [u64; QueueType::COUNT]);

impl EpochCopy {
	pub const NEVER: Self = Self([NEVER; QueueType::COUNT]);

	#[inline]
	pub fn get(&self, queue: QueueType) -> Option<u64> {
		match self.0[queue.index()] {
			NEVER => None,
			e => Some(e),
		}
	}

	/// True if no non-frame queue is still at the epoch the resource was last referenced at.
	pub fn is_ready(&self, epochs: &QueueEpochs) -> bool {
		QueueType::NON_FRAME
			.iter()
			.all(|&q| self.0[q.index()] != epochs.busy_time(q))
	}

	/// Like [`Self::is_ready`], but ignores pending use on `queue` itself, as submissions on the same queue execute
	/// in order.
	pub fn is_ready_on(&self, epochs: &QueueEpochs, queue: QueueType) -> bool {
		QueueType::NON_FRAME
			.iter()
			.filter(|&&q| q != queue)
			.all(|&q| self.0[q.index()] != epochs.busy_time(q))
	}

	/// True if not ready or if the frame queue has not yet completed `frame_lag` submissions after the one that
	/// referenced the resource.
	pub fn is_busy(&self, epochs: &QueueEpochs, frame_lag: u32) -> bool {
		if !self.is_ready(epochs) {
			return true;
		}
		match self.get(QueueType::Frame) {
			None => false,
			Some(snapshot) => epochs.busy_time(QueueType::Frame).saturating_sub(snapshot) <= frame_lag as u64,
		}
	}

	/// True if the platform signalled every submission that may reference the resource.
	pub fn has_completed(&self, completed: &[u64; QueueType::COUNT]) -> bool {
		QueueType::VALUES
			.iter()
			.all(|&q| self.get(q).map_or(true, |snapshot| completed[q.index()] > snapshot))
	}
}
