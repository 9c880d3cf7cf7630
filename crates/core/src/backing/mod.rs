//! Backing data structures: the generational handle pools owning all GPU objects, and the per-frame storage used by
//! their delayed destruction.

pub mod handle;
pub mod in_flight;
pub mod pool;
pub mod ring;
