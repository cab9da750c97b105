//! # Memory Management
//!
//! Fixed-capacity pools for the entity/view/component core.
//!
//! ## Design Philosophy
//!
//! All pool memory is sized once at startup. At runtime:
//! - Slots are reused lowest-index first
//! - Handles are reference counted in per-slot atomic words, not boxes
//! - Footprint is predictable and never grows

mod pool;
pub(crate) mod refcount;
mod slab;
mod slots;

pub use pool::{MemoryBlock, ObjectPool, PoolStats};
pub use refcount::SlotCounts;
pub use slab::FixedSlab;
pub use slots::{SlotAllocator, SlotKey};
