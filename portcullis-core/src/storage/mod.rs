//! In-process storage implementations
//!
//! [`MemoryCounterStore`] implements [`CounterStore`](crate::repositories::CounterStore) for
//! single-node deployments and tests. Multi-node deployments share counters through an external
//! store implementing the same trait.

pub mod memory;

pub use memory::MemoryCounterStore;
