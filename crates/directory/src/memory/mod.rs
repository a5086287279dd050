//! Memory below the directory.
//!
//! This module provides:
//! 1. **Controllers:** Latency models for memory accesses.
//! 2. **Backing memory:** A functional memory endpoint that answers directory traffic over a [`Link`](crate::link::Link).

/// Backing memory endpoint.
pub mod backing;

/// Memory controller latency models.
pub mod controller;

pub use backing::{BackingMemory, MemoryPort};
pub use controller::{DramController, MemoryController, SimpleController};
