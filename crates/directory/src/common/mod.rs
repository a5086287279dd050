//! Common types shared across the directory model.
//!
//! This module provides:
//! 1. **Addresses:** The line address alias and alignment helpers.
//! 2. **Nodes:** Dense identities for caches that hold copies of a line.
//! 3. **Errors:** The crate-wide error enum.

/// Line address helpers and node identities.
pub mod addr;

/// Error types for protocol violations and configuration failures.
pub mod error;

pub use addr::{Addr, NodeId, line_base};
pub use error::DirectoryError;
