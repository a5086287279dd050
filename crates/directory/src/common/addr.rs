//! Line addresses and node identities.
//!
//! The directory tracks coherence at cache-line granularity. Every address the
//! dispatcher works with is a line base produced by [`line_base`]. Peers are
//! named by strings on the wire and mapped to compact [`NodeId`]s internally.

use std::fmt;

/// A byte address in the shared physical address space.
pub type Addr = u64;

/// Aligns an address down to the start of its cache line.
///
/// # Arguments
///
/// * `addr` - Any byte address.
/// * `line_size` - Line size in bytes; must be a power of two.
///
/// # Returns
///
/// The base address of the line containing `addr`.
#[inline(always)]
pub const fn line_base(addr: Addr, line_size: u64) -> Addr {
    addr & !(line_size - 1)
}

/// Compact identity of a cache (or other upstream agent) known to the directory.
///
/// Identities are allocated by the directory's node registry in order of first
/// appearance and are stable for the lifetime of the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
