//! Transport between the directory and its neighbours.
//!
//! The directory talks to two sides: the caches above it and memory below it.
//! Each side is a [`Link`]. When a directory has no dedicated memory link,
//! memory-bound traffic goes out on the cache-side link and the link routes it
//! by destination name.

use crate::common::Addr;
use crate::protocol::MemEvent;

/// One side of the directory's network connection.
///
/// Implementors must be `Send` so a directory can be moved to a worker thread.
pub trait Link: Send {
    /// Hands an event to the transport. Delivery timing is decided by the caller.
    fn send(&mut self, event: MemEvent);

    /// Returns the next event waiting for the directory, if any.
    fn recv(&mut self) -> Option<MemEvent>;

    /// Name of the peer that owns `addr` on the far side of this link.
    fn find_target_destination(&self, addr: Addr) -> String;

    /// Names of the upstream agents reachable through this link.
    ///
    /// The directory broadcasts whole-cache flushes to these.
    fn sources(&self) -> Vec<String> {
        Vec::new()
    }

    /// Advances the link's notion of time to `cycle`.
    ///
    /// Called once at the start of every directory tick.
    fn clock(&mut self, _cycle: u64) {}

    /// Human-readable state for diagnostic dumps.
    fn status(&self) -> String {
        String::new()
    }
}
