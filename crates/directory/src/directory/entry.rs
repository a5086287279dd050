//! Directory entries.
//!
//! A [`DirEntry`] is the coherence record for one line: its state, the set of
//! sharers, the owner, and whether the record is resident or spilled to memory.

use std::collections::BTreeSet;
use std::fmt;

use crate::common::{Addr, NodeId};
use crate::protocol::State;

/// Coherence record for one cache line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    base_addr: Addr,
    state: State,
    sharers: BTreeSet<NodeId>,
    owner: Option<NodeId>,
    cached: bool,
}

impl DirEntry {
    /// Creates an entry in state `I` with no sharers and no owner.
    pub const fn new(base_addr: Addr, cached: bool) -> Self {
        Self {
            base_addr,
            state: State::I,
            sharers: BTreeSet::new(),
            owner: None,
            cached,
        }
    }

    /// Line base address.
    #[inline]
    pub const fn base_addr(&self) -> Addr {
        self.base_addr
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Sets the state.
    #[inline]
    pub const fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// Returns true if the record is resident.
    #[inline]
    pub const fn is_cached(&self) -> bool {
        self.cached
    }

    /// Marks the record resident or spilled.
    #[inline]
    pub const fn set_cached(&mut self, cached: bool) {
        self.cached = cached;
    }

    /// Current sharers in ascending id order.
    pub const fn sharers(&self) -> &BTreeSet<NodeId> {
        &self.sharers
    }

    /// Number of sharers.
    #[inline]
    pub fn sharer_count(&self) -> usize {
        self.sharers.len()
    }

    /// Returns true if `node` holds a shared copy.
    #[inline]
    pub fn is_sharer(&self, node: NodeId) -> bool {
        self.sharers.contains(&node)
    }

    /// Adds a sharer.
    pub fn add_sharer(&mut self, node: NodeId) {
        debug_assert!(self.owner.is_none(), "sharer added to owned line {:#x}", self.base_addr);
        let _ = self.sharers.insert(node);
    }

    /// Removes a sharer; returns true if it was present.
    pub fn remove_sharer(&mut self, node: NodeId) -> bool {
        self.sharers.remove(&node)
    }

    /// Removes every sharer.
    pub fn clear_sharers(&mut self) {
        self.sharers.clear();
    }

    /// Current owner.
    #[inline]
    pub const fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    /// Returns true if `node` owns the line.
    #[inline]
    pub fn is_owner(&self, node: NodeId) -> bool {
        self.owner == Some(node)
    }

    /// Sets the owner.
    pub fn set_owner(&mut self, node: NodeId) {
        debug_assert!(self.sharers.is_empty(), "owner set on shared line {:#x}", self.base_addr);
        self.owner = Some(node);
    }

    /// Clears the owner.
    pub const fn clear_owner(&mut self) {
        self.owner = None;
    }
}

impl fmt::Display for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} {} cached={} sharers=[", self.base_addr, self.state, self.cached)?;
        for (i, s) in self.sharers.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{s}")?;
        }
        f.write_str("]")?;
        if let Some(owner) = self.owner {
            write!(f, " owner={owner}")?;
        }
        Ok(())
    }
}
