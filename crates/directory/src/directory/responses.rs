//! Responses-in-flight tracking.
//!
//! Every invalidation or fetch the directory sends to a cache is recorded here
//! until the matching answer arrives. An answer or NACK that finds no record is
//! stale and is dropped by the dispatcher.

use std::collections::HashMap;

use crate::common::{Addr, NodeId};
use crate::protocol::EventId;

/// Map from line address to the nodes that still owe an answer.
#[derive(Debug, Default)]
pub struct ResponseTracker {
    pending: HashMap<Addr, HashMap<NodeId, EventId>>,
}

impl ResponseTracker {
    /// Records that `node` owes an answer to event `id` for `addr`.
    pub fn expect(&mut self, addr: Addr, node: NodeId, id: EventId) {
        let _ = self.pending.entry(addr).or_default().insert(node, id);
    }

    /// Removes the record for `node` at `addr`, returning the id it was waiting on.
    pub fn take(&mut self, addr: Addr, node: NodeId) -> Option<EventId> {
        let nodes = self.pending.get_mut(&addr)?;
        let id = nodes.remove(&node);
        if nodes.is_empty() {
            let _ = self.pending.remove(&addr);
        }
        id
    }

    /// Returns true if `node` still owes an answer to exactly event `id`.
    pub fn is_expected(&self, addr: Addr, node: NodeId, id: EventId) -> bool {
        self.pending
            .get(&addr)
            .and_then(|nodes| nodes.get(&node))
            .is_some_and(|&expected| expected == id)
    }

    /// Number of answers outstanding for `addr`.
    pub fn outstanding(&self, addr: Addr) -> usize {
        self.pending.get(&addr).map_or(0, HashMap::len)
    }

    /// Returns true if no answer is outstanding anywhere.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Outstanding records sorted by address then node.
    pub fn sorted(&self) -> Vec<(Addr, NodeId, EventId)> {
        let mut all: Vec<_> = self
            .pending
            .iter()
            .flat_map(|(&addr, nodes)| nodes.iter().map(move |(&n, &id)| (addr, n, id)))
            .collect();
        all.sort_unstable();
        all
    }
}
