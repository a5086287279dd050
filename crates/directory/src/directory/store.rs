//! Live directory map and node registry.
//!
//! The [`EntryStore`] owns every [`DirEntry`] the directory currently tracks,
//! keyed by line address. An address is absent once its entry returned to `I`
//! and was dropped. The [`NodeRegistry`] maps peer names to [`NodeId`]s.

use std::collections::HashMap;

use super::entry::DirEntry;
use crate::common::{Addr, NodeId};

/// Owning map from line address to entry.
#[derive(Debug, Default)]
pub struct EntryStore {
    entries: HashMap<Addr, DirEntry>,
    new_entries_cached: bool,
}

impl EntryStore {
    /// Creates an empty store.
    ///
    /// # Arguments
    ///
    /// * `new_entries_cached` - Whether entries created on first reference start resident.
    pub fn new(new_entries_cached: bool) -> Self {
        Self {
            entries: HashMap::new(),
            new_entries_cached,
        }
    }

    /// Returns the entry for `addr`, creating it in state `I` if absent.
    pub fn get_or_create(&mut self, addr: Addr) -> &mut DirEntry {
        let cached = self.new_entries_cached;
        self.entries
            .entry(addr)
            .or_insert_with(|| DirEntry::new(addr, cached))
    }

    /// Returns the entry for `addr`.
    pub fn get(&self, addr: Addr) -> Option<&DirEntry> {
        self.entries.get(&addr)
    }

    /// Returns the entry for `addr` mutably.
    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut DirEntry> {
        self.entries.get_mut(&addr)
    }

    /// Drops the entry for `addr`.
    pub fn remove(&mut self, addr: Addr) -> Option<DirEntry> {
        self.entries.remove(&addr)
    }

    /// Returns true if `addr` is tracked.
    pub fn contains(&self, addr: Addr) -> bool {
        self.entries.contains_key(&addr)
    }

    /// Number of tracked lines.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no line is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by address.
    pub fn sorted(&self) -> Vec<&DirEntry> {
        let mut all: Vec<&DirEntry> = self.entries.values().collect();
        all.sort_by_key(|e| e.base_addr());
        all
    }
}

/// Bidirectional map between peer names and dense ids.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    ids: HashMap<String, NodeId>,
    names: Vec<String>,
}

impl NodeRegistry {
    /// Returns the id for `name`, registering it on first sight.
    pub fn id(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = NodeId(self.names.len() as u32);
        self.names.push(name.to_owned());
        let _ = self.ids.insert(name.to_owned(), id);
        id
    }

    /// Returns the id for `name` without registering it.
    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    /// Returns the name registered for `id`.
    pub fn name(&self, id: NodeId) -> &str {
        self.names.get(id.0 as usize).map_or("?", String::as_str)
    }
}
