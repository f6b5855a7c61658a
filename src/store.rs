//! In-memory store of per-branch observed state.
//!
//! The store is the single shared mutable structure in the daemon: the sync
//! pass writes to it, the HTTP layer reads from it. All writes go through
//! [`BranchStore::upsert`], which runs the caller's mutator under the entry
//! lock so an entry's fields are never partially visible to readers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::types::BranchName;

/// Observed state of one remote branch.
#[derive(Debug, Clone)]
pub struct BranchState {
    /// Branch short name, unique within the store.
    pub name: BranchName,
    /// Author timestamp of the newest observed head commit.
    pub last_update: DateTime<Utc>,
    /// Author name of that commit.
    pub author_name: String,
    /// Author email of that commit.
    pub author_email: String,
    /// True while the cached snapshot lags behind `last_update`.
    pub changed: bool,
    /// Packaged archive of the branch tree, absent until first built.
    pub snapshot: Option<Arc<[u8]>>,
}

impl BranchState {
    fn new(name: BranchName) -> Self {
        Self {
            name,
            last_update: DateTime::UNIX_EPOCH,
            author_name: String::new(),
            author_email: String::new(),
            changed: false,
            snapshot: None,
        }
    }
}

/// Concurrent map of branch name to [`BranchState`].
///
/// Entries are created on first observation and never removed; a branch
/// deleted on the remote keeps its last known state for the process
/// lifetime.
pub struct BranchStore {
    entries: DashMap<BranchName, BranchState>,
}

impl Default for BranchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up a single branch, cloning its state out of the map.
    pub fn get(&self, name: &BranchName) -> Option<BranchState> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Snapshot of all entries. Each entry is cloned under its own lock;
    /// the collection as a whole is not a point-in-time view across
    /// branches, which matches the listing semantics of the query surface.
    pub fn get_all(&self) -> Vec<BranchState> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Read-or-create the entry for `name` and apply `mutate` to it while
    /// holding the entry lock.
    ///
    /// A freshly created entry starts with `last_update` at the Unix epoch,
    /// no author, `changed = false` and no snapshot; the mutator sees that
    /// blank state and fills it in. Both the detector and the builder use
    /// this as their only write path, so concurrent read-modify-write
    /// cycles on the same branch cannot lose updates.
    pub fn upsert<F>(&self, name: &BranchName, mutate: F)
    where
        F: FnOnce(&mut BranchState),
    {
        let mut entry = self
            .entries
            .entry(name.clone())
            .or_insert_with(|| BranchState::new(name.clone()));
        mutate(entry.value_mut());
    }

    /// Number of known branches.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no branch has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
