//! Reconciliation of observed remote heads into the branch store.

use crate::store::BranchStore;
use crate::sync::RemoteHead;
use crate::types::BranchName;

/// Apply one remote listing to the store, returning the branches that were
/// flagged as changed.
///
/// A branch is flagged when its observed head commit is strictly newer than
/// the stored `last_update`; equal timestamps are "no change", so repeated
/// listings are idempotent. New entries start at the Unix epoch, so the
/// first observation of a branch always flags it. Branches absent from the
/// listing are left untouched, and the changed flag is never cleared here —
/// only the builder resets it, after a successful rebuild.
pub fn apply(store: &BranchStore, observed: &[RemoteHead]) -> Vec<BranchName> {
    let mut flagged = Vec::new();

    for head in observed {
        let mut advanced = false;
        store.upsert(&head.name, |state| {
            if head.committed_at > state.last_update {
                state.last_update = head.committed_at;
                state.author_name = head.author_name.clone();
                state.author_email = head.author_email.clone();
                state.changed = true;
                advanced = true;
            }
        });

        if advanced {
            log::info!(
                "branch {} changed, head commit at {}",
                head.name,
                head.committed_at
            );
            flagged.push(head.name.clone());
        }
    }

    flagged
}
