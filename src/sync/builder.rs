//! Snapshot rebuilds for branches flagged by the detector.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::BranchStore;
use crate::sync::SyncError;
use crate::types::BranchName;

/// Produces the packaged snapshot for a branch's current head.
///
/// Implemented by the mirror in production; tests substitute fakes so the
/// rebuild logic can be exercised without a repository.
pub trait SnapshotSource {
    fn snapshot(&self, name: &BranchName) -> Result<Vec<u8>, SyncError>;
}

/// Counters for one rebuild sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Snapshots successfully rebuilt.
    pub rebuilt: usize,
    /// Branches whose rebuild failed; they stay flagged for the next pass.
    pub failed: usize,
    /// True if the sweep stopped early because shutdown was requested.
    pub cancelled: bool,
}

/// Rebuild the snapshot of every entry currently flagged as changed.
///
/// The `last_update` seen when the sweep picked the entry is compared again
/// inside the entry lock when writing the result back: the changed flag is
/// cleared only if no newer observation landed during the build, so a
/// concurrent detection is never erased. The freshly built payload is
/// installed either way — it is no older than whatever it replaces.
///
/// Failures are contained per branch: the entry keeps its flag and its
/// previous snapshot, and is retried on the next pass. The shutdown flag is
/// checked between branches so a sweep never outlives a stop request by
/// more than one build.
pub fn rebuild_flagged(
    store: &BranchStore,
    source: &dyn SnapshotSource,
    shutdown: &AtomicBool,
) -> BuildOutcome {
    let mut outcome = BuildOutcome::default();

    for state in store.get_all() {
        if !state.changed {
            continue;
        }

        if shutdown.load(Ordering::SeqCst) {
            outcome.cancelled = true;
            break;
        }

        let seen = state.last_update;
        match source.snapshot(&state.name) {
            Ok(payload) => {
                store.upsert(&state.name, |entry| {
                    entry.snapshot = Some(Arc::from(payload));
                    if entry.last_update == seen {
                        entry.changed = false;
                    }
                });
                log::info!("rebuilt snapshot for {}", state.name);
                outcome.rebuilt += 1;
            }
            Err(SyncError::Cancelled) => {
                outcome.cancelled = true;
                break;
            }
            Err(err) => {
                log::warn!("snapshot rebuild failed for {}: {}", state.name, err);
                outcome.failed += 1;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::GitError;
    use crate::sync::detect;
    use crate::sync::RemoteHead;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn branch(name: &str) -> BranchName {
        name.parse().unwrap()
    }

    fn head(name: &str, secs: i64) -> RemoteHead {
        RemoteHead {
            name: branch(name),
            committed_at: ts(secs),
            author_name: "Test User".to_string(),
            author_email: "test@example.com".to_string(),
        }
    }

    /// Snapshot source backed by a fixed map of payloads.
    struct FakeSource {
        payloads: HashMap<BranchName, Vec<u8>>,
    }

    impl FakeSource {
        fn new(entries: &[(&str, &[u8])]) -> Self {
            Self {
                payloads: entries
                    .iter()
                    .map(|(name, payload)| (branch(name), payload.to_vec()))
                    .collect(),
            }
        }
    }

    impl SnapshotSource for FakeSource {
        fn snapshot(&self, name: &BranchName) -> Result<Vec<u8>, SyncError> {
            self.payloads
                .get(name)
                .cloned()
                .ok_or_else(|| SyncError::Transport(GitError::BranchNotFound(name.to_string())))
        }
    }

    #[test]
    fn successful_build_installs_snapshot_and_clears_flag() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("main", 100)]);

        let source = FakeSource::new(&[("main", b"archive-1")]);
        let outcome = rebuild_flagged(&store, &source, &AtomicBool::new(false));

        assert_eq!(outcome.rebuilt, 1);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.cancelled);

        let state = store.get(&branch("main")).unwrap();
        assert!(!state.changed);
        assert_eq!(state.snapshot.as_deref(), Some(&b"archive-1"[..]));
        assert_eq!(state.last_update, ts(100));
    }

    #[test]
    fn unflagged_entries_are_not_rebuilt() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("main", 100)]);
        let source = FakeSource::new(&[("main", b"archive-1")]);
        rebuild_flagged(&store, &source, &AtomicBool::new(false));

        // No remote change; a second sweep should not touch the entry.
        let source = FakeSource::new(&[("main", b"archive-2")]);
        let outcome = rebuild_flagged(&store, &source, &AtomicBool::new(false));

        assert_eq!(outcome, BuildOutcome::default());
        let state = store.get(&branch("main")).unwrap();
        assert_eq!(state.snapshot.as_deref(), Some(&b"archive-1"[..]));
    }

    #[test]
    fn failed_build_keeps_flag_and_previous_snapshot() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("feature", 100)]);

        let working = FakeSource::new(&[("feature", b"archive-1")]);
        rebuild_flagged(&store, &working, &AtomicBool::new(false));

        detect::apply(&store, &[head("feature", 200)]);

        // Source no longer knows the branch, so the rebuild fails.
        let broken = FakeSource::new(&[]);
        let outcome = rebuild_flagged(&store, &broken, &AtomicBool::new(false));

        assert_eq!(outcome.rebuilt, 0);
        assert_eq!(outcome.failed, 1);

        let state = store.get(&branch("feature")).unwrap();
        assert!(state.changed);
        assert_eq!(state.snapshot.as_deref(), Some(&b"archive-1"[..]));
        assert_eq!(state.last_update, ts(200));
    }

    #[test]
    fn failure_on_one_branch_does_not_affect_others() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("main", 100), head("feature", 200)]);

        let source = FakeSource::new(&[("main", b"archive-main")]);
        let outcome = rebuild_flagged(&store, &source, &AtomicBool::new(false));

        assert_eq!(outcome.rebuilt, 1);
        assert_eq!(outcome.failed, 1);

        let main = store.get(&branch("main")).unwrap();
        assert!(!main.changed);
        assert_eq!(main.snapshot.as_deref(), Some(&b"archive-main"[..]));

        let feature = store.get(&branch("feature")).unwrap();
        assert!(feature.changed);
        assert!(feature.snapshot.is_none());
    }

    /// Source that flags a newer commit for the branch while its snapshot
    /// is being built, reproducing a detection pass racing the builder.
    struct RacingSource<'a> {
        store: &'a BranchStore,
        newer: RemoteHead,
    }

    impl SnapshotSource for RacingSource<'_> {
        fn snapshot(&self, _name: &BranchName) -> Result<Vec<u8>, SyncError> {
            detect::apply(self.store, std::slice::from_ref(&self.newer));
            Ok(b"archive-mid-race".to_vec())
        }
    }

    #[test]
    fn newer_detection_during_build_is_not_erased() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("main", 100)]);

        let source = RacingSource {
            store: &store,
            newer: head("main", 200),
        };
        let outcome = rebuild_flagged(&store, &source, &AtomicBool::new(false));
        assert_eq!(outcome.rebuilt, 1);

        let state = store.get(&branch("main")).unwrap();
        assert!(state.changed, "newer change flag must survive the rebuild");
        assert_eq!(state.last_update, ts(200));
        assert_eq!(state.snapshot.as_deref(), Some(&b"archive-mid-race"[..]));
    }

    #[test]
    fn preset_shutdown_cancels_before_any_build() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("main", 100)]);

        let source = FakeSource::new(&[("main", b"archive-1")]);
        let outcome = rebuild_flagged(&store, &source, &AtomicBool::new(true));

        assert!(outcome.cancelled);
        assert_eq!(outcome.rebuilt, 0);

        let state = store.get(&branch("main")).unwrap();
        assert!(state.changed);
        assert!(state.snapshot.is_none());
    }

    /// Source that raises the shutdown flag as its first build starts.
    struct CancellingSource<'a> {
        shutdown: &'a AtomicBool,
    }

    impl SnapshotSource for CancellingSource<'_> {
        fn snapshot(&self, _name: &BranchName) -> Result<Vec<u8>, SyncError> {
            self.shutdown.store(true, Ordering::SeqCst);
            Ok(b"archive-last".to_vec())
        }
    }

    #[test]
    fn shutdown_is_observed_between_branches() {
        let store = BranchStore::new();
        detect::apply(&store, &[head("main", 100), head("dev", 200)]);

        let shutdown = AtomicBool::new(false);
        let source = CancellingSource {
            shutdown: &shutdown,
        };
        let outcome = rebuild_flagged(&store, &source, &shutdown);

        // The build in flight completes; the remaining branch is abandoned.
        assert!(outcome.cancelled);
        assert_eq!(outcome.rebuilt, 1);

        let built: Vec<_> = store
            .get_all()
            .into_iter()
            .filter(|state| state.snapshot.is_some())
            .collect();
        assert_eq!(built.len(), 1);
    }
}
