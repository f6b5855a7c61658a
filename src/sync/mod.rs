//! Change detection and snapshot cache maintenance.
//!
//! A pass is one fetch of the remote followed by detection and rebuild:
//! [`detect::apply`] reconciles the observed branch heads into the store,
//! then [`builder::rebuild_flagged`] regenerates snapshots for every entry
//! the detector flagged. Passes are driven by the daemon's worker thread.

pub mod builder;
pub mod detect;

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::git::{GitError, Mirror};
use crate::store::BranchStore;

pub use builder::{BuildOutcome, SnapshotSource};

/// One observed remote branch head.
#[derive(Debug, Clone)]
pub struct RemoteHead {
    pub name: crate::types::BranchName,
    /// Author timestamp of the head commit, the sole change signal.
    pub committed_at: DateTime<Utc>,
    pub author_name: String,
    pub author_email: String,
}

/// Errors surfaced by a sync pass.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote listing or fetch failed.
    #[error("transport error: {0}")]
    Transport(#[from] GitError),
    /// Archive packaging failed.
    #[error("archive packaging failed: {0}")]
    Encoding(#[source] std::io::Error),
    /// The pass was abandoned because shutdown was requested.
    #[error("pass cancelled")]
    Cancelled,
}

/// Counters describing a completed pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Branch heads observed in the remote listing.
    pub observed: usize,
    /// Branches the detector flagged as changed.
    pub flagged: usize,
    /// Rebuild results for flagged branches.
    pub build: BuildOutcome,
}

/// Run one full pass: fetch, detect, rebuild.
///
/// A fetch failure aborts the pass and is retried on the next tick;
/// per-branch failures inside detection and rebuild are contained there.
pub fn run_pass(
    mirror: &Mirror,
    store: &BranchStore,
    shutdown: &AtomicBool,
) -> Result<PassOutcome, SyncError> {
    if shutdown.load(Ordering::SeqCst) {
        return Err(SyncError::Cancelled);
    }

    if let Err(err) = mirror.fetch(shutdown) {
        // A fetch aborted by the shutdown flag surfaces as a git error;
        // report it as cancellation rather than transport failure.
        if shutdown.load(Ordering::SeqCst) {
            return Err(SyncError::Cancelled);
        }
        return Err(err.into());
    }

    let heads = mirror.branch_heads()?;
    let flagged = detect::apply(store, &heads);
    let build = builder::rebuild_flagged(store, mirror, shutdown);

    if build.cancelled {
        return Err(SyncError::Cancelled);
    }

    Ok(PassOutcome {
        observed: heads.len(),
        flagged: flagged.len(),
        build,
    })
}
