//! Background worker thread that executes sync passes.
//!
//! Passes run serially on one thread that owns the mirror, so git
//! operations never block the HTTP read path.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::git::Mirror;
use crate::store::BranchStore;
use crate::sync::{self, SyncError};

/// Requests the worker can handle.
pub enum WorkerRequest {
    /// Run one sync pass (fetch, detect, rebuild).
    Pass,

    /// Shutdown the worker.
    Shutdown,
}

/// Background worker that processes sync passes.
pub struct Worker {
    receiver: Receiver<WorkerRequest>,
    mirror: Mirror,
    store: Arc<BranchStore>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    /// Create a new worker with the given receiver and collaborators.
    pub fn new(
        receiver: Receiver<WorkerRequest>,
        mirror: Mirror,
        store: Arc<BranchStore>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            receiver,
            mirror,
            store,
            shutdown,
        }
    }

    /// Run the worker loop (blocks until Shutdown).
    pub fn run(self) {
        log::info!("Worker thread started");

        loop {
            match self.receiver.recv() {
                Ok(WorkerRequest::Pass) => {
                    log::debug!("Starting sync pass");
                    match sync::run_pass(&self.mirror, &self.store, &self.shutdown) {
                        Ok(outcome) => log::info!(
                            "Pass complete: {} branches observed, {} flagged, {} rebuilt, {} failed",
                            outcome.observed,
                            outcome.flagged,
                            outcome.build.rebuilt,
                            outcome.build.failed,
                        ),
                        Err(SyncError::Cancelled) => {
                            log::info!("Pass cancelled by shutdown");
                        }
                        Err(err) => {
                            log::error!("Sync pass failed, retrying next tick: {}", err);
                        }
                    }
                }
                Ok(WorkerRequest::Shutdown) => {
                    log::info!("Worker thread shutting down");
                    break;
                }
                Err(_) => {
                    // Channel closed, exit
                    log::info!("Worker channel closed, exiting");
                    break;
                }
            }
        }
    }
}

/// Handle for managing the worker thread from the daemon.
pub struct WorkerHandle {
    sender: Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn the worker thread.
    pub fn spawn(mirror: Mirror, store: Arc<BranchStore>, shutdown: Arc<AtomicBool>) -> Self {
        // One slot: a tick arriving while a pass is queued adds nothing.
        let (sender, receiver) = bounded(1);

        let worker = Worker::new(receiver, mirror, store, shutdown);
        let thread = thread::Builder::new()
            .name("repowatch-worker".to_string())
            .spawn(move || worker.run())
            .expect("failed to spawn worker thread");

        Self {
            sender,
            thread: Some(thread),
        }
    }

    /// Get a clone of the sender for submitting work.
    pub fn sender(&self) -> Sender<WorkerRequest> {
        self.sender.clone()
    }

    /// Request a sync pass; ticks arriving while one is queued are coalesced.
    pub fn request_pass(&self) {
        match self.sender.try_send(WorkerRequest::Pass) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::debug!("A pass is already queued, skipping tick");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Worker channel closed, dropping pass request");
            }
        }
    }

    /// Shutdown the worker.
    pub fn shutdown(&mut self) {
        let _ = self.sender.send(WorkerRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
