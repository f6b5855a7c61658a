//! Scheduler thread driving sync passes on a fixed interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};

use crate::daemon::worker::WorkerRequest;

/// Granularity of the shutdown check while waiting out the interval.
const SLEEP_STEP: Duration = Duration::from_millis(500);

/// Ticker that requests one pass from the worker per poll interval.
pub struct Scheduler {
    worker_tx: Sender<WorkerRequest>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        worker_tx: Sender<WorkerRequest>,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            worker_tx,
            interval,
            shutdown,
        }
    }

    /// Run the scheduler loop.
    pub fn run(self) {
        log::info!(
            "Scheduler thread started, polling every {:?}",
            self.interval
        );

        loop {
            // Sleep in small increments to notice shutdown promptly.
            let mut slept = Duration::ZERO;
            while slept < self.interval {
                if self.shutdown.load(Ordering::SeqCst) {
                    log::info!("Scheduler shutting down");
                    return;
                }
                let step = SLEEP_STEP.min(self.interval - slept);
                thread::sleep(step);
                slept += step;
            }

            if self.shutdown.load(Ordering::SeqCst) {
                log::info!("Scheduler shutting down");
                return;
            }

            log::debug!("Tick, requesting sync pass");
            match self.worker_tx.try_send(WorkerRequest::Pass) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::debug!("Previous pass still pending, skipping tick");
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::warn!("Worker channel closed, stopping scheduler");
                    return;
                }
            }
        }
    }
}

/// Handle for managing the scheduler thread.
pub struct SchedulerHandle {
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl SchedulerHandle {
    /// Spawn the scheduler thread.
    pub fn spawn(
        worker_tx: Sender<WorkerRequest>,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let scheduler = Scheduler::new(worker_tx, interval, shutdown.clone());

        let thread = thread::Builder::new()
            .name("repowatch-scheduler".to_string())
            .spawn(move || scheduler.run())
            .expect("failed to spawn scheduler thread");

        Self {
            thread: Some(thread),
            shutdown,
        }
    }

    /// Signal shutdown and wait for thread to exit.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
