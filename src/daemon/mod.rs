//! Daemon wiring: mirror bootstrap, worker and scheduler threads, HTTP
//! server, and signal handling.

mod scheduler;
mod worker;

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::git::{GitError, Mirror};
use crate::server::HttpServerHandle;
use crate::store::BranchStore;

pub use scheduler::SchedulerHandle;
pub use worker::{WorkerHandle, WorkerRequest};

/// Runtime configuration, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the repository to watch.
    pub repo_url: String,
    /// Token for authenticating against the remote, if any.
    pub auth_token: Option<String>,
    /// Directory holding the bare mirror.
    pub mirror_dir: PathBuf,
    /// Host for the HTTP server to bind.
    pub host: String,
    /// Port for the HTTP server to bind.
    pub port: u16,
    /// Time between sync passes.
    pub poll_interval: Duration,
}

impl Config {
    fn listen_addr(&self) -> Result<SocketAddr, DaemonError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| DaemonError::ListenAddr(format!("{}:{}", self.host, self.port)))
    }
}

/// Errors that abort daemon startup.
#[derive(Error, Debug)]
pub enum DaemonError {
    /// The mirror could not be created or the initial fetch failed.
    #[error("failed to prepare mirror: {0}")]
    Mirror(#[from] GitError),
    /// The configured host/port did not resolve to a bindable address.
    #[error("invalid listen address: {0}")]
    ListenAddr(String),
    /// The HTTP listener could not be bound.
    #[error("failed to start HTTP server: {0}")]
    Http(#[from] std::io::Error),
    /// The interrupt handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Run the daemon until an interrupt is received.
///
/// The initial connect (mirror creation and first fetch) is fatal; every
/// later failure is logged and retried on the next poll tick.
pub fn run(config: Config) -> Result<(), DaemonError> {
    let addr = config.listen_addr()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            log::info!("Received interrupt, shutting down");
            shutdown.store(true, Ordering::SeqCst);
        })?;
    }

    log::info!(
        "Mirroring {} into {}",
        config.repo_url,
        config.mirror_dir.display()
    );
    let mirror = Mirror::open_or_create(
        &config.mirror_dir,
        &config.repo_url,
        config.auth_token.clone(),
    )?;
    mirror.fetch(&shutdown)?;

    let store = Arc::new(BranchStore::new());

    let mut server = HttpServerHandle::spawn(Arc::clone(&store), addr)?;
    let mut worker = WorkerHandle::spawn(mirror, Arc::clone(&store), Arc::clone(&shutdown));

    // Populate the store before the first tick fires.
    worker.request_pass();

    let mut scheduler =
        SchedulerHandle::spawn(worker.sender(), config.poll_interval, Arc::clone(&shutdown));

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    scheduler.shutdown();
    worker.shutdown();
    server.shutdown();

    log::info!("Daemon stopped");
    Ok(())
}
