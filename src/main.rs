pub mod archive;
pub mod daemon;
pub mod git;
pub mod server;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testutil;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::daemon::Config;

#[derive(Parser)]
#[command(
    name = "repowatch",
    about = "Watch a remote git repository and serve branch snapshots over HTTP"
)]
struct Cli {
    /// URL of the repository to watch
    #[arg(long)]
    repo_url: String,

    /// Token used to authenticate against the remote
    #[arg(long)]
    auth_token: Option<String>,

    /// Directory for the bare mirror (defaults to the user cache dir)
    #[arg(long)]
    mirror_dir: Option<PathBuf>,

    /// Host for the HTTP server to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port for the HTTP server to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Seconds between sync passes
    #[arg(long, default_value_t = 300)]
    poll_interval: u64,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let config = Config {
        repo_url: cli.repo_url,
        auth_token: cli.auth_token,
        mirror_dir: cli.mirror_dir.unwrap_or_else(default_mirror_dir),
        host: cli.host,
        port: cli.port,
        poll_interval: Duration::from_secs(cli.poll_interval),
    };

    if let Err(e) = daemon::run(config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn default_mirror_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("repowatch")
        .join("mirror.git")
}
