//! Test helpers for building scratch git repositories with the system git.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A throwaway git repository with a working tree, used as the "remote" in
/// mirror tests. The temp directory is kept alive for the repo's lifetime.
pub struct ScratchRepo {
    _tmp: TempDir,
    path: PathBuf,
}

impl ScratchRepo {
    /// Create an empty repository on branch `main` with test author config.
    pub fn init() -> Self {
        let tmp = TempDir::new().expect("failed to create temp dir");
        let path = tmp.path().to_path_buf();

        run_git(&path, &["init", "-b", "main"], None);
        run_git(&path, &["config", "user.name", "Test User"], None);
        run_git(&path, &["config", "user.email", "test@example.com"], None);
        run_git(&path, &["config", "commit.gpgsign", "false"], None);

        Self { _tmp: tmp, path }
    }

    /// Repository path usable as a fetch URL (local transport).
    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    /// Run a git command in the repository, asserting success.
    pub fn git(&self, args: &[&str]) {
        run_git(&self.path, args, None);
    }

    /// Write a file relative to the working tree, creating parent dirs.
    pub fn write_file(&self, rel: &str, contents: &str) {
        let path = self.path.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        std::fs::write(path, contents).expect("failed to write file");
    }

    /// Stage everything and commit with a fixed author/committer date
    /// (`secs` is a Unix timestamp), so tests control the change signal.
    pub fn commit_all(&self, message: &str, secs: i64) {
        run_git(&self.path, &["add", "-A"], None);
        let date = format!("@{} +0000", secs);
        run_git(&self.path, &["commit", "-m", message], Some(&date));
    }
}

fn run_git(dir: &Path, args: &[&str], date: Option<&str>) {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(dir).args(args);
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    if let Some(date) = date {
        cmd.env("GIT_AUTHOR_DATE", date);
        cmd.env("GIT_COMMITTER_DATE", date);
    }

    let output = cmd.output().expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Unpack a gzip'd tar payload into `(path, contents)` pairs.
pub fn unpack_archive(payload: &[u8]) -> Vec<(String, String)> {
    let decoder = flate2::read::GzDecoder::new(payload);
    let mut archive = tar::Archive::new(decoder);
    archive
        .entries()
        .expect("failed to read archive entries")
        .map(|entry| {
            let mut entry = entry.expect("failed to read archive entry");
            let path = entry
                .path()
                .expect("archive entry has no path")
                .to_string_lossy()
                .into_owned();
            let mut contents = String::new();
            entry
                .read_to_string(&mut contents)
                .expect("failed to read entry contents");
            (path, contents)
        })
        .collect()
}
