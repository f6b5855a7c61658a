//! Local bare mirror of the watched repository, driven by libgit2.
//!
//! The mirror is the repository client adapter: it fetches `refs/heads/*`
//! from the remote, enumerates branch heads with their commit metadata, and
//! produces packaged snapshots of a branch's file tree. Everything network
//! facing goes through [`Mirror::fetch`]; reads are served from the local
//! object database.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::DateTime;
use git2::{BranchType, Cred, ErrorCode, FetchOptions, ObjectType, Oid, RemoteCallbacks, Repository, Tree};
use thiserror::Error;

use crate::archive::{self, PackageError};
use crate::sync::{RemoteHead, SnapshotSource, SyncError};
use crate::types::BranchName;

/// Refspec mirroring every remote branch into local `refs/heads/*`.
/// Deleted remote branches are not pruned; their refs simply stop moving.
const HEADS_REFSPEC: &str = "+refs/heads/*:refs/heads/*";

/// Errors returned by mirror operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// libgit2 reported an error.
    #[error("git operation failed: {0}")]
    Git(#[from] git2::Error),
    /// The branch has no ref in the mirror.
    #[error("branch not found: {0}")]
    BranchNotFound(String),
    /// Underlying IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bare local mirror of the watched remote repository.
pub struct Mirror {
    repo: Repository,
    token: Option<String>,
}

impl Mirror {
    /// Open the mirror at `path`, creating an empty bare repository wired
    /// to `url` if none exists yet. The remote URL is re-pointed on every
    /// open so a changed configuration takes effect without wiping the
    /// mirror directory.
    pub fn open_or_create(
        path: &Path,
        url: &str,
        token: Option<String>,
    ) -> Result<Self, GitError> {
        let repo = match Repository::open_bare(path) {
            Ok(repo) => {
                repo.remote_set_url("origin", url)?;
                repo
            }
            Err(err) if err.code() == ErrorCode::NotFound => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let repo = Repository::init_bare(path)?;
                repo.remote_with_fetch("origin", url, HEADS_REFSPEC)?;
                repo
            }
            Err(err) => return Err(GitError::Git(err)),
        };

        Ok(Self { repo, token })
    }

    /// Fetch every remote branch head into the mirror.
    ///
    /// The transfer aborts as soon as `shutdown` is observed set; callers
    /// should treat a fetch error with the flag raised as cancellation, not
    /// transport failure.
    pub fn fetch(&self, shutdown: &AtomicBool) -> Result<(), GitError> {
        let mut remote = self.repo.find_remote("origin")?;

        let mut callbacks = RemoteCallbacks::new();
        if let Some(token) = self.token.clone() {
            callbacks.credentials(move |_url, _username_from_url, _allowed| {
                Cred::userpass_plaintext("token", &token)
            });
        }
        callbacks.transfer_progress(|_progress| !shutdown.load(Ordering::SeqCst));

        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);

        remote.fetch(&[HEADS_REFSPEC], Some(&mut options), None)?;
        Ok(())
    }

    /// Enumerate the mirror's branch heads with their commit metadata.
    ///
    /// A branch whose head commit cannot be resolved, or whose name is not
    /// a valid [`BranchName`], is skipped with a warning; the rest of the
    /// listing still succeeds.
    pub fn branch_heads(&self) -> Result<Vec<RemoteHead>, GitError> {
        let mut heads = Vec::new();

        for branch in self.repo.branches(Some(BranchType::Local))? {
            let (branch, _) = match branch {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("skipping unreadable branch ref: {}", err);
                    continue;
                }
            };

            let name = match branch.name() {
                Ok(Some(name)) => name.to_string(),
                Ok(None) => {
                    log::warn!("skipping branch with non-utf8 name");
                    continue;
                }
                Err(err) => {
                    log::warn!("skipping branch with unreadable name: {}", err);
                    continue;
                }
            };

            let name: BranchName = match name.parse() {
                Ok(name) => name,
                Err(err) => {
                    log::warn!("skipping branch {:?}: {}", name, err);
                    continue;
                }
            };

            let commit = match branch.get().peel_to_commit() {
                Ok(commit) => commit,
                Err(err) => {
                    log::warn!("skipping branch {}: cannot resolve head commit: {}", name, err);
                    continue;
                }
            };

            let author = commit.author();
            let committed_at = DateTime::from_timestamp(author.when().seconds(), 0)
                .unwrap_or(DateTime::UNIX_EPOCH);

            heads.push(RemoteHead {
                name,
                committed_at,
                author_name: author.name().unwrap_or_default().to_string(),
                author_email: author.email().unwrap_or_default().to_string(),
            });
        }

        Ok(heads)
    }

    /// Resolve the tree of a branch's current head commit.
    fn branch_tree(&self, name: &BranchName) -> Result<Tree<'_>, GitError> {
        let refname = format!("refs/heads/{}", name);
        let reference = self.repo.find_reference(&refname).map_err(|err| {
            if err.code() == ErrorCode::NotFound {
                GitError::BranchNotFound(name.to_string())
            } else {
                GitError::Git(err)
            }
        })?;

        let commit = reference.peel_to_commit()?;
        Ok(commit.tree()?)
    }
}

impl SnapshotSource for Mirror {
    fn snapshot(&self, name: &BranchName) -> Result<Vec<u8>, SyncError> {
        let tree = self.branch_tree(name)?;
        let files = TreeFiles::new(&self.repo, tree);

        archive::package_tree(files).map_err(|err| match err {
            PackageError::Source(err) => SyncError::Transport(err),
            PackageError::Encoding(err) => SyncError::Encoding(err),
        })
    }
}

/// Lazy depth-first traversal of a commit tree, yielding one
/// `(path, contents)` pair per regular file.
///
/// The sequence is finite and single-pass; a fresh traversal is created for
/// every snapshot build, so no restart support is needed. Submodule entries
/// are skipped.
pub struct TreeFiles<'repo> {
    repo: &'repo Repository,
    stack: Vec<Frame<'repo>>,
}

struct Frame<'repo> {
    prefix: String,
    tree: Tree<'repo>,
    next: usize,
}

enum Step {
    Pop,
    Descend { path: String, id: Oid },
    File { path: String, id: Oid },
    Skip,
}

impl<'repo> TreeFiles<'repo> {
    fn new(repo: &'repo Repository, root: Tree<'repo>) -> Self {
        Self {
            repo,
            stack: vec![Frame {
                prefix: String::new(),
                tree: root,
                next: 0,
            }],
        }
    }
}

impl Iterator for TreeFiles<'_> {
    type Item = Result<(String, Vec<u8>), GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Entries borrow the frame's tree, so pull out owned ids before
            // touching the stack again.
            let step = {
                let frame = self.stack.last_mut()?;
                match frame.tree.get(frame.next) {
                    None => Step::Pop,
                    Some(entry) => {
                        frame.next += 1;
                        let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
                        let path = if frame.prefix.is_empty() {
                            name
                        } else {
                            format!("{}/{}", frame.prefix, name)
                        };
                        match entry.kind() {
                            Some(ObjectType::Tree) => Step::Descend {
                                path,
                                id: entry.id(),
                            },
                            Some(ObjectType::Blob) => Step::File {
                                path,
                                id: entry.id(),
                            },
                            _ => Step::Skip,
                        }
                    }
                }
            };

            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Descend { path, id } => match self.repo.find_tree(id) {
                    Ok(tree) => self.stack.push(Frame {
                        prefix: path,
                        tree,
                        next: 0,
                    }),
                    Err(err) => return Some(Err(GitError::Git(err))),
                },
                Step::File { path, id } => {
                    return Some(match self.repo.find_blob(id) {
                        Ok(blob) => Ok((path, blob.content().to_vec())),
                        Err(err) => Err(GitError::Git(err)),
                    });
                }
                Step::Skip => {}
            }
        }
    }
}
