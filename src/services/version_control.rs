use std::path::Path;

use async_trait::async_trait;

use crate::domain::branch::BranchName;
use crate::domain::message::{CommitId, CommitMessage};
use crate::error::AppResult;

/// Version-control primitives for one working tree.
///
/// Implementations are only constructed for paths already known to be inside
/// a working tree.
#[async_trait]
pub trait VersionControlService: Send + Sync {
    /// Absolute top-level directory of the working tree.
    fn root(&self) -> &Path;

    /// Short name of the checked-out branch. Fails with `DetachedHead` when
    /// HEAD does not point at a branch.
    async fn current_branch(&self) -> AppResult<BranchName>;

    /// Paths with uncommitted changes (index, working tree and untracked),
    /// sorted lexicographically.
    async fn changed_files(&self) -> AppResult<Vec<String>>;

    /// Textual diff of one path against the last commit. Unchanged paths
    /// yield an empty string.
    async fn diff(&self, path: &str) -> AppResult<String>;

    /// Stages everything and records a commit.
    async fn commit(&self, message: &CommitMessage) -> AppResult<CommitId>;

    /// `None` before the first commit.
    async fn head_commit(&self) -> AppResult<Option<CommitId>>;
}
