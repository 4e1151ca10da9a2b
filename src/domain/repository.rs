use std::path::{Path, PathBuf};

use crate::domain::branch::BranchName;

/// One working tree opened by a session.
///
/// The branch is whatever was resolved last; it is not invalidated when the
/// checkout changes outside this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    path: PathBuf,
    branch: Option<BranchName>,
}

impl Repository {
    pub fn new(path: PathBuf, branch: Option<BranchName>) -> Self {
        Self { path, branch }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when HEAD was detached at the last lookup.
    pub fn branch(&self) -> Option<&BranchName> {
        self.branch.as_ref()
    }

    pub fn set_branch(&mut self, branch: Option<BranchName>) {
        self.branch = branch;
    }

    pub fn branch_label(&self) -> &str {
        self.branch
            .as_ref()
            .map(BranchName::as_str)
            .unwrap_or("(detached HEAD)")
    }
}
