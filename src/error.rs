use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not a git working tree: {}", .0.display())]
    NotARepository(PathBuf),
    #[error("no repository is open")]
    NoRepository,
    #[error("HEAD is detached; check out a branch first")]
    DetachedHead,
    #[error("version control error: {0}")]
    VersionControl(String),
    #[error("nothing to commit (working tree clean)")]
    NothingToCommit,
    #[error("commit failed: {0}")]
    Commit(String),
    #[error("no API key configured; run `aicommit config init` or set AICOMMIT_API_KEY")]
    MissingCredential,
    #[error("language model request failed: {0}")]
    Transport(String),
    #[error("language model returned an unusable response: {0}")]
    MalformedResponse(String),
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
