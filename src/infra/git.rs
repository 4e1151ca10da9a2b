use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::branch::BranchName;
use crate::domain::message::{CommitId, CommitMessage, SUMMARY_SOFT_LIMIT};
use crate::error::{AppError, AppResult};
use crate::services::VersionControlService;

const BINARY_PLACEHOLDER: &str = "[binary file, content not shown]";
const SPECIAL_PLACEHOLDER: &str = "[not a regular file, content not shown]";

/// Untracked files larger than this are summarized instead of read.
pub const DEFAULT_UNTRACKED_LIMIT: u64 = 16 * 1024;

/// Version control backed by the `git` executable.
pub struct GitCli {
    root: PathBuf,
    timeout: Option<Duration>,
    untracked_limit: u64,
}

struct GitOutput {
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

impl GitCli {
    /// Opens the working tree containing `path`.
    ///
    /// Validity is checked before anything else is read, so every other
    /// method can assume a usable repository.
    pub async fn open(path: impl AsRef<Path>, timeout: Option<Duration>) -> AppResult<Self> {
        let path = path.as_ref();

        let probe = run_git(path, &["rev-parse", "--is-inside-work-tree"], timeout).await?;
        if !probe.success() || probe.stdout.trim() != "true" {
            debug!(path = %path.display(), detail = %probe.failure_detail(), "not a working tree");
            return Err(AppError::NotARepository(path.to_path_buf()));
        }

        let toplevel = run_git(path, &["rev-parse", "--show-toplevel"], timeout).await?;
        if !toplevel.success() {
            return Err(AppError::VersionControl(format!(
                "failed to resolve repository root: {}",
                toplevel.failure_detail()
            )));
        }

        let root = PathBuf::from(toplevel.stdout.trim());
        info!(root = %root.display(), "opened repository");
        Ok(Self {
            root,
            timeout,
            untracked_limit: DEFAULT_UNTRACKED_LIMIT,
        })
    }

    /// Caps how many bytes of an untracked file are read to synthesize its diff.
    pub fn with_untracked_limit(mut self, bytes: u64) -> Self {
        self.untracked_limit = bytes;
        self
    }

    async fn git(&self, args: &[&str]) -> AppResult<GitOutput> {
        run_git(&self.root, args, self.timeout).await
    }

    /// Runs git and returns stdout, failing on any non-zero exit.
    async fn git_stdout(&self, args: &[&str], operation: &str) -> AppResult<String> {
        let output = self.git(args).await?;
        if !output.success() {
            return Err(AppError::VersionControl(format!(
                "{operation} failed: {}",
                output.failure_detail()
            )));
        }
        Ok(output.stdout)
    }

    async fn is_untracked(&self, path: &str) -> AppResult<bool> {
        let listed = self
            .git_stdout(
                &["ls-files", "--others", "--exclude-standard", "-z", "--", path],
                "list untracked files",
            )
            .await?;
        Ok(listed.split('\0').any(|entry| entry == path))
    }

    async fn has_staged_changes(&self) -> AppResult<bool> {
        // --quiet exits 1 when the index differs from HEAD.
        let pending = self.git(&["diff", "--cached", "--quiet"]).await?;
        match pending.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(AppError::Commit(format!(
                "failed to inspect staged changes: {}",
                pending.failure_detail()
            ))),
        }
    }

    async fn untracked_diff(&self, path: &str) -> AppResult<String> {
        let full = self.root.join(path);
        let metadata = match tokio::fs::symlink_metadata(&full).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(String::new()),
            Err(err) => return Err(AppError::Io(err)),
        };

        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            let target = tokio::fs::read_link(&full).await?;
            return Ok(render_new_symlink(path, &target.to_string_lossy()));
        }
        if !file_type.is_file() {
            return Ok(render_placeholder(path, SPECIAL_PLACEHOLDER));
        }
        if metadata.len() > self.untracked_limit {
            debug!(path, bytes = metadata.len(), "untracked file too large to inline");
            return Ok(render_placeholder(
                path,
                &format!("[file too large, {} bytes, content not shown]", metadata.len()),
            ));
        }

        let bytes = match tokio::fs::read(&full).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(String::new()),
            Err(err) => return Err(AppError::Io(err)),
        };
        Ok(render_new_file(path, &bytes))
    }
}

#[async_trait]
impl VersionControlService for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn current_branch(&self) -> AppResult<BranchName> {
        let output = self.git(&["symbolic-ref", "-q", "--short", "HEAD"]).await?;
        match output.code {
            Some(0) => BranchName::from_symbolic_ref(&output.stdout).ok_or_else(|| {
                AppError::VersionControl("git reported an empty branch name".to_string())
            }),
            Some(1) => Err(AppError::DetachedHead),
            _ => Err(AppError::VersionControl(format!(
                "failed to resolve HEAD: {}",
                output.failure_detail()
            ))),
        }
    }

    async fn changed_files(&self) -> AppResult<Vec<String>> {
        let status = self
            .git_stdout(
                &["status", "--porcelain=v1", "-z", "--untracked-files=all"],
                "read status",
            )
            .await?;
        Ok(parse_porcelain_status(&status))
    }

    async fn diff(&self, path: &str) -> AppResult<String> {
        let tracked = if self.head_commit().await?.is_some() {
            self.git_stdout(&["diff", "HEAD", "--", path], "diff").await?
        } else {
            let staged = self
                .git_stdout(&["diff", "--cached", "--", path], "diff staged")
                .await?;
            let unstaged = self.git_stdout(&["diff", "--", path], "diff").await?;
            staged + &unstaged
        };

        if !tracked.trim().is_empty() {
            return Ok(tracked);
        }
        if self.is_untracked(path).await? {
            return self.untracked_diff(path).await;
        }
        Ok(String::new())
    }

    async fn commit(&self, message: &CommitMessage) -> AppResult<CommitId> {
        if message.summary.is_empty() {
            return Err(AppError::Commit("commit summary must not be empty".to_string()));
        }
        if message.summary_exceeds_limit() {
            warn!(
                length = message.summary.chars().count(),
                limit = SUMMARY_SOFT_LIMIT,
                "commit summary is longer than the conventional title length"
            );
        }

        // A deliberately staged index is committed as-is; otherwise stage all.
        if !self.has_staged_changes().await? {
            let staged = self.git(&["add", "-A"]).await?;
            if !staged.success() {
                return Err(AppError::Commit(format!(
                    "failed to stage changes: {}",
                    staged.failure_detail()
                )));
            }
            if !self.has_staged_changes().await? {
                return Err(AppError::NothingToCommit);
            }
        }

        let text = message.format();
        let committed = self.git(&["commit", "-q", "-m", &text]).await?;
        if !committed.success() {
            return Err(AppError::Commit(committed.failure_detail()));
        }

        let head = self
            .head_commit()
            .await?
            .ok_or_else(|| AppError::Commit("HEAD is missing after commit".to_string()))?;
        info!(commit = %head.short(), summary = %message.summary, "created commit");
        Ok(head)
    }

    async fn head_commit(&self) -> AppResult<Option<CommitId>> {
        let output = self.git(&["rev-parse", "--verify", "-q", "HEAD"]).await?;
        match output.code {
            Some(0) => Ok(Some(CommitId(output.stdout.trim().to_string()))),
            Some(1) => Ok(None),
            _ => Err(AppError::VersionControl(format!(
                "failed to resolve HEAD: {}",
                output.failure_detail()
            ))),
        }
    }
}

async fn run_git(dir: &Path, args: &[&str], timeout: Option<Duration>) -> AppResult<GitOutput> {
    debug!(dir = %dir.display(), "git {}", args.join(" "));

    let mut command = Command::new("git");
    command
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_LITERAL_PATHSPECS", "1")
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| AppError::Timeout {
                operation: format!("git {}", args.first().copied().unwrap_or_default()),
                seconds: limit.as_secs(),
            })?,
        None => command.output().await,
    }
    .map_err(|err| match err.kind() {
        ErrorKind::NotFound => {
            AppError::VersionControl("git executable not found on PATH".to_string())
        }
        _ => AppError::VersionControl(format!("failed to run git: {err}")),
    })?;

    Ok(GitOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Extracts paths from `git status --porcelain=v1 -z`.
///
/// Rename and copy records carry the original path as an extra NUL-separated
/// field; only the new path is reported.
fn parse_porcelain_status(output: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut records = output.split('\0');

    while let Some(record) = records.next() {
        let (Some(code), Some(path)) = (record.get(..2), record.get(3..)) else {
            continue;
        };
        if code.contains(['R', 'C']) {
            records.next();
        }
        if !path.is_empty() {
            files.push(path.to_string());
        }
    }

    files.sort();
    files.dedup();
    files
}

fn render_placeholder(path: &str, placeholder: &str) -> String {
    format!("New file: {path}\n\n{placeholder}\n")
}

/// Git stores a symlink as its target path, so that is the added content.
fn render_new_symlink(path: &str, target: &str) -> String {
    format!("New symlink: {path}\n\n+{target}\n")
}

fn render_new_file(path: &str, bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) if !text.contains('\0') => text,
        _ => return render_placeholder(path, BINARY_PLACEHOLDER),
    };

    let mut rendered = format!("New file: {path}\n\n");
    for line in text.lines() {
        rendered.push('+');
        rendered.push_str(line);
        rendered.push('\n');
    }
    rendered
}
