use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::domain::branch::BranchName;
use crate::domain::change::ChangeSet;
use crate::domain::message::{CommitId, CommitMessage, SUMMARY_SOFT_LIMIT};
use crate::domain::repository::Repository;
use crate::error::{AppError, AppResult};
use crate::infra::git::GitCli;
use crate::services::{LanguageModelService, VersionControlService};

/// A generated message together with the change set it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub message: CommitMessage,
    fingerprint: String,
}

impl Draft {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub repository: Repository,
    pub changed_files: Vec<String>,
    /// The working tree no longer matches what the current draft was generated from.
    pub draft_is_stale: bool,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub commit: CommitId,
    pub branch: Option<BranchName>,
    pub message: CommitMessage,
}

struct Workspace {
    client: Arc<dyn VersionControlService>,
    repository: Repository,
    changed_files: Vec<String>,
    draft: Option<Draft>,
}

/// Drives one user action at a time against one open repository.
///
/// Every method takes `&mut self`, so a front end that owns the session
/// serializes actions without extra locking. A failed call leaves the
/// previously observed repository, file list and draft in place.
pub struct CommitSession {
    language_model: Arc<dyn LanguageModelService>,
    git_timeout: Option<Duration>,
    untracked_limit: u64,
    workspace: Option<Workspace>,
}

impl CommitSession {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            language_model: Arc::clone(&ctx.language_model),
            git_timeout: ctx.config.git_timeout,
            // Upper bound on the bytes behind max_diff_chars characters.
            untracked_limit: (ctx.config.max_diff_chars as u64).saturating_mul(4),
            workspace: None,
        }
    }

    pub async fn open_repository(&mut self, path: impl AsRef<Path>) -> AppResult<&Repository> {
        let client = GitCli::open(path, self.git_timeout)
            .await?
            .with_untracked_limit(self.untracked_limit);
        self.attach(Arc::new(client)).await
    }

    /// Switches the session to an already opened repository client. Any
    /// draft belonging to the previous repository is discarded.
    pub async fn attach(&mut self, client: Arc<dyn VersionControlService>) -> AppResult<&Repository> {
        let branch = resolve_branch(client.as_ref()).await?;
        let changed_files = client.changed_files().await?;
        let repository = Repository::new(client.root().to_path_buf(), branch);

        debug!(
            root = %repository.path().display(),
            branch = repository.branch_label(),
            changed = changed_files.len(),
            "attached repository"
        );

        let workspace = self.workspace.insert(Workspace {
            client,
            repository,
            changed_files,
            draft: None,
        });
        Ok(&workspace.repository)
    }

    pub fn repository(&self) -> Option<&Repository> {
        self.workspace.as_ref().map(|workspace| &workspace.repository)
    }

    /// Changed files as of the last open, refresh, generation or commit.
    pub fn changed_files(&self) -> &[String] {
        self.workspace
            .as_ref()
            .map(|workspace| workspace.changed_files.as_slice())
            .unwrap_or_default()
    }

    pub fn draft(&self) -> Option<&Draft> {
        self.workspace
            .as_ref()
            .and_then(|workspace| workspace.draft.as_ref())
    }

    pub async fn refresh_state(&mut self) -> AppResult<SessionState> {
        let workspace = self.workspace.as_mut().ok_or(AppError::NoRepository)?;
        let client = workspace.client.as_ref();

        let branch = resolve_branch(client).await?;
        let changed_files = client.changed_files().await?;
        let draft_is_stale = match &workspace.draft {
            Some(draft) => {
                let current = collect_change_set(client, changed_files.clone()).await?;
                current.fingerprint() != draft.fingerprint
            }
            None => false,
        };

        workspace.repository.set_branch(branch);
        workspace.changed_files = changed_files;

        Ok(SessionState {
            repository: workspace.repository.clone(),
            changed_files: workspace.changed_files.clone(),
            draft_is_stale,
        })
    }

    /// Reads the current changed files and their diffs.
    pub async fn collect_changes(&self) -> AppResult<ChangeSet> {
        let workspace = self.workspace.as_ref().ok_or(AppError::NoRepository)?;
        let client = workspace.client.as_ref();
        let files = client.changed_files().await?;
        collect_change_set(client, files).await
    }

    /// Drafts a message for the current changes. On failure the previous
    /// draft is kept.
    pub async fn generate_commit_message(&mut self) -> AppResult<&Draft> {
        let workspace = self.workspace.as_mut().ok_or(AppError::NoRepository)?;
        let client = workspace.client.as_ref();

        let files = client.changed_files().await?;
        let changes = collect_change_set(client, files).await?;
        workspace.changed_files = changes.files().to_vec();

        if changes.is_empty() {
            return Err(AppError::NothingToCommit);
        }

        let message = self.language_model.draft_commit_message(&changes).await?;
        if message.summary_exceeds_limit() {
            warn!(
                length = message.summary.chars().count(),
                limit = SUMMARY_SOFT_LIMIT,
                "generated summary is longer than the conventional title length"
            );
        }
        info!(files = changes.len(), summary = %message.summary, "generated commit message");

        Ok(workspace.draft.insert(Draft {
            message,
            fingerprint: changes.fingerprint(),
        }))
    }

    pub async fn commit(&mut self, summary: &str, description: &str) -> AppResult<CommitOutcome> {
        let workspace = self.workspace.as_mut().ok_or(AppError::NoRepository)?;
        let message = CommitMessage::new(summary, description);

        let commit = workspace.client.commit(&message).await?;
        workspace.draft = None;

        match workspace.client.changed_files().await {
            Ok(files) => workspace.changed_files = files,
            Err(err) => warn!("failed to refresh changed files after commit: {err}"),
        }

        Ok(CommitOutcome {
            commit,
            branch: workspace.repository.branch().cloned(),
            message,
        })
    }
}

async fn resolve_branch(client: &dyn VersionControlService) -> AppResult<Option<BranchName>> {
    match client.current_branch().await {
        Ok(branch) => Ok(Some(branch)),
        Err(AppError::DetachedHead) => {
            info!(root = %client.root().display(), "HEAD is detached");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

async fn collect_change_set(
    client: &dyn VersionControlService,
    files: Vec<String>,
) -> AppResult<ChangeSet> {
    let mut diffs = BTreeMap::new();
    for path in &files {
        diffs.insert(path.clone(), client.diff(path).await?);
    }
    Ok(ChangeSet::new(files, diffs))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::fs;
    use std::path::PathBuf;
    use std::process::Command as StdCommand;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use mockito::Server;
    use serde_json::json;

    use crate::config::{AppConfig, StoredConfig};
    use crate::infra::llm::ChatCompletionClient;

    #[derive(Default)]
    struct FakeRepoState {
        branch: Option<String>,
        files: BTreeMap<String, String>,
        commits: Vec<CommitMessage>,
    }

    struct FakeRepository {
        root: PathBuf,
        state: Mutex<FakeRepoState>,
    }

    impl FakeRepository {
        fn new(branch: Option<&str>, files: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                root: PathBuf::from("/fake/repo"),
                state: Mutex::new(FakeRepoState {
                    branch: branch.map(str::to_string),
                    files: files
                        .iter()
                        .map(|(path, diff)| (path.to_string(), diff.to_string()))
                        .collect(),
                    commits: Vec::new(),
                }),
            })
        }

        fn edit(&self, path: &str, diff: &str) {
            let mut state = self.state.lock().unwrap();
            state.files.insert(path.to_string(), diff.to_string());
        }

        fn discard_all(&self) {
            self.state.lock().unwrap().files.clear();
        }

        fn commits(&self) -> Vec<CommitMessage> {
            self.state.lock().unwrap().commits.clone()
        }
    }

    #[async_trait]
    impl VersionControlService for FakeRepository {
        fn root(&self) -> &Path {
            &self.root
        }

        async fn current_branch(&self) -> AppResult<BranchName> {
            let state = self.state.lock().unwrap();
            state
                .branch
                .clone()
                .map(BranchName)
                .ok_or(AppError::DetachedHead)
        }

        async fn changed_files(&self) -> AppResult<Vec<String>> {
            Ok(self.state.lock().unwrap().files.keys().cloned().collect())
        }

        async fn diff(&self, path: &str) -> AppResult<String> {
            let state = self.state.lock().unwrap();
            Ok(state.files.get(path).cloned().unwrap_or_default())
        }

        async fn commit(&self, message: &CommitMessage) -> AppResult<CommitId> {
            let mut state = self.state.lock().unwrap();
            if state.files.is_empty() {
                return Err(AppError::NothingToCommit);
            }
            state.files.clear();
            state.commits.push(message.clone());
            Ok(CommitId(format!("{:040x}", state.commits.len())))
        }

        async fn head_commit(&self) -> AppResult<Option<CommitId>> {
            let state = self.state.lock().unwrap();
            Ok((!state.commits.is_empty()).then(|| CommitId(format!("{:040x}", state.commits.len()))))
        }
    }

    struct FakeModel {
        replies: Mutex<VecDeque<AppResult<CommitMessage>>>,
        seen: Mutex<Vec<ChangeSet>>,
    }

    impl FakeModel {
        fn new(replies: Vec<AppResult<CommitMessage>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModelService for FakeModel {
        async fn draft_commit_message(&self, changes: &ChangeSet) -> AppResult<CommitMessage> {
            self.seen.lock().unwrap().push(changes.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AppError::Transport("no scripted reply".to_string())))
        }

        async fn check_connection(&self) -> AppResult<String> {
            Ok("Hi".to_string())
        }
    }

    fn config() -> AppConfig {
        AppConfig::from_lookup(StoredConfig::default(), Path::new("."), |_| None)
    }

    fn session_with(model: Arc<FakeModel>) -> CommitSession {
        CommitSession::new(&AppContext::new(config(), model))
    }

    #[tokio::test]
    async fn requires_open_repository() {
        let mut session = session_with(FakeModel::new(vec![]));

        assert!(session.repository().is_none());
        assert!(session.changed_files().is_empty());
        assert!(matches!(
            session.refresh_state().await,
            Err(AppError::NoRepository)
        ));
        assert!(matches!(
            session.generate_commit_message().await,
            Err(AppError::NoRepository)
        ));
        assert!(matches!(
            session.commit("fix: x", "").await,
            Err(AppError::NoRepository)
        ));
    }

    #[tokio::test]
    async fn attach_resolves_branch_and_files() {
        let repo = FakeRepository::new(Some("main"), &[("b.rs", "+b"), ("a.rs", "+a")]);
        let mut session = session_with(FakeModel::new(vec![]));

        let repository = session.attach(repo).await.unwrap();
        assert_eq!(repository.branch().map(BranchName::as_str), Some("main"));
        assert_eq!(session.changed_files(), ["a.rs", "b.rs"]);
    }

    #[tokio::test]
    async fn detached_head_is_not_fatal_on_attach() {
        let repo = FakeRepository::new(None, &[]);
        let mut session = session_with(FakeModel::new(vec![]));

        let repository = session.attach(repo).await.unwrap();
        assert!(repository.branch().is_none());
        assert_eq!(repository.branch_label(), "(detached HEAD)");
    }

    #[tokio::test]
    async fn generate_without_changes_skips_model() {
        let model = FakeModel::new(vec![Ok(CommitMessage::new("unused", ""))]);
        let mut session = session_with(model.clone());
        session.attach(FakeRepository::new(Some("main"), &[])).await.unwrap();

        let result = session.generate_commit_message().await;
        assert!(matches!(result, Err(AppError::NothingToCommit)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn generate_passes_files_and_diffs_and_stores_draft() {
        let model = FakeModel::new(vec![Ok(CommitMessage::new("Add a", "Adds module a."))]);
        let mut session = session_with(model.clone());
        session
            .attach(FakeRepository::new(Some("main"), &[("a.go", "+foo")]))
            .await
            .unwrap();

        let draft = session.generate_commit_message().await.unwrap();
        assert_eq!(draft.message, CommitMessage::new("Add a", "Adds module a."));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].files(), ["a.go"]);
        assert_eq!(seen[0].diff("a.go"), Some("+foo"));
        assert_eq!(
            session.draft().map(Draft::fingerprint),
            Some(seen[0].fingerprint().as_str())
        );
    }

    #[tokio::test]
    async fn failed_generation_keeps_previous_draft() {
        let model = FakeModel::new(vec![
            Ok(CommitMessage::new("First draft", "")),
            Err(AppError::MalformedResponse("garbage".to_string())),
        ]);
        let mut session = session_with(model);
        session
            .attach(FakeRepository::new(Some("main"), &[("a.go", "+foo")]))
            .await
            .unwrap();

        session.generate_commit_message().await.unwrap();
        let result = session.generate_commit_message().await;

        assert!(matches!(result, Err(AppError::MalformedResponse(_))));
        assert_eq!(
            session.draft().map(|draft| draft.message.summary.as_str()),
            Some("First draft")
        );
    }

    #[tokio::test]
    async fn refresh_detects_stale_draft() {
        let repo = FakeRepository::new(Some("main"), &[("a.go", "+foo")]);
        let mut session = session_with(FakeModel::new(vec![Ok(CommitMessage::new("Add foo", ""))]));
        session.attach(repo.clone()).await.unwrap();
        session.generate_commit_message().await.unwrap();

        assert!(!session.refresh_state().await.unwrap().draft_is_stale);

        repo.edit("b.go", "+bar");
        let state = session.refresh_state().await.unwrap();
        assert!(state.draft_is_stale);
        assert_eq!(state.changed_files, ["a.go", "b.go"]);
    }

    #[tokio::test]
    async fn commit_clears_draft_and_refreshes_files() {
        let repo = FakeRepository::new(Some("main"), &[("README.md", "+usage")]);
        let mut session =
            session_with(FakeModel::new(vec![Ok(CommitMessage::new("Update README", ""))]));
        session.attach(repo.clone()).await.unwrap();
        session.generate_commit_message().await.unwrap();

        let outcome = session
            .commit("Update README", "Clarify usage instructions.")
            .await
            .unwrap();

        assert_eq!(outcome.branch.as_ref().map(BranchName::as_str), Some("main"));
        assert_eq!(
            repo.commits(),
            [CommitMessage::new("Update README", "Clarify usage instructions.")]
        );
        assert!(session.draft().is_none());
        assert!(session.changed_files().is_empty());
    }

    #[tokio::test]
    async fn failed_commit_keeps_draft() {
        let repo = FakeRepository::new(Some("main"), &[("a.go", "+foo")]);
        let mut session = session_with(FakeModel::new(vec![Ok(CommitMessage::new("Add foo", ""))]));
        session.attach(repo.clone()).await.unwrap();
        session.generate_commit_message().await.unwrap();

        repo.discard_all();
        let result = session.commit("Add foo", "").await;

        assert!(matches!(result, Err(AppError::NothingToCommit)));
        assert!(repo.commits().is_empty());
        assert_eq!(
            session.draft().map(|draft| draft.message.summary.as_str()),
            Some("Add foo")
        );
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn init_repo_with_readme() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path();
        git(path, &["init", "-q"]);
        git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(path, &["config", "user.name", "Test User"]);
        git(path, &["config", "user.email", "test@example.com"]);
        git(path, &["config", "commit.gpgsign", "false"]);
        fs::write(path.join("README.md"), "Run the tool.\n").unwrap();
        git(path, &["add", "README.md"]);
        git(path, &["commit", "-q", "-m", "Initial commit"]);
        dir
    }

    #[tokio::test]
    async fn failed_open_keeps_previous_repository() {
        let dir = init_repo_with_readme();
        let elsewhere = tempfile::tempdir().unwrap();
        let mut session = session_with(FakeModel::new(vec![]));

        session.open_repository(dir.path()).await.unwrap();
        let before = session.repository().cloned();

        let result = session
            .open_repository(elsewhere.path().join("not-a-repo"))
            .await;
        assert!(matches!(result, Err(AppError::NotARepository(_))));
        assert_eq!(session.repository().cloned(), before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_tolerates_untracked_directory_symlink() {
        let dir = init_repo_with_readme();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::os::unix::fs::symlink("assets", dir.path().join("link")).unwrap();
        fs::write(dir.path().join("README.md"), "changed\n").unwrap();

        let model = FakeModel::new(vec![Ok(CommitMessage::new("Link assets", ""))]);
        let mut session = session_with(model.clone());
        session.open_repository(dir.path()).await.unwrap();

        session.generate_commit_message().await.unwrap();
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].files(), ["README.md", "link"]);
        assert_eq!(seen[0].diff("link"), Some("New symlink: link\n\n+assets\n"));
    }

    #[tokio::test]
    async fn end_to_end_generate_and_commit() {
        let dir = init_repo_with_readme();
        fs::write(
            dir.path().join("README.md"),
            "Run the tool.\n\nPass --help to list every flag.\n",
        )
        .unwrap();

        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::Regex("README\\.md".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": "{\"summary\": \"Update README\", \"description\": \"Clarify usage instructions.\"}"
                        }
                    }]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(
            Some("sk-test".to_string()),
            format!("{}/v1/chat/completions", server.url()),
            "test-model",
        );
        let mut session = CommitSession::new(&AppContext::new(config(), Arc::new(client)));

        let repository = session.open_repository(dir.path()).await.unwrap();
        assert_eq!(repository.branch().map(BranchName::as_str), Some("main"));
        assert_eq!(session.changed_files(), ["README.md"]);

        let changes = session.collect_changes().await.unwrap();
        assert!(!changes.diff("README.md").unwrap_or_default().is_empty());

        let draft = session.generate_commit_message().await.unwrap();
        assert_eq!(
            draft.message,
            CommitMessage::new("Update README", "Clarify usage instructions.")
        );
        let (summary, description) = (
            draft.message.summary.clone(),
            draft.message.description.clone(),
        );

        let before = git(dir.path(), &["rev-list", "--count", "HEAD"]);
        let outcome = session.commit(&summary, &description).await.unwrap();
        let after = git(dir.path(), &["rev-list", "--count", "HEAD"]);

        assert_eq!(before, "1");
        assert_eq!(after, "2");
        assert_eq!(git(dir.path(), &["rev-parse", "HEAD"]), outcome.commit.as_str());
        assert_eq!(
            git(dir.path(), &["log", "-1", "--format=%B"]),
            "Update README\n\nClarify usage instructions."
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_key_makes_no_request() {
        let dir = init_repo_with_readme();
        fs::write(dir.path().join("README.md"), "changed\n").unwrap();

        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = ChatCompletionClient::new(None, server.url(), "test-model");
        let mut session = CommitSession::new(&AppContext::new(config(), Arc::new(client)));
        session.open_repository(dir.path()).await.unwrap();

        let result = session.generate_commit_message().await;
        assert!(matches!(result, Err(AppError::MissingCredential)));
        assert!(session.draft().is_none());
        mock.assert_async().await;
    }
}
