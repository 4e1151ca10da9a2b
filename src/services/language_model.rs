use async_trait::async_trait;

use crate::domain::change::ChangeSet;
use crate::domain::message::CommitMessage;
use crate::error::AppResult;

#[async_trait]
pub trait LanguageModelService: Send + Sync {
    async fn draft_commit_message(&self, changes: &ChangeSet) -> AppResult<CommitMessage>;

    /// Round trip with a trivial prompt to validate endpoint, key and model.
    async fn check_connection(&self) -> AppResult<String>;
}
