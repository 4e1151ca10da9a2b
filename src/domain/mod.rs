pub mod branch;
pub mod change;
pub mod message;
pub mod repository;

pub use branch::BranchName;
pub use change::ChangeSet;
pub use message::{ChangeType, CommitId, CommitMessage};
pub use repository::Repository;
