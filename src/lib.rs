//! Drafts Git commit messages with a chat-completion model and commits them.
//!
//! [`workflow::CommitSession`] is the entry point for front ends: it opens a
//! repository through the `git` binary, collects the working-tree changes,
//! asks the configured model for a summary and description, and records the
//! commit.

pub mod cmd;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod workflow;

pub use error::{AppError, AppResult};
