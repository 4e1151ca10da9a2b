use clap::Args;

use crate::cmd::{confirm, print_message};
use crate::domain::message::CommitMessage;
use crate::error::AppResult;
use crate::workflow::CommitSession;

#[derive(Args, Debug, Clone, Default)]
pub struct CommitArgs {
    /// Use this summary instead of generating one.
    #[arg(short = 'm', long = "message")]
    pub message: Option<String>,
    /// Commit description; replaces the generated one when given.
    #[arg(short, long)]
    pub description: Option<String>,
    /// Commit without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn generate(session: &mut CommitSession) -> AppResult<()> {
    let draft = session.generate_commit_message().await?;
    print_message(&draft.message);
    Ok(())
}

pub async fn run(session: &mut CommitSession, args: CommitArgs) -> AppResult<()> {
    let mut message = match args.message {
        Some(summary) => CommitMessage::new(summary, ""),
        None => session.generate_commit_message().await?.message.clone(),
    };
    if let Some(description) = args.description {
        message.description = description.trim().to_string();
    }

    print_message(&message);
    println!();

    if !args.yes && !confirm("Commit with this message?")? {
        println!("Commit cancelled.");
        return Ok(());
    }

    let outcome = session
        .commit(&message.summary, &message.description)
        .await?;

    let branch = outcome
        .branch
        .as_ref()
        .map(|branch| branch.as_str())
        .unwrap_or("(detached HEAD)");
    println!(
        "Committed {} on {}: {}",
        outcome.commit.short(),
        branch,
        outcome.message.summary
    );
    Ok(())
}
