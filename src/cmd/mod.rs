pub mod commit;
pub mod config;
pub mod status;

use std::io::{self, Write};

use crate::domain::message::CommitMessage;
use crate::error::AppResult;

fn print_message(message: &CommitMessage) {
    if let Some(category) = message.category_label() {
        println!("[{category}]");
    }
    println!("{}", message.summary);
    if !message.description.is_empty() {
        println!();
        println!("{}", message.description);
    }
}

fn confirm(question: &str) -> AppResult<bool> {
    let mut stdout = io::stdout();
    write!(stdout, "{question} [y/N]: ")?;
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
