use std::io::{self, Write};
use std::path::Path;
use std::str::FromStr;

use clap::{Args, Subcommand};

use crate::config::{
    AppConfig, DEFAULT_ENDPOINT, DEFAULT_MODEL, ENV_API_KEY, StoredConfig, config_file_path,
};
use crate::context::AppContext;
use crate::error::AppResult;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Run the interactive configuration wizard.
    Init,
    /// Show the stored configuration (secrets masked).
    Show,
    /// Send a short test prompt to the configured endpoint.
    Test,
}

pub async fn run(command: ConfigCommand, workspace: &Path) -> AppResult<()> {
    match command {
        ConfigCommand::Init => run_init(),
        ConfigCommand::Show => run_show(workspace),
        ConfigCommand::Test => run_test(workspace).await,
    }
}

fn run_init() -> AppResult<()> {
    let mut cfg = StoredConfig::load()?;

    println!("Configuring aicommit.");
    println!("Press Enter to keep the current value, '-' to clear it.");
    println!("Secrets are stored in the local config file; protect your filesystem accordingly.");
    println!();

    ask("API key", &mut cfg.api_key, true)?;
    ask(
        &format!("Chat completions endpoint (default {DEFAULT_ENDPOINT})"),
        &mut cfg.endpoint,
        false,
    )?;
    ask(&format!("Model (default {DEFAULT_MODEL})"), &mut cfg.model, false)?;
    ask(
        "Request timeout in seconds (0 disables)",
        &mut cfg.request_timeout_secs,
        false,
    )?;
    ask(
        "Git timeout in seconds (0 disables)",
        &mut cfg.git_timeout_secs,
        false,
    )?;

    cfg.save()?;

    let path = config_file_path()?;
    println!("\nConfiguration saved to {}", path.display());
    Ok(())
}

fn run_show(workspace: &Path) -> AppResult<()> {
    let cfg = StoredConfig::load()?;
    let effective = AppConfig::from_lookup(cfg.clone(), workspace, |key| std::env::var(key).ok());
    let path = config_file_path()?;

    println!("Configuration file: {}", path.display());
    println!("API key: {}", mask_secret(cfg.api_key.as_deref()));
    println!("Endpoint: {}", or_unset(cfg.endpoint.as_deref()));
    println!("Model: {}", or_unset(cfg.model.as_deref()));
    println!("Request timeout: {}", display_number(cfg.request_timeout_secs));
    println!("Git timeout: {}", display_number(cfg.git_timeout_secs));
    println!();
    println!("Effective endpoint: {}", effective.endpoint);
    println!("Effective model: {}", effective.model);
    println!("Effective API key: {}", mask_secret(effective.api_key.as_deref()));
    if effective.api_key != cfg.api_key {
        println!("(API key taken from {ENV_API_KEY})");
    }

    Ok(())
}

async fn run_test(workspace: &Path) -> AppResult<()> {
    let config = AppConfig::load(workspace)?;
    println!("Testing {} with model {}...", config.endpoint, config.model);

    let ctx = AppContext::from_config(config)?;
    let reply = ctx.language_model.check_connection().await?;

    println!("Connection OK. Model replied: {}", reply.trim());
    Ok(())
}

/// Asks for one setting and applies the answer to `target`. Values that do
/// not parse as `T` are reported and leave the setting untouched.
fn ask<T>(field: &str, target: &mut Option<T>, secret: bool) -> AppResult<()>
where
    T: FromStr + ToString,
{
    let current = target.as_ref().map(ToString::to_string);
    let mut stdout = io::stdout();
    write!(stdout, "{}", question(field, current.as_deref(), secret))?;
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    match PromptAction::from_input(&input) {
        PromptAction::Keep => {}
        PromptAction::Clear => *target = None,
        PromptAction::Set(value) => match value.parse() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => println!("Ignoring invalid value '{value}' for {field}."),
        },
    }
    Ok(())
}

fn question(field: &str, current: Option<&str>, secret: bool) -> String {
    match current {
        None => format!("{field} (Enter to skip): "),
        Some(_) if secret => format!("{field} [****] (Enter to keep, '-' to clear): "),
        Some(value) => format!("{field} [{value}] (Enter to keep, '-' to clear): "),
    }
}

fn or_unset(value: Option<&str>) -> String {
    match value {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => "<not set>".to_string(),
    }
}

fn display_number(value: Option<u64>) -> String {
    match value {
        Some(0) => "disabled".to_string(),
        Some(secs) => format!("{secs}s"),
        None => "<not set>".to_string(),
    }
}

fn mask_secret(value: Option<&str>) -> String {
    match value {
        Some(token) if token.chars().count() > 6 => {
            let prefix: String = token.chars().take(3).collect();
            let suffix: String = token
                .chars()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{prefix}***{suffix}")
        }
        Some(token) if !token.is_empty() => "***".to_string(),
        _ => "<not set>".to_string(),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PromptAction {
    Keep,
    Clear,
    Set(String),
}

impl PromptAction {
    fn from_input(input: &str) -> Self {
        match input.trim() {
            "" => Self::Keep,
            "-" => Self::Clear,
            value => Self::Set(value.to_string()),
        }
    }
}
