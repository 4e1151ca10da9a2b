use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use aicommit::cmd::commit::{self, CommitArgs};
use aicommit::cmd::config::{self as config_cmd, ConfigArgs};
use aicommit::cmd::status;
use aicommit::config::{AppConfig, ENV_API_KEY};
use aicommit::context::AppContext;
use aicommit::error::AppResult;
use aicommit::workflow::CommitSession;

#[derive(Parser)]
#[command(
    name = "aicommit",
    author,
    version,
    about = "Generate commit messages for your working tree with an LLM"
)]
struct Cli {
    /// Run as if started in this directory.
    #[arg(short = 'C', value_name = "PATH", global = true)]
    path: Option<PathBuf>,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress log output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the branch, changed files and credential status.
    Status,
    /// Generate a commit message for the current changes and print it.
    Generate,
    /// Generate (or take) a message and commit every change with it.
    Commit(CommitArgs),
    /// Manage CLI configuration.
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let workspace = match cli.path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Status => {
            let (ctx, mut session) = open_session(&workspace).await?;
            status::run(&ctx, &mut session).await
        }
        Commands::Generate => {
            let (_ctx, mut session) = open_session(&workspace).await?;
            commit::generate(&mut session).await
        }
        Commands::Commit(args) => {
            let (_ctx, mut session) = open_session(&workspace).await?;
            commit::run(&mut session, args).await
        }
        Commands::Config(args) => config_cmd::run(args.command, &workspace).await,
    }
}

async fn open_session(workspace: &Path) -> AppResult<(AppContext, CommitSession)> {
    let config = AppConfig::load(workspace)?;
    if !config.has_api_key() {
        eprintln!(
            "Warning: no API key configured; run `aicommit config init` or set {ENV_API_KEY}."
        );
    }

    let ctx = AppContext::from_config(config)?;
    let mut session = CommitSession::new(&ctx);
    session.open_repository(workspace).await?;
    Ok((ctx, session))
}

fn setup_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => tracing_subscriber::EnvFilter::new("warn"),
            1 => tracing_subscriber::EnvFilter::new("info,hyper=warn,reqwest=warn"),
            2 => tracing_subscriber::EnvFilter::new("debug,hyper=warn,reqwest=warn"),
            _ => tracing_subscriber::EnvFilter::new("trace"),
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
