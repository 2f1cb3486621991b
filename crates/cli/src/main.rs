//! ClawRun CLI: the main entry point.
//!
//! Runs one prompt through the agent loop without any interactive UI and
//! exits with a code that tells scripts how the run ended:
//!
//! - `0`   success
//! - `42`  the input could not be processed
//! - `53`  the session turn limit was reached
//! - `130` cancelled
//! - `1`   anything else

use std::path::PathBuf;

use clap::Parser;
use clawrun_config::OutputFormat;

mod run;

#[derive(Parser, Debug)]
#[command(
    name = "clawrun",
    about = "ClawRun: run an AI agent headlessly",
    version
)]
pub struct Cli {
    /// Prompt to run. Read from stdin when omitted.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Output format: text, json or stream-json
    #[arg(short, long)]
    output_format: Option<OutputFormat>,

    /// Maximum backend round trips; -1 for unlimited
    #[arg(long, allow_negative_numbers = true)]
    max_session_turns: Option<i64>,

    /// Resume from a recorded session file
    #[arg(short, long)]
    resume: Option<PathBuf>,

    /// Override the configured model
    #[arg(short, long)]
    model: Option<String>,

    /// Path to config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the selected output format.
    let filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let code = run::execute(cli).await;
    std::process::exit(code);
}
