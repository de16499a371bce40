//! notify-replay: Replays a scripted notification feed through a sync session.
//!
//! Stands in for the header component: subscribes one user to an in-memory
//! store, applies each scripted change, logs badge updates and alerts, and
//! prints a JSON summary on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notify_core::UserId;
use notify_replay::{ReplayScript, load_config};

#[derive(Parser, Debug)]
#[command(name = "notify-replay")]
#[command(about = "Replay a notification feed script through a sync session")]
struct Args {
    /// Path to the JSON replay script
    #[arg(short, long)]
    script: PathBuf,

    /// Identifier of the viewing user (e.g. their email)
    #[arg(short, long)]
    user: String,

    /// Path to a JSON engine config (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,notify_core=debug,notify_replay=debug"
    } else {
        "info,notify_core=info,notify_replay=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // stdout carries the summary, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting notify-replay");
    info!("Script: {:?}", args.script);

    let config = load_config(args.config.as_deref())?;
    let script = ReplayScript::load(&args.script)?;
    info!(
        "Replaying {} step(s) over {} initial record(s)",
        script.steps.len(),
        script.initial.len()
    );

    let summary = notify_replay::run(script, UserId::from(args.user), config).await?;

    let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
    println!("{}", json);
    Ok(())
}
