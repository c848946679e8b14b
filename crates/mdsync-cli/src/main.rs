//! mdsync - keep a Markdown tree and a Notion workspace in sync
//!
//! Each subcommand loads `config/config.yaml` (or `--config`), applies
//! environment overrides and drives the core sync engine.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::{completions, forget, init, pull, resolve, status, sync, verify, watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config_path = cli.config.as_path();
    match cli.command {
        Commands::Init {
            markdown_root,
            parent_page_id,
            force,
        } => init::run_init(config_path, markdown_root, parent_page_id, force),
        Commands::Sync {
            file,
            direction,
            page_id,
            dry_run,
            json,
        } => {
            sync::run_sync(
                config_path,
                &file,
                direction.map(Into::into),
                page_id.as_deref(),
                dry_run,
                json,
            )
            .await
        }
        Commands::SyncAll {
            directory,
            dry_run,
            direction,
            strategy,
            json,
        } => {
            sync::run_sync_all(
                config_path,
                directory,
                direction.map(Into::into),
                strategy.map(Into::into),
                dry_run,
                json,
            )
            .await
        }
        Commands::PullWorkspace {
            query,
            directory,
            dry_run,
            yes,
            json,
        } => pull::run_pull_workspace(config_path, query, directory, dry_run, yes, json).await,
        Commands::PullChildren {
            parent_id,
            directory,
            dry_run,
            yes,
            json,
        } => {
            pull::run_pull_children(config_path, &parent_id, directory, dry_run, yes, json).await
        }
        Commands::Watch { direction } => {
            watch::run_watch(config_path, direction.map(Into::into)).await
        }
        Commands::Resolve { file, keep, json } => {
            resolve::run_resolve(config_path, &file, keep.into(), json).await
        }
        Commands::Status { json } => status::run_status(config_path, json).await,
        Commands::Verify { json } => verify::run_verify(config_path, json).await,
        Commands::Forget { file } => forget::run_forget(config_path, &file).await,
        Commands::Completions { shell, output } => {
            completions::run_completions(shell, output.as_deref())
        }
    }
}

/// Logs go to stderr so stdout stays clean for reports and `--json`.
fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "mdsync=debug,mdsync_core=debug"
    } else {
        "mdsync=info,mdsync_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
