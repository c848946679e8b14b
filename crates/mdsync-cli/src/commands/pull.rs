use std::path::{Path, PathBuf};

use mdsync_core::config::AppConfig;
use mdsync_core::remote::RemotePageSummary;
use mdsync_core::sync::{Direction, SyncContext, SyncReport};

use crate::commands::common::{
    build_engine, confirm_pages, finish, open_database, prepare_config, print_report,
};
use crate::error::CliError;

/// Where pulled pages come from
enum PullSource<'a> {
    Workspace { query: Option<&'a str> },
    Children { parent_id: &'a str },
}

pub async fn run_pull_workspace(
    config_path: &Path,
    query: Option<String>,
    directory: Option<PathBuf>,
    dry_run: bool,
    assume_yes: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let source = PullSource::Workspace {
        query: query.as_deref(),
    };
    run_pull(config_path, source, directory.as_deref(), dry_run, assume_yes, as_json).await
}

pub async fn run_pull_children(
    config_path: &Path,
    parent_id: &str,
    directory: Option<PathBuf>,
    dry_run: bool,
    assume_yes: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let source = PullSource::Children { parent_id };
    run_pull(config_path, source, directory.as_deref(), dry_run, assume_yes, as_json).await
}

async fn run_pull(
    config_path: &Path,
    source: PullSource<'_>,
    directory: Option<&Path>,
    dry_run: bool,
    assume_yes: bool,
    as_json: bool,
) -> Result<(), CliError> {
    // Pulls never create pages, so a parent page id is not required.
    let config = prepare_config(config_path, |config: &mut AppConfig| {
        config.sync.direction = Direction::Pull;
    })?;
    let db = open_database(&config).await?;
    let context = SyncContext::from_config(&config).with_dry_run(dry_run);
    let engine = build_engine(&config, &db, context)?;

    let confirm = |pages: &[RemotePageSummary]| confirm_pages(pages, assume_yes || dry_run);
    let mut report = match source {
        PullSource::Workspace { query } => engine.pull_workspace(query, directory, confirm).await?,
        PullSource::Children { parent_id } => {
            engine.pull_children(parent_id, directory, confirm).await?
        }
    };

    if declined(&report) {
        eprintln!("Nothing pulled.");
        return Ok(());
    }
    report.sort();
    print_report(&report, as_json)?;
    finish(&report)
}

fn declined(report: &SyncReport) -> bool {
    report.cancelled && report.outcomes.is_empty()
}
