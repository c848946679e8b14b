use std::path::{Path, PathBuf};

use mdsync_core::sync::{ConflictStrategy, Direction, SyncContext};
use mdsync_core::util::normalize_notion_id;

use crate::commands::common::{build_engine, finish, open_database, prepare_config, print_report};
use crate::error::CliError;

pub async fn run_sync(
    config_path: &Path,
    file: &Path,
    direction: Option<Direction>,
    page_id: Option<&str>,
    dry_run: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let page_id = page_id.map(page_id_arg).transpose()?;
    if page_id.is_some() && direction.is_some_and(|direction| direction != Direction::Pull) {
        return Err(CliError::Config(
            "--page-id pulls a page; it cannot be combined with --direction push or both"
                .to_string(),
        ));
    }

    let config = prepare_config(config_path, |config| {
        if page_id.is_some() {
            config.sync.direction = Direction::Pull;
        } else if let Some(direction) = direction {
            config.sync.direction = direction;
        }
    })?;
    let db = open_database(&config).await?;
    let context = SyncContext::from_config(&config).with_dry_run(dry_run);
    let engine = build_engine(&config, &db, context)?;

    let report = match &page_id {
        Some(page_id) => engine.pull_page(page_id, file).await,
        None => engine.sync_one(file, config.sync.direction).await,
    };
    print_report(&report, as_json)?;
    finish(&report)
}

pub async fn run_sync_all(
    config_path: &Path,
    directory: Option<PathBuf>,
    direction: Option<Direction>,
    strategy: Option<ConflictStrategy>,
    dry_run: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let config = prepare_config(config_path, |config| {
        if let Some(directory) = directory {
            config.directories.markdown_root = directory;
        }
        if let Some(direction) = direction {
            config.sync.direction = direction;
        }
        if let Some(strategy) = strategy {
            config.sync.conflict_resolution = strategy;
        }
    })?;
    let db = open_database(&config).await?;
    let engine = build_engine(&config, &db, SyncContext::from_config(&config))?;

    let mut report = engine.sync_all(config.sync.direction, dry_run).await?;
    report.sort();
    print_report(&report, as_json)?;
    finish(&report)
}

/// Dashed page id from a bare id, dashed id or page URL
pub fn page_id_arg(value: &str) -> Result<String, CliError> {
    normalize_notion_id(value)
        .ok_or_else(|| CliError::Config(format!("`{value}` is not a Notion page id or page URL")))
}
