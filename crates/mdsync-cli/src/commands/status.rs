use std::path::Path;

use mdsync_core::db::MappingRepository;
use mdsync_core::sync::SyncContext;

use crate::commands::common::{build_engine, format_outcome_lines, open_database, prepare_config};
use crate::error::CliError;

/// Dry-run classification of every document plus the mapping count
pub async fn run_status(config_path: &Path, as_json: bool) -> Result<(), CliError> {
    let config = prepare_config(config_path, |_| {})?;
    let db = open_database(&config).await?;
    let engine = build_engine(&config, &db, SyncContext::from_config(&config))?;

    let mapped = engine.mappings().all().await?.len();
    let mut report = engine.sync_all(config.sync.direction, true).await?;
    report.sort();

    if as_json {
        let value = serde_json::json!({
            "mapped": mapped,
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Markdown root: {}", config.directories.markdown_root.display());
    println!("Direction:     {}", config.sync.direction);
    println!("Strategy:      {}", config.sync.conflict_resolution);
    println!("Mapped:        {mapped}");
    println!();
    for line in format_outcome_lines(&report) {
        println!("{line}");
    }
    println!(
        "{} to push, {} to pull, {} unchanged, {} conflicted, {} failed",
        report.pushed, report.pulled, report.unchanged, report.conflicted, report.failed
    );
    Ok(())
}
