use std::path::Path;

use mdsync_core::sync::{Direction, SyncContext};

use crate::commands::common::{build_engine, open_database, prepare_config};
use crate::error::CliError;

pub async fn run_watch(config_path: &Path, direction: Option<Direction>) -> Result<(), CliError> {
    let config = prepare_config(config_path, |config| {
        if let Some(direction) = direction {
            config.sync.direction = direction;
        }
    })?;
    let db = open_database(&config).await?;
    let engine = build_engine(&config, &db, SyncContext::from_config(&config))?;

    println!(
        "Watching {} (direction: {}). Press Ctrl-C to stop.",
        config.directories.markdown_root.display(),
        config.sync.direction
    );
    engine.watch(config.sync.direction).await?;
    println!("Stopped watching.");
    Ok(())
}
