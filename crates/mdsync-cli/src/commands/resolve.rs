use std::path::Path;

use mdsync_core::sync::{ManualResolution, Side, SyncContext};

use crate::commands::common::{build_engine, finish, open_database, prepare_config, print_report};
use crate::error::CliError;

pub async fn run_resolve(
    config_path: &Path,
    file: &Path,
    keep: Side,
    as_json: bool,
) -> Result<(), CliError> {
    let config = prepare_config(config_path, |_| {})?;
    let db = open_database(&config).await?;
    let engine = build_engine(&config, &db, SyncContext::from_config(&config))?;

    let Some(conflict) = engine.conflict(file).await? else {
        return Err(CliError::NoConflict(file.to_path_buf()));
    };
    let resolution = ManualResolution::for_conflict(&conflict, keep);
    let report = engine.resolve(file, &resolution).await;
    print_report(&report, as_json)?;
    finish(&report)
}
