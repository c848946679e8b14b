use std::path::Path;

use mdsync_core::config::AppConfig;
use mdsync_core::db::{Database, LibSqlMappingRepository, MappingRepository};
use mdsync_core::sync::LocalFiles;

use crate::error::CliError;

/// Drop the mapping for `file`. Works offline and without a token.
pub async fn run_forget(config_path: &Path, file: &Path) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)?;
    let removed = forget_mapping(&config, file).await?;
    if removed {
        println!("Forgot mapping for {}", file.display());
    } else {
        println!("No mapping stored for {}", file.display());
    }
    Ok(())
}

pub async fn forget_mapping(config: &AppConfig, file: &Path) -> Result<bool, CliError> {
    let files = LocalFiles::new(
        &config.directories.markdown_root,
        &config.directories.excluded_patterns,
    )?;
    let key = files.key_for(file);
    let db = Database::open(config.database_path()).await?;
    let repository = LibSqlMappingRepository::new(db.connection());
    Ok(repository.delete(&key).await?)
}
