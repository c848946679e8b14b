use std::path::{Path, PathBuf};

use mdsync_core::config::{AppConfig, ENV_TOKEN};

use crate::error::CliError;

pub fn run_init(
    config_path: &Path,
    markdown_root: Option<PathBuf>,
    parent_page_id: Option<String>,
    force: bool,
) -> Result<(), CliError> {
    let config = write_starter_config(config_path, markdown_root, parent_page_id, force)?;
    println!("Wrote {}", config_path.display());
    println!(
        "Markdown root: {}",
        config.directories.markdown_root.display()
    );
    if config.notion.parent_page_id.is_none() {
        println!("Set notion.parent_page_id before pushing new documents.");
    }
    println!("Export {ENV_TOKEN} with your integration token to start syncing.");
    Ok(())
}

/// Write the default config with the given overrides and create the root.
/// The token is never written; it comes from the environment.
pub fn write_starter_config(
    config_path: &Path,
    markdown_root: Option<PathBuf>,
    parent_page_id: Option<String>,
    force: bool,
) -> Result<AppConfig, CliError> {
    if config_path.exists() && !force {
        return Err(CliError::ConfigExists(config_path.to_path_buf()));
    }

    let mut config = AppConfig::default();
    if let Some(root) = markdown_root {
        config.directories.markdown_root = root;
    }
    config.notion.parent_page_id = parent_page_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    config.save_to_path(config_path)?;
    std::fs::create_dir_all(&config.directories.markdown_root)?;
    Ok(config)
}
