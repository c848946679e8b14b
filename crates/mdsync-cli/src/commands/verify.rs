use std::path::Path;

use mdsync_core::config::AppConfig;
use mdsync_core::remote::{verify_access, AccessReport};

use crate::commands::common::notion_client;
use crate::error::CliError;

/// Check the token and the parent page. Needs no Markdown root or mapping store.
pub async fn run_verify(config_path: &Path, as_json: bool) -> Result<(), CliError> {
    let config = AppConfig::load(config_path)?;
    let client = notion_client(&config)?;
    let report = verify_access(&client, config.notion.parent_page_id.as_deref()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_access(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_access(report: &AccessReport) -> Vec<String> {
    let user = report.user.name.as_deref().unwrap_or(&report.user.id);
    let mut lines = vec![format!("Token accepted for {user}")];
    match &report.parent {
        Some(parent) => lines.push(format!("Parent page {}  {}", parent.id, parent.title)),
        None => lines.push("No parent page configured; new documents cannot be pushed".to_string()),
    }
    lines
}
