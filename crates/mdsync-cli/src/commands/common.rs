use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;

use mdsync_core::config::AppConfig;
use mdsync_core::db::{Database, LibSqlMappingRepository};
use mdsync_core::remote::{NotionClient, RateBudget, RemotePageSummary};
use mdsync_core::sync::{DocumentOutcome, OutcomeStatus, SyncContext, SyncEngine, SyncReport};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

pub type Engine<'a> = SyncEngine<NotionClient, LibSqlMappingRepository<'a>>;

/// Load the config, let the command adjust it, then validate the result.
pub fn prepare_config(
    path: &Path,
    adjust: impl FnOnce(&mut AppConfig),
) -> Result<AppConfig, CliError> {
    let mut config = AppConfig::load(path)?;
    adjust(&mut config);
    config.validate()?;
    Ok(config)
}

pub async fn open_database(config: &AppConfig) -> Result<Database, CliError> {
    let path = config.database_path();
    tracing::debug!("Opening mapping store at {}", path.display());
    Ok(Database::open(&path).await?)
}

pub fn notion_client(config: &AppConfig) -> Result<NotionClient, CliError> {
    let token = config
        .notion
        .token
        .clone()
        .ok_or_else(|| CliError::Config("Notion API token is not set".to_string()))?;
    let client = NotionClient::new(token, RateBudget::per_second(config.sync.requests_per_second))?;
    match config.notion.api_url.as_deref() {
        Some(url) => Ok(client.with_api_url(url)?),
        None => Ok(client),
    }
}

pub fn build_engine<'a>(
    config: &AppConfig,
    db: &'a Database,
    context: SyncContext,
) -> Result<Engine<'a>, CliError> {
    let engine = SyncEngine::new(
        notion_client(config)?,
        LibSqlMappingRepository::new(db.connection()),
        context,
    )?;
    Ok(engine.with_cancellation(cancel_on_ctrl_c()))
}

/// Token cancelled by Ctrl-C. Documents already started still finish.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing documents already in progress");
            cancel.cancel();
        }
    });
    token
}

pub fn print_report(report: &SyncReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for line in format_outcome_lines(report) {
        println!("{line}");
    }
    println!("{}", format_summary(report));
    Ok(())
}

/// Turn an unclean report into an error so the process exits non-zero
pub fn finish(report: &SyncReport) -> Result<(), CliError> {
    if report.is_clean() {
        return Ok(());
    }
    if let Some(reason) = &report.aborted {
        return Err(CliError::Incomplete(format!("run aborted: {reason}")));
    }
    if report.cancelled {
        return Err(CliError::Incomplete("run cancelled".to_string()));
    }
    Err(CliError::Incomplete(format!(
        "{} failed, {} conflicted",
        report.failed, report.conflicted
    )))
}

pub fn format_outcome_lines(report: &SyncReport) -> Vec<String> {
    report.outcomes.iter().flat_map(outcome_lines).collect()
}

fn outcome_lines(outcome: &DocumentOutcome) -> Vec<String> {
    let decision = outcome
        .decision
        .map_or_else(|| "-".to_string(), |decision| decision.to_string());
    let mut head = format!(
        "{:<10}  {decision:<12}  {}",
        status_label(outcome.status),
        outcome.local_path
    );
    if let Some(message) = &outcome.message {
        head.push_str("  ");
        head.push_str(message);
    }

    let mut lines = vec![head];
    lines.extend(
        outcome
            .conversion_errors
            .iter()
            .map(|error| format!("    error: {error}")),
    );
    lines.extend(outcome.warnings.iter().map(|warning| format!("    warning: {warning}")));
    if let Some(conflict) = &outcome.conflict {
        lines.push(format!(
            "    local:  {} ({})",
            conflict.local_title,
            conflict.local_fingerprint.short()
        ));
        lines.push(format!(
            "    remote: {} ({}, edited {})",
            conflict.remote_title,
            conflict.remote_fingerprint.short(),
            conflict.remote_modified.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    lines
}

pub const fn status_label(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Pushed => "pushed",
        OutcomeStatus::Pulled => "pulled",
        OutcomeStatus::Unchanged => "unchanged",
        OutcomeStatus::Conflicted => "conflicted",
        OutcomeStatus::Failed => "failed",
    }
}

pub fn format_summary(report: &SyncReport) -> String {
    let mut summary = format!(
        "{} pushed, {} pulled, {} unchanged, {} conflicted, {} failed",
        report.pushed, report.pulled, report.unchanged, report.conflicted, report.failed
    );
    if report.dry_run {
        summary.push_str(" (dry run)");
    }
    if let Some(reason) = &report.aborted {
        summary.push_str(&format!("; aborted: {reason}"));
    } else if report.cancelled {
        summary.push_str("; cancelled");
    }
    summary
}

/// List the pages about to be pulled and ask before writing anything.
/// Prompts go to stderr so `--json` output stays parseable.
pub fn confirm_pages(pages: &[RemotePageSummary], assume_yes: bool) -> bool {
    eprintln!("{} page(s) to pull:", pages.len());
    for page in pages {
        eprintln!("  {}  {}", page.id, page.title);
    }
    if assume_yes {
        return true;
    }

    let stdin = io::stdin();
    if !stdin.is_terminal() {
        eprintln!("Not a terminal; pass --yes to pull without confirmation.");
        return false;
    }
    eprint!("Pull these pages? [y/N] ");
    io::stderr().flush().ok();

    let mut answer = String::new();
    if stdin.lock().read_line(&mut answer).is_err() {
        return false;
    }
    is_yes(&answer)
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
