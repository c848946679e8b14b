use std::path::Path;

use clap::{CommandFactory, Parser};
use mdsync_core::config::AppConfig;
use mdsync_core::db::{Database, LibSqlMappingRepository, MappingRepository};
use mdsync_core::models::{Fingerprint, MappingRecord, StructuralNode};
use mdsync_core::remote::{AccessReport, RemotePageSummary, RemoteUser};
use mdsync_core::sync::{
    ConflictStrategy, DecisionKind, Direction, DocumentOutcome, OutcomeStatus, Side, SyncReport,
};
use mdsync_core::Error;
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, DirectionArg, KeepArg, StrategyArg};
use crate::commands::common::{finish, format_outcome_lines, format_summary, is_yes, status_label};
use crate::commands::completions::render_completions;
use crate::commands::forget::forget_mapping;
use crate::commands::init::write_starter_config;
use crate::commands::sync::page_id_arg;
use crate::commands::verify::format_access;
use crate::error::CliError;

fn report_with(outcomes: Vec<DocumentOutcome>) -> SyncReport {
    let mut report = SyncReport::new(false);
    for outcome in outcomes {
        report.record(outcome);
    }
    report
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn sync_all_parses_overrides() {
    let cli = Cli::parse_from([
        "mdsync",
        "sync-all",
        "--direction",
        "pull",
        "--strategy",
        "newer",
        "--dry-run",
        "--config",
        "other.yaml",
    ]);
    assert_eq!(cli.config, Path::new("other.yaml"));
    match cli.command {
        Commands::SyncAll {
            direction,
            strategy,
            dry_run,
            directory,
            json,
        } => {
            assert_eq!(direction, Some(DirectionArg::Pull));
            assert_eq!(strategy, Some(StrategyArg::Newer));
            assert!(dry_run);
            assert!(directory.is_none());
            assert!(!json);
        }
        _ => panic!("expected sync-all"),
    }
}

#[test]
fn sync_accepts_an_explicit_page() {
    let cli = Cli::parse_from([
        "mdsync",
        "sync",
        "--file",
        "notes/new.md",
        "--page-id",
        "0123abcd00004000800000000000beef",
    ]);
    match cli.command {
        Commands::Sync {
            file,
            page_id,
            direction,
            ..
        } => {
            assert_eq!(file, Path::new("notes/new.md"));
            assert_eq!(page_id.as_deref(), Some("0123abcd00004000800000000000beef"));
            assert!(direction.is_none());
        }
        _ => panic!("expected sync"),
    }
}

#[test]
fn page_id_argument_is_normalized() {
    assert_eq!(
        page_id_arg("https://www.notion.so/Plan-0123abcd00004000800000000000beef").unwrap(),
        "0123abcd-0000-4000-8000-00000000beef"
    );
    assert!(matches!(page_id_arg("plan"), Err(CliError::Config(_))));
}

#[test]
fn verify_reports_user_and_parent() {
    let cli = Cli::parse_from(["mdsync", "verify", "--json"]);
    assert!(matches!(cli.command, Commands::Verify { json: true }));

    let mut report = AccessReport {
        user: RemoteUser {
            id: "user-1".to_string(),
            name: None,
        },
        parent: Some(RemotePageSummary {
            id: "0123abcd-0000-4000-8000-00000000beef".to_string(),
            title: "Team space".to_string(),
        }),
    };
    assert_eq!(
        format_access(&report),
        vec![
            "Token accepted for user-1".to_string(),
            "Parent page 0123abcd-0000-4000-8000-00000000beef  Team space".to_string(),
        ]
    );

    report.parent = None;
    assert!(format_access(&report)[1].starts_with("No parent page configured"));
}

#[test]
fn config_path_defaults_to_project_config() {
    let cli = Cli::parse_from(["mdsync", "status"]);
    assert_eq!(cli.config, Path::new("config/config.yaml"));
    assert!(!cli.debug);
}

#[test]
fn resolve_requires_a_side() {
    assert!(Cli::try_parse_from(["mdsync", "resolve", "--file", "a.md"]).is_err());
    let cli = Cli::parse_from(["mdsync", "resolve", "--file", "a.md", "--keep", "remote"]);
    assert!(matches!(
        cli.command,
        Commands::Resolve {
            keep: KeepArg::Remote,
            ..
        }
    ));
}

#[test]
fn arguments_convert_to_core_types() {
    assert_eq!(Direction::from(DirectionArg::Push), Direction::Push);
    assert_eq!(Direction::from(DirectionArg::Both), Direction::Both);
    assert_eq!(
        ConflictStrategy::from(StrategyArg::Local),
        ConflictStrategy::PreferLocal
    );
    assert_eq!(
        ConflictStrategy::from(StrategyArg::Manual),
        ConflictStrategy::Manual
    );
    assert_eq!(Side::from(KeepArg::Local), Side::Local);
}

#[test]
fn is_yes_accepts_only_explicit_answers() {
    assert!(is_yes("y\n"));
    assert!(is_yes("  YES "));
    assert!(!is_yes(""));
    assert!(!is_yes("n"));
    assert!(!is_yes("yep"));
}

#[test]
fn status_labels_are_lowercase_words() {
    assert_eq!(status_label(OutcomeStatus::Pushed), "pushed");
    assert_eq!(status_label(OutcomeStatus::Conflicted), "conflicted");
}

#[test]
fn outcome_lines_include_warnings_and_unclassified_failures() {
    let pushed = DocumentOutcome::new("notes/a.md", DecisionKind::PushUpdate, OutcomeStatus::Pushed)
        .with_warnings(vec!["table flattened".to_string()]);
    let failed = DocumentOutcome::failed(
        "notes/b.md",
        None,
        &Error::InvalidInput("bad yaml".to_string()),
    );
    let lines = format_outcome_lines(&report_with(vec![pushed, failed]));

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("pushed"));
    assert!(lines[0].contains("push-update"));
    assert!(lines[0].ends_with("notes/a.md"));
    assert_eq!(lines[1], "    warning: table flattened");
    assert!(lines[2].contains("  -  "));
    assert!(lines[2].contains("bad yaml"));
}

#[test]
fn summary_counts_each_status() {
    let mut report = report_with(vec![
        DocumentOutcome::new("a.md", DecisionKind::PushCreate, OutcomeStatus::Pushed),
        DocumentOutcome::new("b.md", DecisionKind::NoOp, OutcomeStatus::Unchanged),
        DocumentOutcome::new("c.md", DecisionKind::NoOp, OutcomeStatus::Unchanged),
    ]);
    report.dry_run = true;
    assert_eq!(
        format_summary(&report),
        "1 pushed, 0 pulled, 2 unchanged, 0 conflicted, 0 failed (dry run)"
    );

    report.cancelled = true;
    assert!(format_summary(&report).ends_with("; cancelled"));
}

#[test]
fn finish_fails_unclean_reports() {
    let clean = report_with(vec![DocumentOutcome::new(
        "a.md",
        DecisionKind::NoOp,
        OutcomeStatus::Unchanged,
    )]);
    assert!(finish(&clean).is_ok());

    let conflicted = report_with(vec![DocumentOutcome::new(
        "a.md",
        DecisionKind::Conflict,
        OutcomeStatus::Conflicted,
    )]);
    let error = finish(&conflicted).unwrap_err();
    assert!(matches!(error, CliError::Incomplete(_)));
    assert!(error.to_string().contains("1 conflicted"));

    let mut aborted = SyncReport::new(false);
    aborted.abort(&Error::Aborted("auth rejected".to_string()));
    assert!(finish(&aborted)
        .unwrap_err()
        .to_string()
        .contains("run aborted"));
}

#[test]
fn init_writes_config_and_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config").join("config.yaml");
    let root = dir.path().join("docs");

    let config = write_starter_config(
        &config_path,
        Some(root.clone()),
        Some(" 0123456789abcdef0123456789abcdef ".to_string()),
        false,
    )
    .unwrap();
    assert!(config_path.exists());
    assert!(root.is_dir());
    assert!(config.notion.token.is_none());

    let loaded = AppConfig::load_from_path(&config_path).unwrap();
    assert_eq!(loaded.directories.markdown_root, root);
    assert!(loaded.notion.parent_page_id.is_some());
    assert!(loaded.notion.token.is_none());

    let again = write_starter_config(&config_path, None, None, false);
    assert!(matches!(again, Err(CliError::ConfigExists(_))));
    assert!(write_starter_config(&config_path, Some(root), None, true).is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn forget_removes_stored_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("docs");
    std::fs::create_dir_all(&root).unwrap();
    let file = root.join("a.md");
    std::fs::write(&file, "# A\n").unwrap();

    let mut config = AppConfig::default();
    config.directories.markdown_root = root;

    {
        let db = Database::open(config.database_path()).await.unwrap();
        let repository = LibSqlMappingRepository::new(db.connection());
        let fingerprint = Fingerprint::compute("A", &[StructuralNode::paragraph("body")]);
        repository
            .put(&MappingRecord::new("a.md", "page-1", fingerprint))
            .await
            .unwrap();
    }

    assert!(forget_mapping(&config, &file).await.unwrap());
    assert!(!forget_mapping(&config, &file).await.unwrap());
}

#[test]
fn completions_name_the_binary() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("mdsync"));
    assert!(script.contains("pull-workspace"));
}
