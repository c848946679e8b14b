use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mdsync_core::config::DEFAULT_CONFIG_PATH;
use mdsync_core::sync::{ConflictStrategy, Direction, Side};

#[derive(Parser)]
#[command(name = "mdsync")]
#[command(about = "Keep a Markdown tree and a Notion workspace in sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the YAML config file
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log per-request detail
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter config file
    Init {
        /// Markdown directory to sync
        #[arg(long, value_name = "PATH")]
        markdown_root: Option<PathBuf>,
        /// Notion page that new documents are created under
        #[arg(long, value_name = "ID")]
        parent_page_id: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Sync one Markdown file
    Sync {
        /// Markdown file to sync
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,
        /// Override the configured direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
        /// Pull this Notion page (id or URL) into the file and link them
        #[arg(long, value_name = "ID")]
        page_id: Option<String>,
        /// Classify and report without writing
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync every Markdown file under the root
    SyncAll {
        /// Override the configured Markdown root
        #[arg(short, long, value_name = "PATH")]
        directory: Option<PathBuf>,
        /// Classify and report without writing
        #[arg(long)]
        dry_run: bool,
        /// Override the configured direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
        /// Override the configured conflict strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull workspace pages into Markdown files
    PullWorkspace {
        /// Only pages whose title matches
        #[arg(short, long)]
        query: Option<String>,
        /// Directory for new files, relative to the root
        #[arg(short, long, value_name = "PATH")]
        directory: Option<PathBuf>,
        /// Classify and report without writing
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull the sub-pages of one page into Markdown files
    PullChildren {
        /// Page whose children are pulled
        #[arg(long, value_name = "ID")]
        parent_id: String,
        /// Directory for new files, relative to the root
        #[arg(short, long, value_name = "PATH")]
        directory: Option<PathBuf>,
        /// Classify and report without writing
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch the Markdown root and sync files as they change
    Watch {
        /// Override the configured direction
        #[arg(long, value_enum)]
        direction: Option<DirectionArg>,
    },
    /// Settle a pending conflict by keeping one side
    Resolve {
        /// Conflicted Markdown file
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,
        /// Side to keep
        #[arg(long, value_enum)]
        keep: KeepArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what a sync would do, without writing
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check the Notion token and parent page
    Verify {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drop the stored mapping for a file
    Forget {
        /// Markdown file to unlink
        #[arg(short, long, value_name = "PATH")]
        file: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    Push,
    Pull,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Push => Self::Push,
            DirectionArg::Pull => Self::Pull,
            DirectionArg::Both => Self::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    Local,
    Remote,
    Newer,
    Manual,
}

impl From<StrategyArg> for ConflictStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Local => Self::PreferLocal,
            StrategyArg::Remote => Self::PreferRemote,
            StrategyArg::Newer => Self::PreferNewest,
            StrategyArg::Manual => Self::Manual,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepArg {
    Local,
    Remote,
}

impl From<KeepArg> for Side {
    fn from(value: KeepArg) -> Self {
        match value {
            KeepArg::Local => Self::Local,
            KeepArg::Remote => Self::Remote,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
