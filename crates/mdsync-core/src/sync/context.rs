//! Settings threaded through one sync run

use std::path::PathBuf;
use std::time::Duration;

use super::resolution::ConflictStrategy;
use super::state::Direction;
use crate::config::AppConfig;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Everything a run needs to know besides its collaborators.
///
/// Each run owns its context, so watch sessions on different roots can
/// coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncContext {
    pub root: PathBuf,
    pub direction: Direction,
    pub dry_run: bool,
    pub strategy: ConflictStrategy,
    /// Where new pages are created; required for pushes of unmapped documents
    pub parent_id: Option<String>,
    pub exclude_patterns: Vec<String>,
    pub concurrency: usize,
    /// Quiet period before a watched file is synced
    pub debounce: Duration,
}

impl SyncContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            direction: Direction::default(),
            dry_run: false,
            strategy: ConflictStrategy::default(),
            parent_id: None,
            exclude_patterns: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            root: config.directories.markdown_root.clone(),
            direction: config.sync.direction,
            dry_run: false,
            strategy: config.sync.conflict_resolution,
            parent_id: config.notion.parent_page_id.clone(),
            exclude_patterns: config.directories.excluded_patterns.clone(),
            concurrency: config.sync.concurrency.max(1),
            debounce: Duration::from_millis(config.sync.debounce_ms),
        }
    }

    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_copies_run_settings() {
        let mut config = AppConfig::default();
        config.sync.direction = Direction::Both;
        config.sync.conflict_resolution = ConflictStrategy::Manual;
        config.notion.parent_page_id = Some("parent".to_string());
        config.directories.excluded_patterns = vec!["*.tmp".to_string()];

        let context = SyncContext::from_config(&config);
        assert_eq!(context.direction, Direction::Both);
        assert_eq!(context.strategy, ConflictStrategy::Manual);
        assert_eq!(context.parent_id.as_deref(), Some("parent"));
        assert_eq!(context.exclude_patterns, vec!["*.tmp".to_string()]);
        assert!(!context.dry_run);
        assert_eq!(context.debounce, DEFAULT_DEBOUNCE);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        assert_eq!(SyncContext::new(".").with_concurrency(0).concurrency, 1);
    }
}
