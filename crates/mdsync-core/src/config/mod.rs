//! YAML configuration with environment overrides
//!
//! Values are normalized on load and save: surrounding whitespace is trimmed
//! and empty strings become `None`. Notion ids are stored in dashed form.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::DEFAULT_REQUESTS_PER_SECOND;
use crate::sync::{ConflictStrategy, Direction, DEFAULT_CONCURRENCY};
use crate::util::{is_http_url, normalize_notion_id, normalize_text_option};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
pub const DEFAULT_MARKDOWN_ROOT: &str = "./docs";
pub const DEFAULT_DATABASE_PATH: &str = ".mdsync/mappings.db";
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

pub const ENV_TOKEN: &str = "NOTION_TOKEN";
pub const ENV_PARENT_PAGE_ID: &str = "NOTION_PARENT_PAGE_ID";
pub const ENV_DIRECTION: &str = "SYNC_DIRECTION";
pub const ENV_CONFLICT_RESOLUTION: &str = "SYNC_CONFLICT_RESOLUTION";
pub const ENV_MARKDOWN_ROOT: &str = "DIRECTORIES_MARKDOWN_ROOT";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub notion: NotionConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub directories: DirectoryConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotionConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub parent_page_id: Option<String>,
    /// Override for the API base URL, mainly for proxies and tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl fmt::Debug for NotionConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NotionConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("parent_page_id", &self.parent_page_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncSettings {
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub conflict_resolution: ConflictStrategy,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            conflict_resolution: ConflictStrategy::default(),
            concurrency: DEFAULT_CONCURRENCY,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryConfig {
    #[serde(default = "default_markdown_root")]
    pub markdown_root: PathBuf,
    #[serde(default = "default_excluded_patterns")]
    pub excluded_patterns: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            markdown_root: default_markdown_root(),
            excluded_patterns: default_excluded_patterns(),
        }
    }
}

/// How local documents are linked to pages
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    #[default]
    Frontmatter,
    Database,
    Filename,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingConfig {
    #[serde(default)]
    pub strategy: MappingStrategy,
    /// Mapping store location; relative paths resolve against the Markdown root
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            strategy: MappingStrategy::default(),
            database: default_database_path(),
        }
    }
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

const fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}

const fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_markdown_root() -> PathBuf {
    PathBuf::from(DEFAULT_MARKDOWN_ROOT)
}

fn default_excluded_patterns() -> Vec<String> {
    vec!["*.tmp".to_string(), "node_modules/**".to_string()]
}

fn default_database_path() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_PATH)
}

impl AppConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("failed to read config at {}: {error}", path.display()))
        })?;
        let mut config = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str::<Self>(&raw).map_err(|error| {
                Error::Config(format!("failed to parse config at {}: {error}", path.display()))
            })?
        };
        config.normalize();
        Ok(config)
    }

    /// Load from `path` and apply process environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!(
                    "failed to create config directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_yaml::to_string(&normalized)?;
        std::fs::write(path, serialized).map_err(|error| {
            Error::Config(format!("failed to write config at {}: {error}", path.display()))
        })
    }

    /// Apply overrides from `lookup`; set variables win over the file.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |key: &str| normalize_text_option(lookup(key));

        if let Some(token) = lookup(ENV_TOKEN) {
            self.notion.token = Some(token);
        }
        if let Some(parent) = lookup(ENV_PARENT_PAGE_ID) {
            self.notion.parent_page_id = Some(parent);
        }
        if let Some(direction) = lookup(ENV_DIRECTION) {
            self.sync.direction = direction.parse()?;
        }
        if let Some(strategy) = lookup(ENV_CONFLICT_RESOLUTION) {
            self.sync.conflict_resolution = strategy.parse()?;
        }
        if let Some(root) = lookup(ENV_MARKDOWN_ROOT) {
            self.directories.markdown_root = PathBuf::from(root);
        }
        self.normalize();
        Ok(())
    }

    /// Check that the configuration can drive a sync run
    pub fn validate(&self) -> Result<()> {
        if self.notion.token.is_none() {
            return Err(Error::Config(format!(
                "Notion API token is not set (notion.token or {ENV_TOKEN})"
            )));
        }
        if self.sync.direction.allows_push() && self.notion.parent_page_id.is_none() {
            return Err(Error::Config(format!(
                "Notion parent page id is required for pushes (notion.parent_page_id or {ENV_PARENT_PAGE_ID})"
            )));
        }
        if let Some(api_url) = &self.notion.api_url {
            if !is_http_url(api_url) {
                return Err(Error::Config(
                    "notion.api_url must include http:// or https://".to_string(),
                ));
            }
        }
        if self.mapping.strategy != MappingStrategy::Frontmatter {
            return Err(Error::Config(
                "only the frontmatter mapping strategy is supported".to_string(),
            ));
        }
        if self.sync.concurrency == 0 || self.sync.requests_per_second == 0 {
            return Err(Error::Config(
                "sync.concurrency and sync.requests_per_second must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Mapping store path, resolved against the Markdown root when relative
    pub fn database_path(&self) -> PathBuf {
        if self.mapping.database.is_absolute() {
            self.mapping.database.clone()
        } else {
            self.directories.markdown_root.join(&self.mapping.database)
        }
    }

    fn normalize(&mut self) {
        self.notion.token = normalize_text_option(self.notion.token.take());
        self.notion.api_url = normalize_text_option(self.notion.api_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.notion.parent_page_id = normalize_text_option(self.notion.parent_page_id.take())
            .map(|id| normalize_notion_id(&id).unwrap_or(id));
        self.directories.excluded_patterns = self
            .directories
            .excluded_patterns
            .drain(..)
            .filter_map(|pattern| normalize_text_option(Some(pattern)))
            .collect();
        if self.directories.markdown_root.as_os_str().is_empty() {
            self.directories.markdown_root = default_markdown_root();
        }
    }
}
