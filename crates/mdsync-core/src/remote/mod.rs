//! Remote document store: block model, conversion, and transport

pub mod adapter;
mod block;
mod notion;
mod rate_limit;
mod verify;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use adapter::{from_remote_blocks, to_remote_blocks, NodeConversion, RemoteConversion};
pub use block::{Annotations, RemoteBlock, RichText};
pub use notion::NotionClient;
pub use rate_limit::{RateBudget, RateBudgetSnapshot, DEFAULT_REQUESTS_PER_SECOND};
pub use verify::{verify_access, AccessReport};

use crate::models::{DocumentMetadata, StructuralDocument};

/// Errors from the remote transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Remote document not found: {0}")]
    NotFound(String),

    #[error("Rate limited by remote; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Remote rejected credentials: {0}")]
    Auth(String),

    #[error("Remote API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// A remote block that could not be converted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockError {
    /// Position of the top-level block the failure belongs to
    pub index: usize,
    pub kind: String,
    pub message: String,
}

impl BlockError {
    pub fn new(index: usize, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            write!(f, "block at index {}: {}", self.index, self.message)
        } else {
            write!(
                f,
                "{} block at index {}: {}",
                self.kind, self.index, self.message
            )
        }
    }
}

/// A lossy but successful conversion step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub index: usize,
    pub message: String,
}

impl Degradation {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}: {}", self.index, self.message)
    }
}

/// A page as fetched from the remote side
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub title: String,
    pub last_edited: DateTime<Utc>,
    pub blocks: Vec<RemoteBlock>,
}

impl RemoteDocument {
    /// Convert into a structural document. Block errors are returned alongside
    /// whatever did convert; callers decide whether partial content is usable.
    pub fn to_structural(&self) -> (StructuralDocument, NodeConversion) {
        let mut conversion = from_remote_blocks(&self.blocks);
        let mut metadata = DocumentMetadata::titled(self.title.clone());
        metadata.remote_id = Some(self.id.clone());
        let body = std::mem::take(&mut conversion.nodes);
        (StructuralDocument::new(metadata, body), conversion)
    }
}

/// Search or listing hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePageSummary {
    pub id: String,
    pub title: String,
}

/// Identity the remote side associates with the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteUser {
    pub id: String,
    pub name: Option<String>,
}

/// Operations the sync engine needs from the remote store
#[allow(async_fn_in_trait)]
pub trait RemoteTransport {
    async fn fetch_document(&self, remote_id: &str) -> TransportResult<RemoteDocument>;

    /// Create a page under `parent_id` and return its identity
    async fn create_document(
        &self,
        parent_id: &str,
        title: &str,
        blocks: &[RemoteBlock],
    ) -> TransportResult<String>;

    /// Replace the page's content blocks; sub-pages are left in place
    async fn replace_blocks(&self, remote_id: &str, blocks: &[RemoteBlock]) -> TransportResult<()>;

    async fn rename_document(&self, remote_id: &str, title: &str) -> TransportResult<()>;

    async fn search(&self, query: &str) -> TransportResult<Vec<RemotePageSummary>>;

    async fn child_pages(&self, parent_id: &str) -> TransportResult<Vec<RemotePageSummary>>;

    /// Who the token belongs to; fails with [`TransportError::Auth`] for a bad token
    async fn current_user(&self) -> TransportResult<RemoteUser>;

    /// Id and title of a page or database without reading its content
    async fn page_summary(&self, remote_id: &str) -> TransportResult<RemotePageSummary>;
}
