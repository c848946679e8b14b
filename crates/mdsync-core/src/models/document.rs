//! Document metadata, structural documents and content fingerprints

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::StructuralNode;
use crate::remote::adapter;

const FINGERPRINT_PREFIX: &str = "sha256:";

/// Digest over a document's title and canonical body
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The baseline used for adopted documents that have no sync history
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Compute the fingerprint of a title and an already canonical body
    pub fn compute(title: &str, canonical_body: &[StructuralNode]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update([0u8]);
        // Serializing derived structs and enums cannot fail.
        let body = serde_json::to_vec(canonical_body).unwrap_or_default();
        hasher.update(&body);
        Self(format!("{FINGERPRINT_PREFIX}{}", hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First hex digits, for log lines
    pub fn short(&self) -> &str {
        let digest = self.0.strip_prefix(FINGERPRINT_PREFIX).unwrap_or(&self.0);
        digest.get(..12).unwrap_or(digest)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Metadata record attached to a document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: String,
    /// Absent exactly for documents that were never pushed
    pub remote_id: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    /// Unrecognized front-matter keys, kept in their original order
    pub extra: serde_yaml::Mapping,
}

impl DocumentMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A document as read from either side. Never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralDocument {
    metadata: DocumentMetadata,
    body: Vec<StructuralNode>,
    fingerprint: Fingerprint,
}

impl StructuralDocument {
    /// Build a document, deriving its fingerprint from the title and canonical body.
    pub fn new(metadata: DocumentMetadata, body: Vec<StructuralNode>) -> Self {
        let canonical = adapter::canonicalize(&body);
        let fingerprint = Fingerprint::compute(&metadata.title, &canonical);
        Self {
            metadata,
            body,
            fingerprint,
        }
    }

    pub const fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn body(&self) -> &[StructuralNode] {
        &self.body
    }

    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.metadata.remote_id.as_deref()
    }
}
