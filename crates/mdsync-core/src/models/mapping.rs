//! Mapping record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Fingerprint;

/// Durable link between one local document and one remote page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    /// Path relative to the sync root (`/`-separated) when under it
    pub local_path: String,
    /// Remote page identity
    pub remote_id: String,
    /// Fingerprint both sides had at the last successful sync
    pub last_synced_fingerprint: Fingerprint,
    /// When the last successful sync committed
    pub last_synced_at: DateTime<Utc>,
}

impl MappingRecord {
    pub fn new(
        local_path: impl Into<String>,
        remote_id: impl Into<String>,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            remote_id: remote_id.into(),
            last_synced_fingerprint: fingerprint,
            last_synced_at: Utc::now(),
        }
    }
}
