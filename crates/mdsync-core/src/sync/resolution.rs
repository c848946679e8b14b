//! Conflict resolution strategies

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::Fingerprint;

/// How a run settles documents that changed on both sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    #[serde(alias = "local")]
    PreferLocal,
    #[serde(alias = "remote")]
    PreferRemote,
    /// Latest modification wins; ties and unknown times go to local
    #[default]
    #[serde(alias = "newer", alias = "newest")]
    PreferNewest,
    /// Stop and wait for a [`ManualResolution`]
    Manual,
}

impl ConflictStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreferLocal => "local",
            Self::PreferRemote => "remote",
            Self::PreferNewest => "newer",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "prefer_local" => Ok(Self::PreferLocal),
            "remote" | "prefer_remote" => Ok(Self::PreferRemote),
            "newer" | "newest" | "prefer_newest" => Ok(Self::PreferNewest),
            "manual" => Ok(Self::Manual),
            other => Err(Error::Config(format!(
                "unknown conflict resolution '{other}' (expected local, remote, newer or manual)"
            ))),
        }
    }
}

/// One side of a document pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "markdown" => Ok(Self::Local),
            "remote" | "notion" => Ok(Self::Remote),
            other => Err(Error::InvalidInput(format!(
                "unknown side '{other}' (expected local or remote)"
            ))),
        }
    }
}

/// Everything a person needs to pick a side
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictSummary {
    pub local_path: String,
    pub remote_id: String,
    pub base_fingerprint: Fingerprint,
    pub local_fingerprint: Fingerprint,
    pub remote_fingerprint: Fingerprint,
    pub local_title: String,
    pub remote_title: String,
    pub local_modified: Option<DateTime<Utc>>,
    pub remote_modified: DateTime<Utc>,
}

/// A decision supplied from outside for a pending conflict.
///
/// Only applies while both sides still have the fingerprints it was made
/// against; otherwise the conflict is reported again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualResolution {
    pub keep: Side,
    pub local_fingerprint: Fingerprint,
    pub remote_fingerprint: Fingerprint,
}

impl ManualResolution {
    /// Keep `side` of the conflict as it was summarized
    pub fn for_conflict(conflict: &ConflictSummary, keep: Side) -> Self {
        Self {
            keep,
            local_fingerprint: conflict.local_fingerprint.clone(),
            remote_fingerprint: conflict.remote_fingerprint.clone(),
        }
    }

    pub fn matches(&self, conflict: &ConflictSummary) -> bool {
        self.local_fingerprint == conflict.local_fingerprint
            && self.remote_fingerprint == conflict.remote_fingerprint
    }
}

/// Outcome of applying a strategy to a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Keep(Side),
    Pending,
}

/// Pick the winning side. Never merges.
///
/// A matching manual resolution wins over the run's strategy; a stale one
/// leaves the conflict pending.
pub fn resolve(
    strategy: ConflictStrategy,
    conflict: &ConflictSummary,
    manual: Option<&ManualResolution>,
) -> Resolution {
    if let Some(manual) = manual {
        return if manual.matches(conflict) {
            Resolution::Keep(manual.keep)
        } else {
            Resolution::Pending
        };
    }

    match strategy {
        ConflictStrategy::PreferLocal => Resolution::Keep(Side::Local),
        ConflictStrategy::PreferRemote => Resolution::Keep(Side::Remote),
        ConflictStrategy::PreferNewest => match conflict.local_modified {
            Some(local) if conflict.remote_modified > local => Resolution::Keep(Side::Remote),
            _ => Resolution::Keep(Side::Local),
        },
        ConflictStrategy::Manual => Resolution::Pending,
    }
}
