//! Per-document change classification
//!
//! Everything here is pure: the engine gathers fingerprints, then asks
//! [`classify`] what changed and [`plan`] what to do about it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::models::Fingerprint;

/// Which sides a run may write to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Markdown to remote only
    #[default]
    #[serde(alias = "markdown_to_notion")]
    Push,
    /// Remote to Markdown only
    #[serde(alias = "notion_to_markdown")]
    Pull,
    #[serde(alias = "bidirectional")]
    Both,
}

impl Direction {
    pub const fn allows_push(self) -> bool {
        matches!(self, Self::Push | Self::Both)
    }

    pub const fn allows_pull(self) -> bool {
        matches!(self, Self::Pull | Self::Both)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "push" | "markdown_to_notion" => Ok(Self::Push),
            "pull" | "notion_to_markdown" => Ok(Self::Pull),
            "both" | "bidirectional" => Ok(Self::Both),
            other => Err(Error::Config(format!(
                "unknown sync direction '{other}' (expected push, pull or both)"
            ))),
        }
    }
}

/// What changed since the last successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    /// Only the local document exists: never pushed, or its page is gone
    LocalOnly,
    /// Only the remote page exists
    RemoteOnly,
    Unchanged,
    LocalChanged,
    RemoteChanged,
    /// Both changed to different content
    BothChanged,
    /// Both changed to the same content
    Converged,
}

/// Classify a document from its baseline and current fingerprints.
///
/// `baseline` is the mapping record's fingerprint (empty for adopted
/// documents). A missing side is `None`. Returns `None` when neither side
/// exists.
pub fn classify(
    baseline: Option<&Fingerprint>,
    local: Option<&Fingerprint>,
    remote: Option<&Fingerprint>,
) -> Option<ChangeState> {
    let (local, remote) = match (local, remote) {
        (None, None) => return None,
        (Some(_), None) => return Some(ChangeState::LocalOnly),
        (None, Some(_)) => return Some(ChangeState::RemoteOnly),
        (Some(local), Some(remote)) => (local, remote),
    };

    let empty = Fingerprint::empty();
    let baseline = baseline.unwrap_or(&empty);
    let state = match (local == baseline, remote == baseline) {
        (true, true) => ChangeState::Unchanged,
        (false, true) => ChangeState::LocalChanged,
        (true, false) => ChangeState::RemoteChanged,
        (false, false) if local == remote => ChangeState::Converged,
        (false, false) => ChangeState::BothChanged,
    };
    Some(state)
}

/// What a sync does with one document, used in plans and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    NoOp,
    /// No data moves; the mapping catches up to content both sides share
    CatchUp,
    PushCreate,
    PushUpdate,
    PullCreate,
    PullUpdate,
    Conflict,
}

impl DecisionKind {
    pub const fn is_push(self) -> bool {
        matches!(self, Self::PushCreate | Self::PushUpdate)
    }

    pub const fn is_pull(self) -> bool {
        matches!(self, Self::PullCreate | Self::PullUpdate)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::CatchUp => "catch-up",
            Self::PushCreate => "push-create",
            Self::PushUpdate => "push-update",
            Self::PullCreate => "pull-create",
            Self::PullUpdate => "pull-update",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planned decision after the direction filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub decision: DecisionKind,
    /// Decision the direction did not allow; `decision` is then `NoOp`
    pub suppressed: Option<DecisionKind>,
}

impl Plan {
    const fn allowed(decision: DecisionKind) -> Self {
        Self {
            decision,
            suppressed: None,
        }
    }
}

/// Decision for a change state, before any conflict is resolved
pub const fn decide(state: ChangeState) -> DecisionKind {
    match state {
        ChangeState::LocalOnly => DecisionKind::PushCreate,
        ChangeState::RemoteOnly => DecisionKind::PullCreate,
        ChangeState::Unchanged => DecisionKind::NoOp,
        ChangeState::Converged => DecisionKind::CatchUp,
        ChangeState::LocalChanged => DecisionKind::PushUpdate,
        ChangeState::RemoteChanged => DecisionKind::PullUpdate,
        ChangeState::BothChanged => DecisionKind::Conflict,
    }
}

/// Collapse writes the direction does not allow into a no-op.
pub const fn gate(decision: DecisionKind, direction: Direction) -> Plan {
    let blocked = (decision.is_push() && !direction.allows_push())
        || (decision.is_pull() && !direction.allows_pull());
    if blocked {
        Plan {
            decision: DecisionKind::NoOp,
            suppressed: Some(decision),
        }
    } else {
        Plan::allowed(decision)
    }
}

/// Full transition: change state and direction to a plan.
///
/// Conflicts pass through; the winning write is gated again once resolved.
pub const fn plan(state: ChangeState, direction: Direction) -> Plan {
    gate(decide(state), direction)
}
