//! Run reports

use serde::Serialize;

use super::resolution::ConflictSummary;
use super::state::DecisionKind;
use crate::error::Error;
use crate::remote::BlockError;

/// How a single document ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pushed,
    Pulled,
    Unchanged,
    /// Waiting for a manual resolution
    Conflicted,
    Failed,
}

/// One document's result in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
    pub local_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Absent when the document failed before it could be classified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionKind>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conversion_errors: Vec<BlockError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DocumentOutcome {
    pub fn new(local_path: impl Into<String>, decision: DecisionKind, status: OutcomeStatus) -> Self {
        Self {
            local_path: local_path.into(),
            remote_id: None,
            decision: Some(decision),
            status,
            message: None,
            conflict: None,
            conversion_errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Failed outcome for `error`; block errors are kept individually.
    pub fn failed(
        local_path: impl Into<String>,
        decision: Option<DecisionKind>,
        error: &Error,
    ) -> Self {
        let mut outcome = Self::new(local_path, DecisionKind::NoOp, OutcomeStatus::Failed);
        outcome.decision = decision;
        outcome.message = Some(error.to_string());
        if let Error::Conversion(errors) = error {
            outcome.conversion_errors.clone_from(errors);
        }
        outcome
    }

    #[must_use]
    pub fn with_remote_id(mut self, remote_id: Option<String>) -> Self {
        self.remote_id = remote_id;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Aggregate result of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub pushed: usize,
    pub pulled: usize,
    pub unchanged: usize,
    pub conflicted: usize,
    pub failed: usize,
    /// Set when a fatal error stopped the run early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// Set when the run was cancelled or declined before finishing
    pub cancelled: bool,
    pub outcomes: Vec<DocumentOutcome>,
}

impl SyncReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: DocumentOutcome) {
        match outcome.status {
            OutcomeStatus::Pushed => self.pushed += 1,
            OutcomeStatus::Pulled => self.pulled += 1,
            OutcomeStatus::Unchanged => self.unchanged += 1,
            OutcomeStatus::Conflicted => self.conflicted += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn abort(&mut self, error: &Error) {
        if self.aborted.is_none() {
            self.aborted = Some(error.to_string());
        }
    }

    pub const fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Nothing failed, nothing is pending and the run finished
    pub const fn is_clean(&self) -> bool {
        self.failed == 0 && self.conflicted == 0 && self.aborted.is_none() && !self.cancelled
    }

    /// Outcomes in path order, for stable output
    pub fn sort(&mut self) {
        self.outcomes
            .sort_by(|left, right| left.local_path.cmp(&right.local_path));
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &ConflictSummary> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.conflict.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_counts_each_status() {
        let mut report = SyncReport::new(false);
        report.record(DocumentOutcome::new("a.md", DecisionKind::PushUpdate, OutcomeStatus::Pushed));
        report.record(DocumentOutcome::new("b.md", DecisionKind::PullUpdate, OutcomeStatus::Pulled));
        report.record(DocumentOutcome::new("c.md", DecisionKind::NoOp, OutcomeStatus::Unchanged));
        report.record(DocumentOutcome::new("d.md", DecisionKind::Conflict, OutcomeStatus::Conflicted));

        assert_eq!(
            (report.pushed, report.pulled, report.unchanged, report.conflicted, report.failed),
            (1, 1, 1, 1, 0)
        );
        assert_eq!(report.total(), 4);
        assert!(!report.is_clean());
    }

    #[test]
    fn failed_outcome_keeps_block_errors() {
        let error = Error::Conversion(vec![BlockError::new(7, "toggle", "unsupported block kind")]);
        let outcome = DocumentOutcome::failed("a.md", None, &error);

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.decision, None);
        assert_eq!(outcome.conversion_errors.len(), 1);
        assert_eq!(outcome.conversion_errors[0].index, 7);
        assert!(outcome.message.unwrap().contains("index 7"));
    }

    #[test]
    fn first_abort_reason_wins() {
        let mut report = SyncReport::new(true);
        report.abort(&Error::Mapping("first".into()));
        report.abort(&Error::Mapping("second".into()));
        assert!(report.aborted.unwrap().contains("first"));
    }

    #[test]
    fn report_serializes_counts_and_outcomes() {
        let mut report = SyncReport::new(false);
        report.record(DocumentOutcome::new("a.md", DecisionKind::NoOp, OutcomeStatus::Unchanged));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["unchanged"], 1);
        assert_eq!(json["outcomes"][0]["decision"], "no_op");
        assert!(json.get("aborted").is_none());
    }
}
