//! Sync engine: per-document pipeline and batch runs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::pin::pin;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::context::SyncContext;
use super::local::{LocalFiles, LocalSnapshot};
use super::locks::PathLocks;
use super::report::{DocumentOutcome, OutcomeStatus, SyncReport};
use super::resolution::{
    resolve, ConflictStrategy, ConflictSummary, ManualResolution, Resolution, Side,
};
use super::state::{classify, gate, plan, ChangeState, DecisionKind, Direction, Plan};
use crate::db::MappingRepository;
use crate::error::{Error, Result};
use crate::markdown;
use crate::models::{Fingerprint, MappingRecord, StructuralDocument};
use crate::remote::{adapter, to_remote_blocks, RemotePageSummary, RemoteTransport, TransportError};

/// Keeps one Markdown tree and one remote workspace in step.
pub struct SyncEngine<R, M> {
    remote: R,
    mappings: M,
    files: LocalFiles,
    context: SyncContext,
    locks: PathLocks,
    cancel: CancellationToken,
}

/// Per-run switches
#[derive(Debug, Clone, Copy)]
struct Pass<'a> {
    direction: Direction,
    dry_run: bool,
    strategy: ConflictStrategy,
    manual: Option<&'a ManualResolution>,
}

/// A document to sync: a local path, plus a remote identity when the page
/// is known before the file is read.
#[derive(Debug, Clone)]
struct Target {
    path: PathBuf,
    remote_id: Option<String>,
}

impl Target {
    fn local(path: PathBuf) -> Self {
        Self {
            path,
            remote_id: None,
        }
    }
}

struct Failure {
    decision: Option<DecisionKind>,
    remote_id: Option<String>,
    error: Error,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            decision: None,
            remote_id: None,
            error,
        }
    }
}

fn failure(
    decision: Option<DecisionKind>,
    remote_id: Option<&str>,
) -> impl FnOnce(Error) -> Failure + '_ {
    move |error| Failure {
        decision,
        remote_id: remote_id.map(str::to_string),
        error,
    }
}

struct RemoteSide {
    document: StructuralDocument,
    last_edited: DateTime<Utc>,
}

/// Both sides of one document, gathered and classified
struct Inspection {
    key: String,
    local: Option<LocalSnapshot>,
    remote_id: Option<String>,
    baseline: Option<Fingerprint>,
    remote: Option<RemoteSide>,
    state: ChangeState,
    warnings: Vec<String>,
}

impl Inspection {
    fn conflict(&self) -> Option<ConflictSummary> {
        if self.state != ChangeState::BothChanged {
            return None;
        }
        let local = self.local.as_ref()?;
        let remote = self.remote.as_ref()?;
        Some(ConflictSummary {
            local_path: self.key.clone(),
            remote_id: self.remote_id.clone()?,
            base_fingerprint: self.baseline.clone().unwrap_or_default(),
            local_fingerprint: local.local.document.fingerprint().clone(),
            remote_fingerprint: remote.document.fingerprint().clone(),
            local_title: local.local.document.title().to_string(),
            remote_title: remote.document.title().to_string(),
            local_modified: local.modified,
            remote_modified: remote.last_edited,
        })
    }
}

impl<R: RemoteTransport, M: MappingRepository> SyncEngine<R, M> {
    pub fn new(remote: R, mappings: M, context: SyncContext) -> Result<Self> {
        let files = LocalFiles::new(&context.root, &context.exclude_patterns)?;
        Ok(Self {
            remote,
            mappings,
            files,
            context,
            locks: PathLocks::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to stop runs between documents
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn mappings(&self) -> &M {
        &self.mappings
    }

    pub const fn files(&self) -> &LocalFiles {
        &self.files
    }

    pub const fn context(&self) -> &SyncContext {
        &self.context
    }

    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sync one local document. Per-document errors land in the report.
    pub async fn sync_one(&self, path: &Path, direction: Direction) -> SyncReport {
        let pass = Pass {
            direction,
            dry_run: self.context.dry_run,
            strategy: self.context.strategy,
            manual: None,
        };
        self.run_batch(vec![Target::local(path.to_path_buf())], pass, SyncReport::new(pass.dry_run))
            .await
    }

    /// Pull `page_id` into `path` and link the two, whatever page the file
    /// named before. Diverging local content is replaced by the page; edits
    /// made since the last sync of the same page are kept and reported.
    pub async fn pull_page(&self, page_id: &str, path: &Path) -> SyncReport {
        let target = Target {
            path: path.to_path_buf(),
            remote_id: Some(page_id.to_string()),
        };
        let pass = Pass {
            direction: Direction::Pull,
            dry_run: self.context.dry_run,
            strategy: ConflictStrategy::PreferRemote,
            manual: None,
        };
        tracing::info!("Pulling page {page_id} into {}", path.display());
        self.run_batch(vec![target], pass, SyncReport::new(pass.dry_run))
            .await
    }

    /// Sync every document under the root
    pub async fn sync_all(&self, direction: Direction, dry_run: bool) -> Result<SyncReport> {
        let targets = self
            .files
            .list_documents()?
            .into_iter()
            .map(Target::local)
            .collect();
        let pass = Pass {
            direction,
            dry_run,
            strategy: self.context.strategy,
            manual: None,
        };
        tracing::info!(
            "Syncing {} (direction: {direction}, dry run: {dry_run})",
            self.files.root().display()
        );
        Ok(self.run_batch(targets, pass, SyncReport::new(dry_run)).await)
    }

    /// Pull every page matching `query` (all pages when absent) into
    /// `directory`, or the root. `confirm` sees the page list first.
    pub async fn pull_workspace(
        &self,
        query: Option<&str>,
        directory: Option<&Path>,
        confirm: impl FnOnce(&[RemotePageSummary]) -> bool,
    ) -> Result<SyncReport> {
        let pages = self.remote.search(query.unwrap_or_default()).await?;
        self.pull_pages(pages, directory, confirm).await
    }

    /// Pull the direct sub-pages of `parent_id`
    pub async fn pull_children(
        &self,
        parent_id: &str,
        directory: Option<&Path>,
        confirm: impl FnOnce(&[RemotePageSummary]) -> bool,
    ) -> Result<SyncReport> {
        let pages = self.remote.child_pages(parent_id).await?;
        self.pull_pages(pages, directory, confirm).await
    }

    /// Settle a pending conflict with an explicit choice. The choice
    /// overrides the configured direction.
    pub async fn resolve(&self, path: &Path, resolution: &ManualResolution) -> SyncReport {
        let pass = Pass {
            direction: Direction::Both,
            dry_run: false,
            strategy: self.context.strategy,
            manual: Some(resolution),
        };
        self.run_batch(vec![Target::local(path.to_path_buf())], pass, SyncReport::new(false))
            .await
    }

    /// Current conflict for `path`, whatever the configured strategy would do
    pub async fn conflict(&self, path: &Path) -> Result<Option<ConflictSummary>> {
        let target = Target::local(path.to_path_buf());
        let key = self.files.key_for(path);
        let _guard = self.locks.lock(&key).await;
        let inspection = self
            .inspect(key, &target)
            .await
            .map_err(|failure| failure.error)?;
        Ok(inspection.conflict())
    }

    /// Drop the mapping for `path`. Neither side is touched.
    pub async fn forget(&self, path: &Path) -> Result<bool> {
        let key = self.files.key_for(path);
        let _guard = self.locks.lock(&key).await;
        let removed = self.mappings.delete(&key).await?;
        if removed {
            tracing::info!("Forgot mapping for {key}");
        }
        Ok(removed)
    }

    /// Move the mapping of a renamed file to its new path
    pub async fn relocate(&self, from: &Path, to: &Path) -> Result<bool> {
        let from_key = self.files.key_for(from);
        let to_key = self.files.key_for(to);
        if from_key == to_key {
            return Ok(false);
        }
        // Fixed order so two opposite renames cannot deadlock.
        let (first, second) = if from_key < to_key {
            (&from_key, &to_key)
        } else {
            (&to_key, &from_key)
        };
        let _first = self.locks.lock(first).await;
        let _second = self.locks.lock(second).await;
        let moved = self.mappings.rename(&from_key, &to_key).await?;
        if moved {
            tracing::info!("Mapping moved from {from_key} to {to_key}");
        }
        Ok(moved)
    }

    async fn pull_pages(
        &self,
        pages: Vec<RemotePageSummary>,
        directory: Option<&Path>,
        confirm: impl FnOnce(&[RemotePageSummary]) -> bool,
    ) -> Result<SyncReport> {
        let dry_run = self.context.dry_run;
        let mut report = SyncReport::new(dry_run);

        let mut seen = HashSet::new();
        let pages: Vec<RemotePageSummary> = pages
            .into_iter()
            .filter(|page| seen.insert(page.id.clone()))
            .collect();
        if pages.is_empty() {
            tracing::info!("No remote pages to pull");
            return Ok(report);
        }
        if !confirm(&pages) {
            report.cancelled = true;
            return Ok(report);
        }

        let directory = match directory {
            Some(directory) if directory.is_absolute() => directory.to_path_buf(),
            Some(directory) => self.files.root().join(directory),
            None => self.files.root().to_path_buf(),
        };
        let mut reserved = HashSet::new();
        let mut targets = Vec::with_capacity(pages.len());
        for page in pages {
            let path = match self.mappings.find_by_remote_id(&page.id).await? {
                Some(record) => self.files.path_for(&record.local_path),
                None => self
                    .files
                    .available_path(&directory, &page.title, &page.id, &mut reserved),
            };
            targets.push(Target {
                path,
                remote_id: Some(page.id),
            });
        }

        let pass = Pass {
            direction: Direction::Pull,
            dry_run,
            strategy: self.context.strategy,
            manual: None,
        };
        Ok(self.run_batch(targets, pass, report).await)
    }

    /// Run targets concurrently. A fatal error stops new documents from
    /// starting; documents already in flight finish.
    async fn run_batch(&self, targets: Vec<Target>, pass: Pass<'_>, mut report: SyncReport) -> SyncReport {
        let stop = self.cancel.child_token();
        let mut outcomes = pin!(stream::iter(targets)
            .map(|target| {
                let stop = stop.clone();
                async move {
                    if stop.is_cancelled() {
                        return None;
                    }
                    Some(self.process(&target, pass).await)
                }
            })
            .buffer_unordered(self.context.concurrency.max(1)));

        while let Some(result) = outcomes.next().await {
            let Some((outcome, fatal)) = result else {
                continue;
            };
            if let Some(error) = fatal {
                tracing::warn!("Stopping run: {error}");
                report.abort(&error);
                stop.cancel();
            }
            report.record(outcome);
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
        }
        report.sort();
        report
    }

    async fn process(&self, target: &Target, pass: Pass<'_>) -> (DocumentOutcome, Option<Error>) {
        let key = self.files.key_for(&target.path);
        match self.sync_document(key.clone(), target, pass).await {
            Ok(outcome) => (outcome, None),
            Err(failure) => {
                tracing::warn!("{key}: {}", failure.error);
                let outcome = DocumentOutcome::failed(key, failure.decision, &failure.error)
                    .with_remote_id(failure.remote_id);
                let fatal = failure.error.is_fatal().then_some(failure.error);
                (outcome, fatal)
            }
        }
    }

    /// Read local, fetch remote, classify, resolve, write, commit.
    async fn sync_document(
        &self,
        key: String,
        target: &Target,
        pass: Pass<'_>,
    ) -> std::result::Result<DocumentOutcome, Failure> {
        let _guard = self.locks.lock(&key).await;
        let mut inspection = self.inspect(key, target).await?;

        let mut planned = plan(inspection.state, pass.direction);
        let mut conflict = None;
        if planned.decision == DecisionKind::Conflict {
            let summary = inspection.conflict();
            let resolution = summary
                .as_ref()
                .map_or(Resolution::Pending, |summary| {
                    resolve(pass.strategy, summary, pass.manual)
                });
            match resolution {
                Resolution::Pending => {
                    let message = if pass.manual.is_some() {
                        "both sides changed again since the conflict was reported"
                    } else {
                        "both sides changed; resolve by keeping local or remote"
                    };
                    tracing::warn!("{}: conflict pending", inspection.key);
                    let mut outcome = DocumentOutcome::new(
                        inspection.key,
                        DecisionKind::Conflict,
                        OutcomeStatus::Conflicted,
                    )
                    .with_remote_id(inspection.remote_id)
                    .with_message(message)
                    .with_warnings(inspection.warnings);
                    outcome.conflict = summary;
                    return Ok(outcome);
                }
                Resolution::Keep(side) => {
                    let winner = match side {
                        Side::Local => DecisionKind::PushUpdate,
                        Side::Remote => DecisionKind::PullUpdate,
                    };
                    tracing::info!("{}: conflict resolved, keeping {side:?}", inspection.key);
                    planned = gate(winner, pass.direction);
                    conflict = summary;
                }
            }
        }

        if let Some(suppressed) = planned.suppressed {
            let warning = format!("{suppressed} skipped: direction is {}", pass.direction);
            tracing::warn!("{}: {warning}", inspection.key);
            inspection.warnings.push(warning);
        }

        let decision = planned.decision;
        let status = if decision.is_push() {
            OutcomeStatus::Pushed
        } else if decision.is_pull() {
            OutcomeStatus::Pulled
        } else {
            OutcomeStatus::Unchanged
        };

        if !pass.dry_run {
            self.execute(&mut inspection, planned, target)
                .await
                .map_err(failure(Some(decision), inspection.remote_id.as_deref()))?;
        }

        if decision != DecisionKind::NoOp || planned.suppressed.is_some() {
            tracing::info!(
                "{}: {decision}{}",
                inspection.key,
                if pass.dry_run { " (dry run)" } else { "" }
            );
        }
        let mut outcome = DocumentOutcome::new(inspection.key, decision, status)
            .with_remote_id(inspection.remote_id)
            .with_warnings(inspection.warnings);
        outcome.conflict = conflict;
        Ok(outcome)
    }

    async fn inspect(
        &self,
        key: String,
        target: &Target,
    ) -> std::result::Result<Inspection, Failure> {
        let local = self.files.read(&target.path).await?;
        let record = self.mappings.get(&key).await?;

        // An explicit target page wins, then front-matter, then the stored record.
        let remote_id = target
            .remote_id
            .clone()
            .or_else(|| {
                local
                    .as_ref()
                    .and_then(|snapshot| snapshot.local.document.remote_id().map(str::to_string))
            })
            .or_else(|| record.as_ref().map(|record| record.remote_id.clone()));
        let baseline = record
            .filter(|record| Some(&record.remote_id) == remote_id.as_ref())
            .map(|record| record.last_synced_fingerprint);

        let mut warnings = Vec::new();
        let remote = match &remote_id {
            Some(id) => self
                .fetch_remote(id, &mut warnings)
                .await
                .map_err(failure(None, Some(id.as_str())))?,
            None => None,
        };

        let state = classify(
            baseline.as_ref(),
            local
                .as_ref()
                .map(|snapshot| snapshot.local.document.fingerprint()),
            remote.as_ref().map(|side| side.document.fingerprint()),
        )
        .ok_or_else(|| Failure {
            decision: None,
            remote_id: remote_id.clone(),
            error: Error::local_io(
                &target.path,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no local file and no remote page",
                ),
            ),
        })?;

        tracing::debug!(
            "{key}: {state:?} (base {}, local {}, remote {})",
            baseline.as_ref().map_or("-", Fingerprint::short),
            local
                .as_ref()
                .map_or("-", |snapshot| snapshot.local.document.fingerprint().short()),
            remote
                .as_ref()
                .map_or("-", |side| side.document.fingerprint().short()),
        );

        Ok(Inspection {
            key,
            local,
            remote_id,
            baseline,
            remote,
            state,
            warnings,
        })
    }

    /// Fetch and convert a page. A missing page is `None`; any block that
    /// fails to convert fails the whole document.
    async fn fetch_remote(&self, remote_id: &str, warnings: &mut Vec<String>) -> Result<Option<RemoteSide>> {
        let page = match self.remote.fetch_document(remote_id).await {
            Ok(page) => page,
            Err(TransportError::NotFound(_)) => {
                let warning = format!("remote page {remote_id} not found; treating document as new");
                tracing::warn!("{warning}");
                warnings.push(warning);
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        };

        let (document, conversion) = page.to_structural();
        for degradation in &conversion.degradations {
            tracing::warn!("{remote_id}: {degradation}");
            warnings.push(degradation.to_string());
        }
        if !conversion.is_complete() {
            for error in &conversion.errors {
                tracing::warn!("{remote_id}: {error}");
            }
            return Err(Error::Conversion(conversion.errors));
        }

        Ok(Some(RemoteSide {
            document,
            last_edited: page.last_edited,
        }))
    }

    async fn execute(&self, inspection: &mut Inspection, planned: Plan, target: &Target) -> Result<()> {
        match planned.decision {
            DecisionKind::NoOp | DecisionKind::CatchUp | DecisionKind::Conflict => {
                let (Some(local), Some(remote_id)) = (&inspection.local, &inspection.remote_id)
                else {
                    return Ok(());
                };
                if planned.decision == DecisionKind::CatchUp {
                    let fingerprint = local.local.document.fingerprint().clone();
                    self.commit(&inspection.key, remote_id, fingerprint).await?;
                }
                // A push interrupted before its front-matter stamp leaves the
                // identity only in the mapping store.
                if planned.suppressed.is_none()
                    && inspection.remote.is_some()
                    && local.local.document.remote_id() != Some(remote_id.as_str())
                {
                    self.stamp(local, remote_id, false).await?;
                }
                Ok(())
            }
            DecisionKind::PushCreate => self.push_create(inspection).await,
            DecisionKind::PushUpdate => self.push_update(inspection).await,
            DecisionKind::PullCreate | DecisionKind::PullUpdate => {
                self.pull(inspection, target).await
            }
        }
    }

    async fn push_create(&self, inspection: &mut Inspection) -> Result<()> {
        let local = inspection
            .local
            .as_ref()
            .ok_or_else(|| Error::InvalidInput("nothing to push".to_string()))?;
        let parent_id = self.context.parent_id.as_deref().ok_or_else(|| {
            Error::Config("no parent page configured for new documents".to_string())
        })?;

        let document = &local.local.document;
        let conversion = to_remote_blocks(document.body());
        for degradation in &conversion.degradations {
            tracing::warn!("{}: {degradation}", inspection.key);
            inspection.warnings.push(degradation.to_string());
        }

        let remote_id = self
            .remote
            .create_document(parent_id, document.title(), &conversion.blocks)
            .await?;
        // Commit before stamping so a failed stamp cannot cause a second page.
        self.commit(&inspection.key, &remote_id, document.fingerprint().clone())
            .await?;
        inspection.remote_id = Some(remote_id.clone());
        self.stamp(local, &remote_id, true).await
    }

    async fn push_update(&self, inspection: &mut Inspection) -> Result<()> {
        let (Some(local), Some(remote_id)) = (&inspection.local, &inspection.remote_id) else {
            return Err(Error::InvalidInput("nothing to push".to_string()));
        };
        let document = &local.local.document;
        let conversion = to_remote_blocks(document.body());
        for degradation in &conversion.degradations {
            tracing::warn!("{}: {degradation}", inspection.key);
            inspection.warnings.push(degradation.to_string());
        }

        let remote_title = inspection
            .remote
            .as_ref()
            .map(|remote| remote.document.title());
        if remote_title != Some(document.title()) {
            self.remote.rename_document(remote_id, document.title()).await?;
        }
        self.remote.replace_blocks(remote_id, &conversion.blocks).await?;
        self.commit(&inspection.key, remote_id, document.fingerprint().clone())
            .await?;
        self.stamp(local, remote_id, true).await
    }

    /// Write the remote document and commit what the written file reads back as.
    async fn pull(&self, inspection: &mut Inspection, target: &Target) -> Result<()> {
        let (Some(remote), Some(remote_id)) = (&inspection.remote, &inspection.remote_id) else {
            return Err(Error::InvalidInput("nothing to pull".to_string()));
        };

        let mut metadata = inspection
            .local
            .as_ref()
            .map(|snapshot| snapshot.local.document.metadata().clone())
            .unwrap_or_default();
        metadata.title = remote.document.title().to_string();
        metadata.remote_id = Some(remote_id.clone());
        metadata.last_synced = Some(Utc::now());

        let body = markdown::render_body(remote.document.body());
        let content = markdown::render_document(&metadata, &body)?;
        let path = inspection
            .local
            .as_ref()
            .map_or(target.path.as_path(), |snapshot| snapshot.path.as_path());
        self.files.write(path, &content).await?;

        // The baseline is what the file reads back as, not what was fetched.
        let written = markdown::parse_document(&content, remote.document.title())?;
        let fingerprint = written.document.fingerprint().clone();
        let degraded = adapter::remote_projection(written.document.body())
            != adapter::remote_projection(remote.document.body());
        let remote_id = remote_id.clone();
        if degraded {
            let warning = "pulled content does not read back identically from Markdown".to_string();
            tracing::warn!("{}: {warning}", inspection.key);
            inspection.warnings.push(warning);
        }
        self.commit(&inspection.key, &remote_id, fingerprint).await
    }

    /// Rewrite only the front-matter identity; the body text is kept verbatim.
    async fn stamp(&self, snapshot: &LocalSnapshot, remote_id: &str, synced: bool) -> Result<()> {
        let mut metadata = snapshot.local.document.metadata().clone();
        metadata.remote_id = Some(remote_id.to_string());
        if synced {
            metadata.last_synced = Some(Utc::now());
        }
        let content = markdown::render_document(&metadata, &snapshot.local.raw_body)?;
        self.files.write(&snapshot.path, &content).await
    }

    async fn commit(&self, key: &str, remote_id: &str, fingerprint: Fingerprint) -> Result<()> {
        tracing::debug!("{key}: committing mapping at {}", fingerprint.short());
        self.mappings
            .put(&MappingRecord::new(key, remote_id, fingerprint))
            .await
    }
}
