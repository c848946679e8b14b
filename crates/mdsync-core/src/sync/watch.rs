//! Watch mode: filesystem notifications, debounced per path.
//!
//! Events are collapsed per path until the path has been quiet for the
//! debounce window; the latest on-disk state is then synced.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::engine::SyncEngine;
use super::local::LocalFiles;
use super::report::SyncReport;
use super::state::Direction;
use crate::db::MappingRepository;
use crate::error::{Error, Result};
use crate::remote::RemoteTransport;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved { from: PathBuf },
}

/// A change to one Markdown file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl FileChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Pending changes, keyed by path, each with its own deadline
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, (Instant, ChangeKind)>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Record a change; the path's window restarts at `now`.
    pub fn push(&mut self, change: FileChange, now: Instant) {
        let deadline = now + self.window;
        if let ChangeKind::Moved { from } = &change.kind {
            self.pending.remove(from);
        }
        let kind = match (self.pending.remove(&change.path), change.kind) {
            // Editors often save by deleting and recreating the file.
            (Some((_, ChangeKind::Deleted)), ChangeKind::Created) => ChangeKind::Modified,
            (Some((_, earlier @ (ChangeKind::Created | ChangeKind::Moved { .. }))), ChangeKind::Modified) => {
                earlier
            }
            (_, kind) => kind,
        };
        self.pending.insert(change.path, (deadline, kind));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(deadline, _)| *deadline).min()
    }

    /// Changes whose window has closed, in path order
    pub fn due(&mut self, now: Instant) -> Vec<FileChange> {
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut changes: Vec<FileChange> = ready
            .into_iter()
            .filter_map(|path| {
                self.pending
                    .remove(&path)
                    .map(|(_, kind)| FileChange::new(path, kind))
            })
            .collect();
        changes.sort_by(|left, right| left.path.cmp(&right.path));
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Translate a notify event into changes to files the tree syncs
pub fn changes_from_event(event: &Event, files: &LocalFiles) -> Vec<FileChange> {
    let candidate = |path: &PathBuf| files.is_candidate(path);
    let each = |kind: ChangeKind| {
        event
            .paths
            .iter()
            .filter(|path| candidate(path))
            .map(|path| FileChange::new(path.clone(), kind.clone()))
            .collect::<Vec<_>>()
    };

    match event.kind {
        EventKind::Create(_) => each(ChangeKind::Created),
        EventKind::Remove(_) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => match (candidate(from), candidate(to)) {
                (true, true) => vec![FileChange::new(
                    to.clone(),
                    ChangeKind::Moved { from: from.clone() },
                )],
                // A temp file renamed over the target is an atomic save.
                (false, true) => vec![FileChange::new(to.clone(), ChangeKind::Modified)],
                (true, false) => vec![FileChange::new(from.clone(), ChangeKind::Deleted)],
                (false, false) => Vec::new(),
            },
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => each(ChangeKind::Created),
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .filter(|path| candidate(path))
            .map(|path| {
                let kind = if path.exists() {
                    ChangeKind::Created
                } else {
                    ChangeKind::Deleted
                };
                FileChange::new(path.clone(), kind)
            })
            .collect(),
        EventKind::Modify(_) => each(ChangeKind::Modified),
        _ => Vec::new(),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl<R: RemoteTransport, M: MappingRepository> SyncEngine<R, M> {
    /// Watch the root and sync changed documents until cancelled.
    ///
    /// Returns an error when the watcher cannot start or a fatal error stops
    /// a document run.
    pub async fn watch(&self, direction: Direction) -> Result<()> {
        let root = self.files().root().to_path_buf();
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);
        let mut watcher = RecommendedWatcher::new(
            move |result| {
                let _ = tx.blocking_send(result);
            },
            Config::default(),
        )
        .map_err(|error| Error::Config(format!("cannot start file watcher: {error}")))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|error| Error::Config(format!("cannot watch {}: {error}", root.display())))?;

        let window = self.context().debounce;
        info!(
            "Watching {} (direction: {direction}, debounce: {}ms)",
            root.display(),
            window.as_millis()
        );

        let cancel = self.cancellation().clone();
        let mut debouncer = Debouncer::new(window);
        loop {
            let deadline = debouncer.next_deadline();
            tokio::select! {
                () = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(Ok(event)) => {
                        for change in changes_from_event(&event, self.files()) {
                            debug!("{:?}: {}", change.kind, change.path.display());
                            debouncer.push(change, Instant::now());
                        }
                    }
                    Some(Err(error)) => warn!("File watcher error: {error}"),
                    None => break,
                },
                () = sleep_until(deadline) => {
                    for change in debouncer.due(Instant::now()) {
                        if cancel.is_cancelled() {
                            break;
                        }
                        match self.apply_change(&change, direction).await {
                            Ok(Some(report)) => {
                                if let Some(reason) = report.aborted {
                                    return Err(Error::Aborted(reason));
                                }
                            }
                            Ok(None) => {}
                            Err(error) if error.is_fatal() => return Err(error),
                            Err(error) => warn!("{}: {error}", change.path.display()),
                        }
                    }
                }
            }
        }

        info!("Stopped watching {}", root.display());
        Ok(())
    }

    /// Act on one debounced change. Deletions only drop the mapping; the
    /// remote page is kept.
    pub async fn apply_change(
        &self,
        change: &FileChange,
        direction: Direction,
    ) -> Result<Option<SyncReport>> {
        match &change.kind {
            ChangeKind::Deleted if !change.path.exists() => {
                self.forget(&change.path).await?;
                Ok(None)
            }
            ChangeKind::Moved { from } => {
                self.relocate(from, &change.path).await?;
                Ok(Some(self.sync_one(&change.path, direction).await))
            }
            _ if change.path.exists() => Ok(Some(self.sync_one(&change.path, direction).await)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, LibSqlMappingRepository};
    use crate::sync::context::SyncContext;
    use crate::sync::state::DecisionKind;
    use crate::sync::testing::MemoryRemote;
    use notify::event::{CreateKind, RemoveKind};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    const WINDOW: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn quiet_window_restarts_on_every_event() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.push(FileChange::new("a.md", ChangeKind::Modified), Instant::now());
        tokio::time::advance(Duration::from_millis(1500)).await;
        debouncer.push(FileChange::new("a.md", ChangeKind::Modified), Instant::now());
        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(debouncer.due(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_millis(500)).await;
        let due = debouncer.due(Instant::now());
        assert_eq!(due, vec![FileChange::new("a.md", ChangeKind::Modified)]);
        assert!(debouncer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn paths_debounce_independently() {
        let mut debouncer = Debouncer::new(WINDOW);
        debouncer.push(FileChange::new("a.md", ChangeKind::Modified), Instant::now());
        tokio::time::advance(Duration::from_secs(1)).await;
        debouncer.push(FileChange::new("b.md", ChangeKind::Created), Instant::now());
        tokio::time::advance(Duration::from_secs(1)).await;

        let due = debouncer.due(Instant::now());
        assert_eq!(due, vec![FileChange::new("a.md", ChangeKind::Modified)]);
        assert_eq!(
            debouncer.next_deadline(),
            Some(Instant::now() + Duration::from_secs(1))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_collapse_to_what_happened() {
        let mut debouncer = Debouncer::new(WINDOW);
        let now = Instant::now();
        debouncer.push(FileChange::new("saved.md", ChangeKind::Deleted), now);
        debouncer.push(FileChange::new("saved.md", ChangeKind::Created), now);
        debouncer.push(FileChange::new("new.md", ChangeKind::Created), now);
        debouncer.push(FileChange::new("new.md", ChangeKind::Modified), now);
        debouncer.push(FileChange::new("old.md", ChangeKind::Modified), now);
        debouncer.push(
            FileChange::new(
                "moved.md",
                ChangeKind::Moved {
                    from: PathBuf::from("old.md"),
                },
            ),
            now,
        );

        let due = debouncer.due(now + WINDOW);
        assert_eq!(
            due,
            vec![
                FileChange::new(
                    "moved.md",
                    ChangeKind::Moved {
                        from: PathBuf::from("old.md")
                    }
                ),
                FileChange::new("new.md", ChangeKind::Created),
                FileChange::new("saved.md", ChangeKind::Modified),
            ]
        );
    }

    #[test]
    fn events_map_to_markdown_changes() {
        let tmp = tempdir().unwrap();
        let files = LocalFiles::new(tmp.path(), &[]).unwrap();
        let root = files.root().to_path_buf();
        let doc = root.join("a.md");
        let temp = root.join(".a.md.mdsync-tmp");

        let created = Event::new(EventKind::Create(CreateKind::File)).add_path(doc.clone());
        assert_eq!(
            changes_from_event(&created, &files),
            vec![FileChange::new(doc.clone(), ChangeKind::Created)]
        );

        let removed = Event::new(EventKind::Remove(RemoveKind::File)).add_path(doc.clone());
        assert_eq!(
            changes_from_event(&removed, &files),
            vec![FileChange::new(doc.clone(), ChangeKind::Deleted)]
        );

        let atomic_save = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(temp.clone())
            .add_path(doc.clone());
        assert_eq!(
            changes_from_event(&atomic_save, &files),
            vec![FileChange::new(doc.clone(), ChangeKind::Modified)]
        );

        let renamed = root.join("b.md");
        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(doc.clone())
            .add_path(renamed.clone());
        assert_eq!(
            changes_from_event(&rename, &files),
            vec![FileChange::new(renamed, ChangeKind::Moved { from: doc })]
        );

        let ignored = Event::new(EventKind::Create(CreateKind::File)).add_path(temp);
        assert!(changes_from_event(&ignored, &files).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleted_file_drops_mapping_and_move_follows_it() {
        let tmp = tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let path = tmp.path().join("plan.md");
        std::fs::write(&path, "# Plan\n").unwrap();
        let context = SyncContext::new(tmp.path())
            .with_direction(Direction::Both)
            .with_parent_id("parent");
        let engine = SyncEngine::new(
            MemoryRemote::new(),
            LibSqlMappingRepository::new(db.connection()),
            context,
        )
        .unwrap();
        engine.sync_one(&path, Direction::Both).await;

        let moved = tmp.path().join("renamed.md");
        std::fs::rename(&path, &moved).unwrap();
        let report = engine
            .apply_change(
                &FileChange::new(moved.clone(), ChangeKind::Moved { from: path.clone() }),
                Direction::Both,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.outcomes[0].decision, Some(DecisionKind::NoOp));
        assert_eq!(engine.remote().page_count(), 1);
        assert!(engine.mappings().get("plan.md").await.unwrap().is_none());

        std::fs::remove_file(&moved).unwrap();
        let deleted = engine
            .apply_change(&FileChange::new(moved, ChangeKind::Deleted), Direction::Both)
            .await
            .unwrap();
        assert!(deleted.is_none());
        assert!(engine.mappings().all().await.unwrap().is_empty());
        assert_eq!(engine.remote().page_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watch_returns_when_cancelled() {
        let tmp = tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let token = CancellationToken::new();
        let engine = SyncEngine::new(
            MemoryRemote::new(),
            LibSqlMappingRepository::new(db.connection()),
            SyncContext::new(tmp.path()),
        )
        .unwrap()
        .with_cancellation(token.clone());

        token.cancel();
        engine.watch(Direction::Push).await.unwrap();
    }
}
