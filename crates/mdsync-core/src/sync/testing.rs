//! In-memory remote store for engine tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::models::StructuralNode;
use crate::remote::{
    to_remote_blocks, RemoteBlock, RemoteDocument, RemotePageSummary, RemoteTransport,
    RemoteUser, TransportError, TransportResult,
};

#[derive(Debug, Default)]
struct State {
    pages: BTreeMap<String, RemoteDocument>,
    parents: HashMap<String, String>,
    next_id: usize,
    writes: usize,
    fail_auth: bool,
}

/// Remote pages held in memory. Every mutating call counts as a write.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a page built from structural nodes
    pub fn insert_page(
        &self,
        id: &str,
        title: &str,
        nodes: &[StructuralNode],
        last_edited: DateTime<Utc>,
    ) {
        self.insert_raw(id, title, to_remote_blocks(nodes).blocks, last_edited);
    }

    /// Insert or replace a page with blocks exactly as given
    pub fn insert_raw(
        &self,
        id: &str,
        title: &str,
        blocks: Vec<RemoteBlock>,
        last_edited: DateTime<Utc>,
    ) {
        self.state().pages.insert(
            id.to_string(),
            RemoteDocument {
                id: id.to_string(),
                title: title.to_string(),
                last_edited,
                blocks,
            },
        );
    }

    pub fn set_parent(&self, id: &str, parent_id: &str) {
        self.state()
            .parents
            .insert(id.to_string(), parent_id.to_string());
    }

    pub fn page(&self, id: &str) -> Option<RemoteDocument> {
        self.state().pages.get(id).cloned()
    }

    pub fn page_count(&self) -> usize {
        self.state().pages.len()
    }

    pub fn remove_page(&self, id: &str) {
        self.state().pages.remove(id);
    }

    /// Number of create, replace and rename calls so far
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Make every later call fail with an authentication error
    pub fn fail_auth(&self) {
        self.state().fail_auth = true;
    }

    fn check_auth(state: &State) -> TransportResult<()> {
        if state.fail_auth {
            Err(TransportError::Auth("token revoked".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RemoteTransport for MemoryRemote {
    async fn fetch_document(&self, remote_id: &str) -> TransportResult<RemoteDocument> {
        let state = self.state();
        Self::check_auth(&state)?;
        state
            .pages
            .get(remote_id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(remote_id.to_string()))
    }

    async fn create_document(
        &self,
        parent_id: &str,
        title: &str,
        blocks: &[RemoteBlock],
    ) -> TransportResult<String> {
        let mut state = self.state();
        Self::check_auth(&state)?;
        state.next_id += 1;
        state.writes += 1;
        let id = format!("page-{:04}", state.next_id);
        state.pages.insert(
            id.clone(),
            RemoteDocument {
                id: id.clone(),
                title: title.to_string(),
                last_edited: Utc::now(),
                blocks: blocks.to_vec(),
            },
        );
        state.parents.insert(id.clone(), parent_id.to_string());
        Ok(id)
    }

    async fn replace_blocks(&self, remote_id: &str, blocks: &[RemoteBlock]) -> TransportResult<()> {
        let mut state = self.state();
        Self::check_auth(&state)?;
        state.writes += 1;
        let page = state
            .pages
            .get_mut(remote_id)
            .ok_or_else(|| TransportError::NotFound(remote_id.to_string()))?;
        page.blocks = blocks.to_vec();
        page.last_edited = Utc::now();
        Ok(())
    }

    async fn rename_document(&self, remote_id: &str, title: &str) -> TransportResult<()> {
        let mut state = self.state();
        Self::check_auth(&state)?;
        state.writes += 1;
        let page = state
            .pages
            .get_mut(remote_id)
            .ok_or_else(|| TransportError::NotFound(remote_id.to_string()))?;
        page.title = title.to_string();
        page.last_edited = Utc::now();
        Ok(())
    }

    async fn search(&self, query: &str) -> TransportResult<Vec<RemotePageSummary>> {
        let state = self.state();
        Self::check_auth(&state)?;
        let query = query.to_lowercase();
        Ok(state
            .pages
            .values()
            .filter(|page| page.title.to_lowercase().contains(&query))
            .map(|page| RemotePageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
            })
            .collect())
    }

    async fn child_pages(&self, parent_id: &str) -> TransportResult<Vec<RemotePageSummary>> {
        let state = self.state();
        Self::check_auth(&state)?;
        Ok(state
            .pages
            .values()
            .filter(|page| state.parents.get(&page.id).is_some_and(|parent| parent == parent_id))
            .map(|page| RemotePageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
            })
            .collect())
    }

    async fn current_user(&self) -> TransportResult<RemoteUser> {
        Self::check_auth(&self.state())?;
        Ok(RemoteUser {
            id: "memory-user".to_string(),
            name: Some("Memory".to_string()),
        })
    }

    async fn page_summary(&self, remote_id: &str) -> TransportResult<RemotePageSummary> {
        let state = self.state();
        Self::check_auth(&state)?;
        state
            .pages
            .get(remote_id)
            .map(|page| RemotePageSummary {
                id: page.id.clone(),
                title: page.title.clone(),
            })
            .ok_or_else(|| TransportError::NotFound(remote_id.to_string()))
    }
}
