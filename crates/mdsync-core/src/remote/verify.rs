//! Token and parent page check, run before the first sync

use serde::Serialize;

use super::{RemotePageSummary, RemoteTransport, RemoteUser};
use crate::error::{Error, Result};
use crate::util::normalize_notion_id;

/// What a successful access check found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub user: RemoteUser,
    /// Parent page with its id in dashed form
    pub parent: Option<RemotePageSummary>,
}

/// Confirm the token is accepted and, when given, that the parent page
/// (a bare id, dashed id or page URL) can be read.
pub async fn verify_access<R: RemoteTransport>(
    remote: &R,
    parent_id: Option<&str>,
) -> Result<AccessReport> {
    let user = remote.current_user().await?;
    tracing::info!(user = %user.id, "Token accepted");

    let parent = match parent_id {
        Some(raw) => {
            let id = normalize_notion_id(raw).ok_or_else(|| {
                Error::Config(format!("`{raw}` is not a Notion page id or page URL"))
            })?;
            let summary = remote.page_summary(&id).await?;
            tracing::info!(parent = %id, title = %summary.title, "Parent page reachable");
            Some(RemotePageSummary {
                id,
                title: summary.title,
            })
        }
        None => None,
    };

    Ok(AccessReport { user, parent })
}
