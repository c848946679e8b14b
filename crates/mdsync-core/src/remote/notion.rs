//! Notion REST client

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::util::compact_text;

use super::{
    RateBudget, RemoteBlock, RemoteDocument, RemotePageSummary, RemoteTransport, RemoteUser,
    TransportError, TransportResult,
};

const DEFAULT_API_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const MAX_BLOCKS_PER_REQUEST: usize = 100;
const PAGE_SIZE: usize = 100;
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;
const UNTITLED: &str = "Untitled";

/// Block kinds that are separate pages and never part of a document body
const SUB_PAGE_KINDS: &[&str] = &["child_page", "child_database"];

#[derive(Clone)]
pub struct NotionClient {
    api_url: String,
    token: String,
    client: Client,
    budget: RateBudget,
}

impl fmt::Debug for NotionClient {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("NotionClient")
            .field("api_url", &self.api_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl NotionClient {
    pub fn new(token: impl Into<String>, budget: RateBudget) -> TransportResult<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(TransportError::Auth(
                "Notion token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            api_url: DEFAULT_API_URL.to_string(),
            token,
            client: Client::builder().build()?,
            budget,
        })
    }

    /// Point the client at a different API root (proxies, tests)
    pub fn with_api_url(mut self, url: &str) -> TransportResult<Self> {
        self.api_url = normalize_api_url(url)?;
        Ok(self)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.api_url, path.trim_start_matches('/')))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    /// Send one API call within the shared budget, retrying on 429.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> TransportResult<Value> {
        let mut attempt = 0;
        loop {
            self.budget.acquire().await;
            let mut request = self.request(method.clone(), path);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_secs = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                if attempt >= MAX_RATE_LIMIT_RETRIES {
                    return Err(TransportError::RateLimited { retry_after_secs });
                }
                attempt += 1;
                tracing::warn!(path, retry_after_secs, attempt, "Rate limited by Notion");
                self.budget
                    .back_off(Duration::from_secs(retry_after_secs))
                    .await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(error_for_status(status, path, &body));
            }
            return Ok(response.json::<Value>().await?);
        }
    }

    async fn list_children(&self, block_id: &str) -> TransportResult<Vec<Value>> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("blocks/{block_id}/children?page_size={PAGE_SIZE}");
            if let Some(cursor) = &cursor {
                path.push_str("&start_cursor=");
                path.push_str(cursor);
            }
            let page: ListPage = parse(self.send(Method::GET, &path, None).await?)?;
            results.extend(page.results);
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(results)
    }

    fn fetch_block_tree<'a>(&'a self, block_id: &'a str) -> BoxFuture<'a, TransportResult<Vec<RemoteBlock>>> {
        async move {
            let mut blocks = Vec::new();
            for value in self.list_children(block_id).await? {
                let mut block = RemoteBlock::from_json(&value);
                if block.has_children && !SUB_PAGE_KINDS.contains(&block.kind.as_str()) {
                    if let Some(id) = block.id.clone() {
                        block.children = self.fetch_block_tree(&id).await?;
                    }
                }
                blocks.push(block);
            }
            Ok(blocks)
        }
        .boxed()
    }

    /// Append blocks in batches. Nested children go in follow-up calls against
    /// the created parent, except table rows which must arrive with their table.
    fn append_children<'a>(
        &'a self,
        parent_id: &'a str,
        blocks: &'a [RemoteBlock],
    ) -> BoxFuture<'a, TransportResult<()>> {
        async move {
            for chunk in blocks.chunks(MAX_BLOCKS_PER_REQUEST) {
                let children: Vec<Value> = chunk
                    .iter()
                    .map(|block| {
                        if block.kind == "table" {
                            block.to_json()
                        } else {
                            block.shallow().to_json()
                        }
                    })
                    .collect();
                let path = format!("blocks/{parent_id}/children");
                let created: ListPage =
                    parse(self.send(Method::PATCH, &path, Some(&json!({ "children": children }))).await?)?;

                for (block, created) in chunk.iter().zip(&created.results) {
                    if block.kind == "table" || block.children.is_empty() {
                        continue;
                    }
                    let id = created.get("id").and_then(Value::as_str).ok_or_else(|| {
                        TransportError::InvalidPayload("appended block without id".to_string())
                    })?;
                    self.append_children(id, &block.children).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// Parent object and title property name for a new page
    async fn parent_for(&self, parent_id: &str) -> TransportResult<(Value, String)> {
        match self
            .send(Method::GET, &format!("databases/{parent_id}"), None)
            .await
        {
            Ok(database) => {
                let property = title_property(&database).unwrap_or_else(|| "title".to_string());
                Ok((json!({ "database_id": parent_id }), property))
            }
            Err(TransportError::NotFound(_) | TransportError::Api { status: 400, .. }) => {
                Ok((json!({ "page_id": parent_id }), "title".to_string()))
            }
            Err(error) => Err(error),
        }
    }
}

impl RemoteTransport for NotionClient {
    async fn fetch_document(&self, remote_id: &str) -> TransportResult<RemoteDocument> {
        let page = self
            .send(Method::GET, &format!("pages/{remote_id}"), None)
            .await?;
        if page.get("archived").and_then(Value::as_bool).unwrap_or(false)
            || page.get("in_trash").and_then(Value::as_bool).unwrap_or(false)
        {
            return Err(TransportError::NotFound(remote_id.to_string()));
        }

        let last_edited = page
            .get("last_edited_time")
            .and_then(Value::as_str)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc))
            .ok_or_else(|| {
                TransportError::InvalidPayload(format!("page {remote_id} has no last_edited_time"))
            })?;

        let blocks = self.fetch_block_tree(remote_id).await?;
        tracing::debug!(remote_id, blocks = blocks.len(), "Fetched remote document");

        Ok(RemoteDocument {
            id: page
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(remote_id)
                .to_string(),
            title: page_title(&page),
            last_edited,
            blocks,
        })
    }

    async fn create_document(
        &self,
        parent_id: &str,
        title: &str,
        blocks: &[RemoteBlock],
    ) -> TransportResult<String> {
        let (parent, property) = self.parent_for(parent_id).await?;
        let mut properties = serde_json::Map::new();
        properties.insert(property, json!({ "title": title_text(title) }));
        let body = json!({ "parent": parent, "properties": properties });

        let page = self.send(Method::POST, "pages", Some(&body)).await?;
        let id = page
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::InvalidPayload("created page without id".to_string()))?
            .to_string();

        self.append_children(&id, blocks).await?;
        tracing::info!(remote_id = %id, title, "Created remote document");
        Ok(id)
    }

    async fn replace_blocks(&self, remote_id: &str, blocks: &[RemoteBlock]) -> TransportResult<()> {
        let existing = self.list_children(remote_id).await?;
        for value in &existing {
            let block = RemoteBlock::from_json(value);
            if SUB_PAGE_KINDS.contains(&block.kind.as_str()) {
                continue;
            }
            if let Some(id) = block.id {
                self.send(Method::DELETE, &format!("blocks/{id}"), None)
                    .await?;
            }
        }
        self.append_children(remote_id, blocks).await
    }

    async fn rename_document(&self, remote_id: &str, title: &str) -> TransportResult<()> {
        let page = self
            .send(Method::GET, &format!("pages/{remote_id}"), None)
            .await?;
        let property = title_property(&page).unwrap_or_else(|| "title".to_string());
        let mut properties = serde_json::Map::new();
        properties.insert(property, json!({ "title": title_text(title) }));

        self.send(
            Method::PATCH,
            &format!("pages/{remote_id}"),
            Some(&json!({ "properties": properties })),
        )
        .await?;
        Ok(())
    }

    async fn search(&self, query: &str) -> TransportResult<Vec<RemotePageSummary>> {
        let mut summaries = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "query": query,
                "filter": { "property": "object", "value": "page" },
                "page_size": PAGE_SIZE,
            });
            if let Some(cursor) = &cursor {
                body["start_cursor"] = json!(cursor);
            }
            let page: ListPage = parse(self.send(Method::POST, "search", Some(&body)).await?)?;
            summaries.extend(page.results.iter().filter_map(|result| {
                let id = result.get("id").and_then(Value::as_str)?;
                Some(RemotePageSummary {
                    id: id.to_string(),
                    title: page_title(result),
                })
            }));
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(summaries)
    }

    async fn child_pages(&self, parent_id: &str) -> TransportResult<Vec<RemotePageSummary>> {
        let children = self.list_children(parent_id).await?;
        Ok(children
            .iter()
            .filter(|child| child.get("type").and_then(Value::as_str) == Some("child_page"))
            .filter_map(|child| {
                let id = child.get("id").and_then(Value::as_str)?;
                let title = child
                    .pointer("/child_page/title")
                    .and_then(Value::as_str)
                    .unwrap_or(UNTITLED);
                Some(RemotePageSummary {
                    id: id.to_string(),
                    title: title.to_string(),
                })
            })
            .collect())
    }

    async fn current_user(&self) -> TransportResult<RemoteUser> {
        let user = self.send(Method::GET, "users/me", None).await?;
        remote_user(&user)
    }

    async fn page_summary(&self, remote_id: &str) -> TransportResult<RemotePageSummary> {
        let (object, title) = match self
            .send(Method::GET, &format!("pages/{remote_id}"), None)
            .await
        {
            Ok(page) => {
                let title = page_title(&page);
                (page, title)
            }
            Err(TransportError::NotFound(_) | TransportError::Api { status: 400, .. }) => {
                let database = self
                    .send(Method::GET, &format!("databases/{remote_id}"), None)
                    .await?;
                let title = database_title(&database);
                (database, title)
            }
            Err(error) => return Err(error),
        };
        Ok(RemotePageSummary {
            id: object
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(remote_id)
                .to_string(),
            title,
        })
    }
}

fn remote_user(user: &Value) -> TransportResult<RemoteUser> {
    let id = user
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::InvalidPayload("user without id".to_string()))?;
    let name = user
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string);
    Ok(RemoteUser {
        id: id.to_string(),
        name,
    })
}

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotionErrorResponse {
    code: Option<String>,
    message: Option<String>,
}

fn parse<T: serde::de::DeserializeOwned>(value: Value) -> TransportResult<T> {
    serde_json::from_value(value).map_err(|err| TransportError::InvalidPayload(err.to_string()))
}

pub fn normalize_api_url(url: &str) -> TransportResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(TransportError::InvalidPayload(
            "Notion API URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with("/v1") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}/v1"))
    }
}

fn error_for_status(status: StatusCode, path: &str, body: &str) -> TransportError {
    let message = parse_api_error(status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Auth(message),
        StatusCode::NOT_FOUND => TransportError::NotFound(path.to_string()),
        StatusCode::TOO_MANY_REQUESTS => TransportError::RateLimited {
            retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
        },
        _ => TransportError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<NotionErrorResponse>(body) {
        if let Some(message) = payload.message {
            return match payload.code {
                Some(code) => format!("{} [{code}] ({})", message.trim(), status.as_u16()),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Name of the page or database property holding the title
fn title_property(object: &Value) -> Option<String> {
    object
        .get("properties")?
        .as_object()?
        .iter()
        .find(|(_, property)| property.get("type").and_then(Value::as_str) == Some("title"))
        .map(|(name, _)| name.clone())
}

fn database_title(database: &Value) -> String {
    let title: String = database
        .get("title")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn page_title(page: &Value) -> String {
    let title = page
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|properties| {
            properties
                .values()
                .find(|property| property.get("type").and_then(Value::as_str) == Some("title"))
        })
        .and_then(|property| property.get("title"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default();

    if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn title_text(title: &str) -> Value {
    json!([{ "type": "text", "text": { "content": title } }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            NotionClient::new("  ", RateBudget::default()),
            Err(TransportError::Auth(_))
        ));
    }

    #[test]
    fn debug_redacts_token() {
        let client = NotionClient::new("secret_abc", RateBudget::default()).unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret_abc"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn normalize_api_url_appends_version_path() {
        assert_eq!(
            normalize_api_url("http://localhost:8080/").unwrap(),
            "http://localhost:8080/v1"
        );
        assert_eq!(
            normalize_api_url("https://api.notion.com/v1").unwrap(),
            "https://api.notion.com/v1"
        );
        assert!(normalize_api_url("api.notion.com").is_err());
    }

    #[test]
    fn status_codes_map_to_transport_errors() {
        let body = r#"{"object":"error","code":"unauthorized","message":"API token is invalid."}"#;
        match error_for_status(StatusCode::UNAUTHORIZED, "pages/x", body) {
            TransportError::Auth(message) => {
                assert!(message.contains("API token is invalid."));
                assert!(message.contains("unauthorized"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            error_for_status(StatusCode::NOT_FOUND, "pages/x", ""),
            TransportError::NotFound(path) if path == "pages/x"
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, "search", "upstream"),
            TransportError::Api { status: 502, message } if message == "upstream (502)"
        ));
    }

    #[test]
    fn page_title_reads_any_title_property() {
        let page = json!({
            "properties": {
                "Name": {"type": "title", "title": [
                    {"plain_text": "Road"}, {"plain_text": "map"}
                ]},
                "Tags": {"type": "multi_select", "multi_select": []}
            }
        });
        assert_eq!(page_title(&page), "Roadmap");
        assert_eq!(title_property(&page).as_deref(), Some("Name"));
        assert_eq!(page_title(&json!({"properties": {}})), "Untitled");
    }

    #[test]
    fn user_and_database_payloads_are_read() {
        let user = remote_user(&json!({"object": "user", "id": "u-1", "name": "Sync bot"})).unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.name.as_deref(), Some("Sync bot"));
        assert!(remote_user(&json!({"id": "u-2", "name": ""})).unwrap().name.is_none());
        assert!(matches!(
            remote_user(&json!({"object": "user"})),
            Err(TransportError::InvalidPayload(_))
        ));

        let database = json!({"title": [{"plain_text": "Team "}, {"plain_text": "notes"}]});
        assert_eq!(database_title(&database), "Team notes");
        assert_eq!(database_title(&json!({})), "Untitled");
    }

    #[test]
    fn list_page_defaults_missing_fields() {
        let page: ListPage = parse(json!({"results": [{"id": "a"}]})).unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }
}
