//! Notion block payloads as they travel over the wire

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A remote block: kind tag, kind-specific content and nested children.
///
/// `id`, `created_time` and `last_edited_time` are read from the remote but never
/// interpreted as content.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBlock {
    pub id: Option<String>,
    pub kind: String,
    pub content: Value,
    pub children: Vec<RemoteBlock>,
    pub has_children: bool,
    pub created_time: Option<String>,
    pub last_edited_time: Option<String>,
}

impl RemoteBlock {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            content,
            children: Vec::new(),
            has_children: false,
            created_time: None,
            last_edited_time: None,
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<Self>) -> Self {
        self.has_children = !children.is_empty();
        self.children = children;
        self
    }

    /// Read a block object returned by the API. Never fails: a missing `type`
    /// yields an empty kind that the adapter reports as malformed.
    pub fn from_json(value: &Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content = value.get(&kind).cloned().unwrap_or(Value::Null);
        let text_field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);

        Self {
            id: text_field("id"),
            has_children: value
                .get("has_children")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            created_time: text_field("created_time"),
            last_edited_time: text_field("last_edited_time"),
            kind,
            content,
            children: Vec::new(),
        }
    }

    /// Request body for this block, children nested inside the kind object.
    pub fn to_json(&self) -> Value {
        let mut content = match &self.content {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if !self.children.is_empty() {
            content.insert(
                "children".to_string(),
                Value::Array(self.children.iter().map(Self::to_json).collect()),
            );
        }
        let mut block = Map::new();
        block.insert("object".to_string(), json!("block"));
        block.insert("type".to_string(), json!(self.kind));
        block.insert(self.kind.clone(), Value::Object(content));
        Value::Object(block)
    }

    /// The same block without its children
    #[must_use]
    pub fn shallow(&self) -> Self {
        Self {
            children: Vec::new(),
            has_children: false,
            ..self.clone()
        }
    }
}

/// One rich text item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(rename = "type", default = "default_rich_text_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<RichTextContent>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default, skip_serializing)]
    pub plain_text: Option<String>,
    #[serde(default, skip_serializing)]
    pub href: Option<String>,
}

fn default_rich_text_kind() -> String {
    "text".to_string()
}

impl RichText {
    pub fn text(content: impl Into<String>, annotations: Annotations, link: Option<String>) -> Self {
        Self {
            kind: default_rich_text_kind(),
            text: Some(RichTextContent {
                content: content.into(),
                link: link.map(|url| Link { url }),
            }),
            annotations,
            plain_text: None,
            href: None,
        }
    }

    /// Visible text regardless of item type
    pub fn visible_text(&self) -> &str {
        match (&self.text, &self.plain_text) {
            (Some(text), _) => &text.content,
            (None, Some(plain)) => plain,
            (None, None) => "",
        }
    }

    pub fn link(&self) -> Option<&str> {
        self.text
            .as_ref()
            .and_then(|text| text.link.as_ref())
            .map(|link| link.url.as_str())
            .or(self.href.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichTextContent {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub code: bool,
    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            bold: false,
            italic: false,
            strikethrough: false,
            underline: false,
            code: false,
            color: default_color(),
        }
    }
}

fn default_color() -> String {
    "default".to_string()
}

/// Content of text-bearing blocks (paragraph, headings, list items, quote)
#[derive(Debug, Deserialize)]
pub(crate) struct TextPayload {
    pub rich_text: Vec<RichText>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CodePayload {
    pub rich_text: Vec<RichText>,
    pub language: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TablePayload {
    pub table_width: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TableRowPayload {
    pub cells: Vec<Vec<RichText>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FileRef {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImagePayload {
    #[serde(default)]
    pub external: Option<FileRef>,
    #[serde(default)]
    pub file: Option<FileRef>,
    #[serde(default)]
    pub caption: Vec<RichText>,
}
