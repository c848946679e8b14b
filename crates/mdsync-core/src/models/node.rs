//! Structural content nodes shared by the Markdown and Notion sides

use serde::{Deserialize, Serialize};

/// Inline style flags carried by a single text run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct StyleFlags {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub strikethrough: bool,
}

impl StyleFlags {
    pub const PLAIN: Self = Self {
        bold: false,
        italic: false,
        code: false,
        strikethrough: false,
    };

    #[must_use]
    pub const fn bold() -> Self {
        Self {
            bold: true,
            ..Self::PLAIN
        }
    }

    #[must_use]
    pub const fn italic() -> Self {
        Self {
            italic: true,
            ..Self::PLAIN
        }
    }

    #[must_use]
    pub const fn code() -> Self {
        Self {
            code: true,
            ..Self::PLAIN
        }
    }

    pub const fn is_plain(self) -> bool {
        !self.bold && !self.italic && !self.code && !self.strikethrough
    }
}

/// A run of text with uniform styling. Runs never nest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub style: StyleFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: StyleFlags::PLAIN,
            link: None,
        }
    }

    pub fn styled(text: impl Into<String>, style: StyleFlags) -> Self {
        Self {
            text: text.into(),
            style,
            link: None,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    fn same_format(&self, other: &Self) -> bool {
        self.style == other.style && self.link == other.link
    }
}

/// Flat sequence of styled runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InlineText {
    pub runs: Vec<TextRun>,
}

impl InlineText {
    pub const fn new(runs: Vec<TextRun>) -> Self {
        Self { runs }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::default()
        } else {
            Self {
                runs: vec![TextRun::plain(text)],
            }
        }
    }

    /// Concatenated text without styling
    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.iter().all(|run| run.text.is_empty())
    }

    /// Append a run, merging it into the previous one when formatting matches.
    pub fn push(&mut self, run: TextRun) {
        if run.text.is_empty() {
            return;
        }
        match self.runs.last_mut() {
            Some(last) if last.same_format(&run) => last.text.push_str(&run.text),
            _ => self.runs.push(run),
        }
    }

    /// Same text with empty runs dropped and adjacent equal-format runs merged
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut out = Self::default();
        for run in &self.runs {
            out.push(run.clone());
        }
        out
    }
}

impl From<&str> for InlineText {
    fn from(value: &str) -> Self {
        Self::plain(value)
    }
}

/// One semantic unit of document content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralNode {
    Heading {
        level: u8,
        text: InlineText,
    },
    Paragraph {
        text: InlineText,
    },
    ListItem {
        ordered: bool,
        depth: usize,
        text: InlineText,
    },
    CodeBlock {
        language: String,
        code: String,
    },
    Quote {
        text: InlineText,
    },
    Table {
        rows: Vec<Vec<InlineText>>,
    },
    Image {
        source: String,
        caption: String,
    },
    Divider,
}

impl StructuralNode {
    pub const MIN_HEADING_LEVEL: u8 = 1;
    pub const MAX_HEADING_LEVEL: u8 = 6;

    /// Heading with the level clamped into `1..=6`
    pub fn heading(level: u8, text: impl Into<InlineText>) -> Self {
        Self::Heading {
            level: level.clamp(Self::MIN_HEADING_LEVEL, Self::MAX_HEADING_LEVEL),
            text: text.into(),
        }
    }

    pub fn paragraph(text: impl Into<InlineText>) -> Self {
        Self::Paragraph { text: text.into() }
    }

    pub fn list_item(ordered: bool, depth: usize, text: impl Into<InlineText>) -> Self {
        Self::ListItem {
            ordered,
            depth,
            text: text.into(),
        }
    }

    pub fn code(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self::CodeBlock {
            language: language.into(),
            code: code.into(),
        }
    }

    pub fn quote(text: impl Into<InlineText>) -> Self {
        Self::Quote { text: text.into() }
    }

    pub fn image(source: impl Into<String>, caption: impl Into<String>) -> Self {
        Self::Image {
            source: source.into(),
            caption: caption.into(),
        }
    }

    /// Short kind label used in logs and degradation messages
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::Paragraph { .. } => "paragraph",
            Self::ListItem { .. } => "list_item",
            Self::CodeBlock { .. } => "code_block",
            Self::Quote { .. } => "quote",
            Self::Table { .. } => "table",
            Self::Image { .. } => "image",
            Self::Divider => "divider",
        }
    }
}

impl From<String> for InlineText {
    fn from(value: String) -> Self {
        Self::plain(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_level_is_clamped() {
        assert!(matches!(
            StructuralNode::heading(0, "x"),
            StructuralNode::Heading { level: 1, .. }
        ));
        assert!(matches!(
            StructuralNode::heading(9, "x"),
            StructuralNode::Heading { level: 6, .. }
        ));
    }

    #[test]
    fn push_merges_adjacent_runs_with_same_format() {
        let mut text = InlineText::default();
        text.push(TextRun::plain("Hello "));
        text.push(TextRun::plain("world"));
        text.push(TextRun::styled("!", StyleFlags::bold()));
        text.push(TextRun::plain(""));

        assert_eq!(text.runs.len(), 2);
        assert_eq!(text.runs[0].text, "Hello world");
        assert_eq!(text.plain_text(), "Hello world!");
    }

    #[test]
    fn runs_with_different_links_stay_separate() {
        let text = InlineText::new(vec![
            TextRun::plain("a").with_link("https://a.example"),
            TextRun::plain("b").with_link("https://b.example"),
        ])
        .normalized();
        assert_eq!(text.runs.len(), 2);
    }

    #[test]
    fn node_serializes_with_kind_tag() {
        let json = serde_json::to_value(StructuralNode::Divider).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "divider"}));
    }
}
