//! Conversion between structural nodes and Notion blocks.
//!
//! The mapping is lossy in a few documented places (deep headings, unknown code
//! languages, local images, irregular tables). Every lossy step is reported as a
//! [`Degradation`]; every remote block that cannot be read is reported as a
//! [`BlockError`] without stopping conversion of the rest.

use serde::de::DeserializeOwned;
use serde_json::json;

use super::block::{
    Annotations, CodePayload, ImagePayload, RemoteBlock, RichText, TablePayload,
    TableRowPayload, TextPayload,
};
use super::{BlockError, Degradation};
use crate::markdown;
use crate::models::{InlineText, StructuralNode, StyleFlags, TextRun};
use crate::util::{is_http_url, normalize_line_endings};

/// Longest text a single rich text item may carry
pub const MAX_RICH_TEXT_CHARS: usize = 2000;

/// Deepest heading the remote side supports
pub const MAX_REMOTE_HEADING_LEVEL: u8 = 3;

const PLAIN_TEXT_LANGUAGE: &str = "plain text";

const NOTION_LANGUAGES: &[&str] = &[
    "abap", "arduino", "bash", "basic", "c", "clojure", "coffeescript", "c++", "c#", "css",
    "dart", "diff", "docker", "elixir", "elm", "erlang", "flow", "fortran", "f#", "gherkin",
    "glsl", "go", "graphql", "groovy", "haskell", "html", "java", "javascript", "json",
    "julia", "kotlin", "latex", "less", "lisp", "livescript", "lua", "makefile", "markdown",
    "markup", "matlab", "mermaid", "nix", "objective-c", "ocaml", "pascal", "perl", "php",
    "plain text", "powershell", "prolog", "protobuf", "python", "r", "reason", "ruby", "rust",
    "sass", "scala", "scheme", "scss", "shell", "sql", "swift", "typescript", "vb.net",
    "verilog", "vhdl", "visual basic", "webassembly", "xml", "yaml",
];

const LANGUAGE_ALIASES: &[(&str, &str)] = &[
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("py", "python"),
    ("rs", "rust"),
    ("rb", "ruby"),
    ("sh", "shell"),
    ("zsh", "shell"),
    ("console", "shell"),
    ("yml", "yaml"),
    ("cpp", "c++"),
    ("cxx", "c++"),
    ("csharp", "c#"),
    ("cs", "c#"),
    ("fsharp", "f#"),
    ("dockerfile", "docker"),
    ("golang", "go"),
    ("kt", "kotlin"),
    ("md", "markdown"),
    ("objc", "objective-c"),
    ("ps1", "powershell"),
    ("proto", "protobuf"),
    ("tex", "latex"),
    ("wasm", "webassembly"),
    ("text", PLAIN_TEXT_LANGUAGE),
    ("txt", PLAIN_TEXT_LANGUAGE),
    ("plaintext", PLAIN_TEXT_LANGUAGE),
];

/// Result of converting local nodes for the remote side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteConversion {
    pub blocks: Vec<RemoteBlock>,
    pub degradations: Vec<Degradation>,
}

/// Result of reading remote blocks back into nodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeConversion {
    pub nodes: Vec<StructuralNode>,
    pub errors: Vec<BlockError>,
    pub degradations: Vec<Degradation>,
}

impl NodeConversion {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Convert structural nodes into remote blocks. Never fails.
pub fn to_remote_blocks(nodes: &[StructuralNode]) -> RemoteConversion {
    let mut out = RemoteConversion::default();
    let mut previous_depth: Option<usize> = None;

    for (index, node) in nodes.iter().enumerate() {
        if let StructuralNode::ListItem {
            ordered,
            depth,
            text,
        } = node
        {
            let allowed = previous_depth.map_or(0, |previous| previous + 1);
            let effective = (*depth).min(allowed);
            if effective < *depth {
                out.degradations.push(Degradation::new(
                    index,
                    format!("list item depth {depth} re-parented to depth {effective}"),
                ));
            }
            let kind = if *ordered {
                "numbered_list_item"
            } else {
                "bulleted_list_item"
            };
            let block = RemoteBlock::new(kind, json!({ "rich_text": rich_text(text) }));
            attach(&mut out.blocks, effective, block);
            previous_depth = Some(effective);
            continue;
        }

        previous_depth = None;
        let block = node_to_block(index, node, &mut out.degradations);
        out.blocks.push(block);
    }

    out
}

fn attach(siblings: &mut Vec<RemoteBlock>, depth: usize, block: RemoteBlock) {
    if depth == 0 {
        siblings.push(block);
        return;
    }
    match siblings.last_mut() {
        Some(parent) => {
            parent.has_children = true;
            attach(&mut parent.children, depth - 1, block);
        }
        None => siblings.push(block),
    }
}

fn node_to_block(index: usize, node: &StructuralNode, degradations: &mut Vec<Degradation>) -> RemoteBlock {
    match node {
        StructuralNode::Heading { level, text } => {
            let remote_level = (*level).clamp(1, MAX_REMOTE_HEADING_LEVEL);
            if remote_level != *level {
                degradations.push(Degradation::new(
                    index,
                    format!("heading level {level} stored as level {remote_level}"),
                ));
            }
            RemoteBlock::new(
                format!("heading_{remote_level}"),
                json!({ "rich_text": rich_text(text) }),
            )
        }
        StructuralNode::Paragraph { text } => {
            RemoteBlock::new("paragraph", json!({ "rich_text": rich_text(text) }))
        }
        StructuralNode::Quote { text } => {
            RemoteBlock::new("quote", json!({ "rich_text": rich_text(text) }))
        }
        StructuralNode::CodeBlock { language, code } => {
            let remote_language = match notion_language(language) {
                Some(found) => found,
                None => {
                    degradations.push(Degradation::new(
                        index,
                        format!("code language `{language}` stored as plain text"),
                    ));
                    PLAIN_TEXT_LANGUAGE
                }
            };
            code_block(remote_language, code)
        }
        StructuralNode::Table { rows } => table_block(index, rows, degradations),
        StructuralNode::Image { source, caption } => {
            if is_http_url(source) {
                RemoteBlock::new(
                    "image",
                    json!({
                        "type": "external",
                        "external": { "url": source },
                        "caption": rich_text(&InlineText::plain(caption.as_str())),
                    }),
                )
            } else {
                degradations.push(Degradation::new(
                    index,
                    format!("local image `{source}` kept as text; uploads are not supported"),
                ));
                let text = InlineText::plain(format!("![{caption}]({source})"));
                RemoteBlock::new("paragraph", json!({ "rich_text": rich_text(&text) }))
            }
        }
        StructuralNode::Divider => RemoteBlock::new("divider", json!({})),
        StructuralNode::ListItem { .. } => {
            // Handled by the caller so nesting can be tracked.
            RemoteBlock::new("paragraph", json!({ "rich_text": [] }))
        }
    }
}

fn code_block(language: &str, code: &str) -> RemoteBlock {
    let items: Vec<RichText> = split_chars(code, MAX_RICH_TEXT_CHARS)
        .into_iter()
        .map(|chunk| RichText::text(chunk, Annotations::default(), None))
        .collect();
    RemoteBlock::new("code", json!({ "rich_text": items, "language": language }))
}

fn table_block(
    index: usize,
    rows: &[Vec<InlineText>],
    degradations: &mut Vec<Degradation>,
) -> RemoteBlock {
    let width = rows.first().map_or(0, Vec::len);
    let rectangular = width > 0 && rows.iter().all(|row| row.len() == width);
    if !rectangular {
        degradations.push(Degradation::new(
            index,
            "irregular table stored as a plain text code block",
        ));
        let rendition = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(InlineText::plain_text)
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n");
        return code_block(PLAIN_TEXT_LANGUAGE, &rendition);
    }

    let children = rows
        .iter()
        .map(|row| {
            let cells: Vec<Vec<RichText>> = row.iter().map(rich_text).collect();
            RemoteBlock::new("table_row", json!({ "cells": cells }))
        })
        .collect();
    RemoteBlock::new(
        "table",
        json!({
            "table_width": width,
            "has_column_header": true,
            "has_row_header": false,
        }),
    )
    .with_children(children)
}

fn rich_text(text: &InlineText) -> Vec<RichText> {
    let mut items = Vec::new();
    for run in &text.normalized().runs {
        let annotations = Annotations {
            bold: run.style.bold,
            italic: run.style.italic,
            strikethrough: run.style.strikethrough,
            code: run.style.code,
            ..Annotations::default()
        };
        for chunk in split_chars(&run.text, MAX_RICH_TEXT_CHARS) {
            items.push(RichText::text(chunk, annotations.clone(), run.link.clone()));
        }
    }
    items
}

fn split_chars(text: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Convert remote blocks into structural nodes, collecting per-block errors.
pub fn from_remote_blocks(blocks: &[RemoteBlock]) -> NodeConversion {
    let mut out = NodeConversion::default();
    for (index, block) in blocks.iter().enumerate() {
        read_block(index, block, 0, &mut out);
    }
    out
}

fn read_block(index: usize, block: &RemoteBlock, depth: usize, out: &mut NodeConversion) {
    match block.kind.as_str() {
        "heading_1" | "heading_2" | "heading_3" => {
            let level = match block.kind.as_str() {
                "heading_1" => 1,
                "heading_2" => 2,
                _ => 3,
            };
            if let Some(payload) = payload::<TextPayload>(index, block, out) {
                let text = inline_text(index, &payload.rich_text, out);
                out.nodes.push(StructuralNode::Heading { level, text });
            }
            flatten_children(index, block, out);
        }
        "paragraph" | "quote" => {
            if let Some(payload) = payload::<TextPayload>(index, block, out) {
                let text = inline_text(index, &payload.rich_text, out);
                out.nodes.push(if block.kind == "quote" {
                    StructuralNode::Quote { text }
                } else {
                    StructuralNode::Paragraph { text }
                });
            }
            flatten_children(index, block, out);
        }
        "bulleted_list_item" | "numbered_list_item" => {
            if let Some(payload) = payload::<TextPayload>(index, block, out) {
                let text = inline_text(index, &payload.rich_text, out);
                out.nodes.push(StructuralNode::ListItem {
                    ordered: block.kind == "numbered_list_item",
                    depth,
                    text,
                });
            }
            for child in &block.children {
                if is_list_item(child) {
                    read_block(index, child, depth + 1, out);
                } else {
                    out.degradations.push(Degradation::new(
                        index,
                        format!("nested {} inside a list item flattened", child.kind),
                    ));
                    read_block(index, child, 0, out);
                }
            }
        }
        "code" => {
            if let Some(payload) = payload::<CodePayload>(index, block, out) {
                let code: String = payload.rich_text.iter().map(RichText::visible_text).collect();
                let code = normalize_line_endings(&code);
                let language = local_language(index, &payload.language, out);
                out.nodes.push(StructuralNode::CodeBlock { language, code });
            }
        }
        "table" => {
            if let Some(payload) = payload::<TablePayload>(index, block, out) {
                if let Some(rows) = table_rows(index, block, payload.table_width, out) {
                    out.nodes.push(StructuralNode::Table { rows });
                }
            }
        }
        "image" => {
            if let Some(payload) = payload::<ImagePayload>(index, block, out) {
                let source = match (payload.external, payload.file) {
                    (Some(external), _) => Some(external.url),
                    (None, Some(file)) => Some(strip_query(&file.url).to_string()),
                    (None, None) => None,
                };
                match source {
                    Some(source) => {
                        let caption: String =
                            payload.caption.iter().map(RichText::visible_text).collect();
                        out.nodes.push(StructuralNode::Image { source, caption });
                    }
                    None => out.errors.push(BlockError::new(index, &block.kind, "image has no url")),
                }
            }
        }
        "divider" => out.nodes.push(StructuralNode::Divider),
        "child_page" | "child_database" => out.degradations.push(Degradation::new(
            index,
            format!("{} omitted; sub-pages sync as separate documents", block.kind),
        )),
        "" => out
            .errors
            .push(BlockError::new(index, "", "block has no type")),
        other => out
            .errors
            .push(BlockError::new(index, other, "unsupported block kind")),
    }
}

fn is_list_item(block: &RemoteBlock) -> bool {
    matches!(
        block.kind.as_str(),
        "bulleted_list_item" | "numbered_list_item"
    )
}

fn flatten_children(index: usize, block: &RemoteBlock, out: &mut NodeConversion) {
    if block.children.is_empty() {
        return;
    }
    out.degradations.push(Degradation::new(
        index,
        format!("children of {} flattened", block.kind),
    ));
    for child in &block.children {
        read_block(index, child, 0, out);
    }
}

fn payload<T: DeserializeOwned>(
    index: usize,
    block: &RemoteBlock,
    out: &mut NodeConversion,
) -> Option<T> {
    match serde_json::from_value(block.content.clone()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            out.errors
                .push(BlockError::new(index, &block.kind, err.to_string()));
            None
        }
    }
}

fn table_rows(
    index: usize,
    block: &RemoteBlock,
    width: usize,
    out: &mut NodeConversion,
) -> Option<Vec<Vec<InlineText>>> {
    let mut rows = Vec::with_capacity(block.children.len());
    for child in &block.children {
        if child.kind != "table_row" {
            out.errors.push(BlockError::new(
                index,
                &child.kind,
                "unexpected child inside table",
            ));
            return None;
        }
        let row = payload::<TableRowPayload>(index, child, out)?;
        let mut cells: Vec<InlineText> = row
            .cells
            .iter()
            .map(|cell| inline_text(index, cell, out))
            .collect();
        cells.resize_with(width, InlineText::default);
        rows.push(cells);
    }
    Some(rows)
}

fn inline_text(index: usize, items: &[RichText], out: &mut NodeConversion) -> InlineText {
    let mut text = InlineText::default();
    for item in items {
        if item.kind != "text" {
            out.degradations.push(Degradation::new(
                index,
                format!("{} rich text kept as plain text", item.kind),
            ));
        }
        let style = StyleFlags {
            bold: item.annotations.bold,
            italic: item.annotations.italic,
            code: item.annotations.code,
            strikethrough: item.annotations.strikethrough,
        };
        for (part, style) in unstyled_edges(item.visible_text(), style) {
            let mut run = TextRun::styled(part, style);
            if let Some(link) = item.link() {
                run = run.with_link(link);
            }
            text.push(run);
        }
    }
    text
}

/// Split off edge whitespace of an emphasized run as plain text.
///
/// Markdown emphasis cannot start or end on whitespace, so a local file can
/// never carry it either.
fn unstyled_edges(text: &str, style: StyleFlags) -> [(&str, StyleFlags); 3] {
    if style.code || style.is_plain() {
        return [("", style), (text, style), ("", style)];
    }
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    let bare = StyleFlags::PLAIN;
    [
        (&text[..start], bare),
        (&text[start..end], style),
        (&text[end..], bare),
    ]
}

fn local_language(index: usize, remote: &str, out: &mut NodeConversion) -> String {
    if remote == PLAIN_TEXT_LANGUAGE {
        return String::new();
    }
    if NOTION_LANGUAGES.contains(&remote) {
        return remote.to_string();
    }
    out.degradations.push(Degradation::new(
        index,
        format!("unknown code language `{remote}` read as plain text"),
    ));
    String::new()
}

/// Remote language name for a local tag; empty tags mean plain text.
pub fn notion_language(tag: &str) -> Option<&'static str> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return Some(PLAIN_TEXT_LANGUAGE);
    }
    if let Some(found) = NOTION_LANGUAGES.iter().copied().find(|language| *language == tag) {
        return Some(found);
    }
    LANGUAGE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == tag)
        .map(|(_, language)| *language)
}

/// Notion-hosted file urls carry short-lived signatures in the query string.
fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Project a body onto what survives a trip through the remote side and back
/// through Markdown.
///
/// Fingerprints are computed over this projection, so a document whose only
/// differences are lossy mappings is never seen as changed.
pub fn canonicalize(nodes: &[StructuralNode]) -> Vec<StructuralNode> {
    markdown::parse_body(&markdown::render_body(&remote_projection(nodes)))
}

/// The remote half of [`canonicalize`]. Empty paragraphs are dropped too:
/// Markdown cannot express them.
pub(crate) fn remote_projection(nodes: &[StructuralNode]) -> Vec<StructuralNode> {
    from_remote_blocks(&to_remote_blocks(nodes).blocks)
        .nodes
        .into_iter()
        .filter(|node| !matches!(node, StructuralNode::Paragraph { text } if text.is_empty()))
        .collect()
}
