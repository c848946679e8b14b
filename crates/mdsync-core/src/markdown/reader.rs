//! Markdown body to structural nodes

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::models::{InlineText, StructuralNode, StyleFlags, TextRun};
use crate::util::normalize_line_endings;

/// Parse a Markdown body (front-matter already removed) into nodes.
pub fn parse_body(markdown: &str) -> Vec<StructuralNode> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut reader = BodyReader::default();
    for event in Parser::new_ext(markdown, options) {
        reader.handle(event);
    }
    reader.finish()
}

#[derive(Default)]
struct BodyReader {
    nodes: Vec<StructuralNode>,
    text: InlineText,
    bold: usize,
    italic: usize,
    strikethrough: usize,
    links: Vec<String>,
    /// Ordered flag of every open list, outermost first
    lists: Vec<bool>,
    /// Open list item whose text has not been emitted yet
    item: Option<(bool, usize)>,
    heading: Option<u8>,
    quote_depth: usize,
    quote: InlineText,
    code: Option<(String, String)>,
    table: Option<Vec<Vec<InlineText>>>,
    row: Vec<InlineText>,
    image: Option<(String, String)>,
}

impl BodyReader {
    fn handle(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(text) => self.push_run(&text, true),
            Event::Html(html) | Event::InlineHtml(html) => self.push_run(&html, false),
            Event::SoftBreak | Event::HardBreak => self.text("\n"),
            Event::Rule => {
                self.flush_item();
                self.flush_paragraph();
                self.nodes.push(StructuralNode::Divider);
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => {
                if self.item.is_some() && !self.text.is_empty() {
                    self.push_run("\n", false);
                }
            }
            Tag::Heading { level, .. } => {
                self.flush_item();
                self.heading = Some(level as u8);
            }
            Tag::BlockQuote => {
                self.flush_item();
                self.quote_depth += 1;
            }
            Tag::CodeBlock(kind) => {
                self.flush_item();
                let language = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((language, String::new()));
            }
            Tag::List(first) => {
                self.flush_item();
                self.lists.push(first.is_some());
            }
            Tag::Item => {
                let ordered = self.lists.last().copied().unwrap_or(false);
                self.item = Some((ordered, self.lists.len().saturating_sub(1)));
            }
            Tag::Table(_) => {
                self.flush_item();
                self.table = Some(Vec::new());
            }
            Tag::TableHead | Tag::TableRow => self.row.clear(),
            Tag::TableCell => self.text = InlineText::default(),
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strikethrough += 1,
            Tag::Link { dest_url, .. } => self.links.push(dest_url.to_string()),
            Tag::Image { dest_url, .. } => self.image = Some((dest_url.to_string(), String::new())),
            Tag::HtmlBlock => self.flush_item(),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.item.is_some() {
                    return;
                }
                if self.quote_depth > 0 {
                    let text = std::mem::take(&mut self.text);
                    if !self.quote.is_empty() && !text.is_empty() {
                        self.quote.push(TextRun::plain("\n"));
                    }
                    for run in text.runs {
                        self.quote.push(run);
                    }
                } else {
                    self.flush_paragraph();
                }
            }
            TagEnd::Heading(_) => {
                let level = self.heading.take().unwrap_or(1);
                let text = std::mem::take(&mut self.text);
                self.nodes.push(StructuralNode::heading(level, text));
            }
            TagEnd::BlockQuote => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                if self.quote_depth == 0 {
                    let text = std::mem::take(&mut self.quote);
                    self.nodes.push(StructuralNode::Quote { text });
                }
            }
            TagEnd::CodeBlock => {
                if let Some((language, code)) = self.code.take() {
                    let mut code = normalize_line_endings(&code);
                    if code.ends_with('\n') {
                        code.pop();
                    }
                    self.nodes.push(StructuralNode::CodeBlock { language, code });
                }
            }
            TagEnd::List(_) => {
                self.flush_item();
                self.lists.pop();
            }
            TagEnd::Item => {
                self.flush_item();
                self.flush_paragraph();
            }
            TagEnd::TableCell => {
                let cell = std::mem::take(&mut self.text);
                self.row.push(cell);
            }
            TagEnd::TableHead | TagEnd::TableRow => {
                let row = std::mem::take(&mut self.row);
                if let Some(rows) = self.table.as_mut() {
                    rows.push(row);
                }
            }
            TagEnd::Table => {
                if let Some(rows) = self.table.take() {
                    self.nodes.push(StructuralNode::Table { rows });
                }
            }
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strikethrough = self.strikethrough.saturating_sub(1),
            TagEnd::Link => {
                self.links.pop();
            }
            TagEnd::Image => self.finish_image(),
            TagEnd::HtmlBlock => self.flush_paragraph(),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, code)) = self.code.as_mut() {
            code.push_str(text);
        } else if let Some((_, alt)) = self.image.as_mut() {
            alt.push_str(text);
        } else {
            self.push_run(text, false);
        }
    }

    fn push_run(&mut self, text: &str, code: bool) {
        let style = StyleFlags {
            bold: self.bold > 0,
            italic: self.italic > 0,
            code,
            strikethrough: self.strikethrough > 0,
        };
        let mut run = TextRun::styled(text, style);
        if let Some(link) = self.links.last() {
            run = run.with_link(link.clone());
        }
        self.text.push(run);
    }

    /// Standalone images become nodes; images inside other text stay inline as links.
    fn finish_image(&mut self) {
        let Some((source, caption)) = self.image.take() else {
            return;
        };
        let standalone = self.heading.is_none()
            && self.item.is_none()
            && self.table.is_none()
            && self.quote_depth == 0;
        if standalone {
            self.flush_paragraph();
            self.nodes.push(StructuralNode::Image { source, caption });
        } else {
            let label = if caption.is_empty() { source.clone() } else { caption };
            self.text.push(TextRun::plain(label).with_link(source));
        }
    }

    fn flush_item(&mut self) {
        if let Some((ordered, depth)) = self.item.take() {
            let text = std::mem::take(&mut self.text);
            self.nodes.push(StructuralNode::ListItem {
                ordered,
                depth,
                text,
            });
        }
    }

    fn flush_paragraph(&mut self) {
        let text = std::mem::take(&mut self.text);
        if !text.is_empty() {
            self.nodes.push(StructuralNode::Paragraph { text });
        }
    }

    fn finish(mut self) -> Vec<StructuralNode> {
        self.flush_item();
        self.flush_paragraph();
        self.nodes
    }
}
