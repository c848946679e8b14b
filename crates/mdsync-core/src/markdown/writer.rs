//! Structural nodes to Markdown text

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{InlineText, StructuralNode, TextRun};

const LIST_INDENT: &str = "    ";
const ESCAPED: &[char] = &['\\', '`', '*', '_', '[', ']', '<', '>', '~', '|', '#', '&'];

static LINE_START: OnceLock<Regex> = OnceLock::new();

/// Render nodes as a Markdown body ending in a newline (empty for no nodes).
pub fn render_body(nodes: &[StructuralNode]) -> String {
    let mut out = String::new();
    let mut list_counters: Vec<(bool, usize)> = Vec::new();
    let mut previous_was_item = false;

    for node in nodes {
        let is_item = matches!(node, StructuralNode::ListItem { .. });
        if !is_item {
            list_counters.clear();
        }

        let rendered = match node {
            StructuralNode::ListItem {
                ordered,
                depth,
                text,
            } => render_list_item(*ordered, *depth, text, &mut list_counters),
            other => render_block(other),
        };
        if rendered.is_empty() {
            continue;
        }

        if !out.is_empty() {
            out.push_str(if is_item && previous_was_item { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        previous_was_item = is_item;
    }

    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn render_block(node: &StructuralNode) -> String {
    match node {
        StructuralNode::Heading { level, text } => {
            let text = render_inline(text, InlineContext::Heading);
            format!("{} {text}", "#".repeat(usize::from(*level)))
        }
        StructuralNode::Paragraph { text } => render_inline(text, InlineContext::Block),
        StructuralNode::CodeBlock { language, code } => {
            let fence = "`".repeat(longest_backtick_run(code).max(2) + 1);
            if code.is_empty() {
                format!("{fence}{language}\n{fence}")
            } else {
                format!("{fence}{language}\n{code}\n{fence}")
            }
        }
        StructuralNode::Quote { text } => {
            let text = render_inline(text, InlineContext::Block);
            if text.is_empty() {
                return ">".to_string();
            }
            text.lines()
                .map(|line| format!("> {line}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        StructuralNode::Table { rows } => render_table(rows),
        StructuralNode::Image { source, caption } => {
            format!("![{}]({})", escape(caption), destination(source))
        }
        StructuralNode::Divider => "---".to_string(),
        StructuralNode::ListItem { .. } => String::new(),
    }
}

fn render_list_item(
    ordered: bool,
    depth: usize,
    text: &InlineText,
    counters: &mut Vec<(bool, usize)>,
) -> String {
    counters.truncate(depth + 1);
    while counters.len() <= depth {
        counters.push((ordered, 0));
    }
    let counter = &mut counters[depth];
    if counter.0 != ordered {
        *counter = (ordered, 0);
    }
    counter.1 += 1;

    let indent = LIST_INDENT.repeat(depth);
    let marker = if ordered {
        format!("{}.", counter.1)
    } else {
        "-".to_string()
    };
    let continuation = format!("{indent}{}", " ".repeat(marker.len() + 1));
    let body = render_inline(text, InlineContext::Block)
        .lines()
        .collect::<Vec<_>>()
        .join(&format!("\n{continuation}"));
    format!("{indent}{marker} {body}").trim_end().to_string()
}

fn render_table(rows: &[Vec<InlineText>]) -> String {
    let Some(header) = rows.first() else {
        return String::new();
    };
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let render_row = |row: &Vec<InlineText>| {
        let cells: Vec<String> = (0..width)
            .map(|column| {
                row.get(column)
                    .map(|cell| render_inline(cell, InlineContext::Cell))
                    .unwrap_or_default()
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    let mut lines = vec![
        render_row(header),
        format!("|{}", " --- |".repeat(width)),
    ];
    lines.extend(rows.iter().skip(1).map(render_row));
    lines.join("\n")
}

/// Where inline text is placed. Headings and table cells must stay on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InlineContext {
    Block,
    Heading,
    Cell,
}

/// Render inline runs so that parsing the output gives the same runs back.
///
/// Spaces and tabs at the edges of a line and carriage returns become numeric
/// entities. Newlines become hard breaks inside blocks and `&#10;` elsewhere.
pub(crate) fn render_inline(text: &InlineText, context: InlineContext) -> String {
    let text = text.normalized();
    let layout = Layout::of(&text.runs, context);
    let mut rendered = String::new();
    let mut offset = 0;
    for run in &text.runs {
        rendered.push_str(&render_run(run, offset, &layout));
        offset += run.text.chars().count();
    }
    escape_line_starts(&rendered)
}

/// Character view over all runs of one inline text
struct Layout {
    chars: Vec<char>,
    /// Whitespace that Markdown would strip at a line edge
    protected: Vec<bool>,
    context: InlineContext,
}

impl Layout {
    fn of(runs: &[TextRun], context: InlineContext) -> Self {
        let mut chars = Vec::new();
        let mut code = Vec::new();
        for run in runs {
            for c in run.text.chars() {
                chars.push(c);
                code.push(run.style.code);
            }
        }

        let blank = |index: usize| matches!(chars[index], ' ' | '\t') && !code[index];
        let mut protected = vec![false; chars.len()];
        let mut start = 0;
        while start <= chars.len() {
            let end = (start..chars.len())
                .find(|&index| chars[index] == '\n' && !code[index])
                .unwrap_or(chars.len());
            let mut first = start;
            while first < end && blank(first) {
                protected[first] = true;
                first += 1;
            }
            let mut last = end;
            while last > first && blank(last - 1) {
                protected[last - 1] = true;
                last -= 1;
            }
            start = end + 1;
        }

        Self {
            chars,
            protected,
            context,
        }
    }

    fn newline(&self, index: usize) -> &'static str {
        let hard_break = self.context == InlineContext::Block
            && index > 0
            && self.chars[index - 1] != '\n'
            && index + 1 < self.chars.len();
        if hard_break {
            "\\\n"
        } else {
            "&#10;"
        }
    }

    /// Escape `segment`, which starts at character `start` of the whole text.
    fn escape(&self, segment: &str, start: usize) -> String {
        let mut escaped = String::with_capacity(segment.len());
        for (index, c) in (start..).zip(segment.chars()) {
            match c {
                '\n' => escaped.push_str(self.newline(index)),
                '\r' => escaped.push_str("&#13;"),
                ' ' if self.protected[index] => escaped.push_str("&#32;"),
                '\t' if self.protected[index] => escaped.push_str("&#9;"),
                c => {
                    if ESCAPED.contains(&c) {
                        escaped.push('\\');
                    }
                    escaped.push(c);
                }
            }
        }
        escaped
    }
}

fn render_run(run: &TextRun, offset: usize, layout: &Layout) -> String {
    let (lead, core, trail) = if run.style.code {
        ("", run.text.as_str(), "")
    } else {
        split_edges(&run.text)
    };
    let core_start = offset + lead.chars().count();
    let trail_start = core_start + core.chars().count();

    let mut body = if run.style.code {
        code_span(core, layout.context == InlineContext::Cell)
    } else {
        layout.escape(core, core_start)
    };
    if !core.is_empty() {
        if run.style.strikethrough {
            body = format!("~~{body}~~");
        }
        if run.style.italic {
            body = format!("*{body}*");
        }
        if run.style.bold {
            body = format!("**{body}**");
        }
    }

    let styled = format!(
        "{}{body}{}",
        layout.escape(lead, offset),
        layout.escape(trail, trail_start)
    );
    match &run.link {
        Some(link) => format!("[{styled}]({})", destination(link)),
        None => styled,
    }
}

/// Leading whitespace, content, trailing whitespace
fn split_edges(text: &str) -> (&str, &str, &str) {
    let start = text.len() - text.trim_start().len();
    let end = text.trim_end().len().max(start);
    (&text[..start], &text[start..end], &text[end..])
}

fn code_span(text: &str, in_table: bool) -> String {
    let fence = "`".repeat(longest_backtick_run(text) + 1);
    // Line endings inside a code span read back as spaces anyway.
    let text = text.replace(['\r', '\n'], " ");
    let text = if in_table { text.replace('|', "\\|") } else { text };
    if text.starts_with('`') || text.ends_with('`') || (text.starts_with(' ') && text.ends_with(' ')) {
        format!("{fence} {text} {fence}")
    } else {
        format!("{fence}{text}{fence}")
    }
}

fn longest_backtick_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if ESCAPED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape characters that would open a block construct at the start of a line.
fn escape_line_starts(text: &str) -> String {
    let pattern = LINE_START.get_or_init(|| {
        Regex::new(r"(?m)^([ \t]*)(\d+[.)]|[-+=])").expect("line start pattern is valid")
    });
    pattern
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let marker = &captures[2];
            let (digits, punctuation) = marker.split_at(marker.len() - 1);
            format!("{}{digits}\\{punctuation}", &captures[1])
        })
        .into_owned()
}

fn destination(url: &str) -> String {
    if url.contains([' ', '(', ')', '<', '>']) {
        format!("<{}>", url.replace('<', "%3C").replace('>', "%3E"))
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::reader::parse_body;
    use crate::models::StyleFlags;
    use pretty_assertions::assert_eq;

    fn round_trip(nodes: &[StructuralNode]) -> Vec<StructuralNode> {
        parse_body(&render_body(nodes))
    }

    #[test]
    fn renders_common_blocks() {
        let nodes = vec![
            StructuralNode::heading(2, "Plan"),
            StructuralNode::paragraph("Intro"),
            StructuralNode::list_item(true, 0, "one"),
            StructuralNode::list_item(true, 0, "two"),
            StructuralNode::code("rust", "let x = 1;"),
            StructuralNode::Divider,
        ];
        assert_eq!(
            render_body(&nodes),
            "## Plan\n\nIntro\n\n1. one\n2. two\n\n```rust\nlet x = 1;\n```\n\n---\n"
        );
    }

    #[test]
    fn whitespace_moves_outside_style_markers() {
        let text = InlineText::new(vec![
            TextRun::plain("a"),
            TextRun::styled(" bold ", StyleFlags::bold()),
            TextRun::plain("b"),
        ]);
        assert_eq!(render_inline(&text, InlineContext::Block), "a **bold** b");
    }

    #[test]
    fn special_characters_are_escaped() {
        let nodes = vec![
            StructuralNode::paragraph("1. not a list *or* emphasis | pipe"),
            StructuralNode::paragraph("- not a bullet\n# not a heading"),
        ];
        assert_eq!(round_trip(&nodes), nodes);
    }

    #[test]
    fn supported_content_round_trips() {
        let nodes = vec![
            StructuralNode::heading(1, "Title"),
            StructuralNode::paragraph(InlineText::new(vec![
                TextRun::plain("Read "),
                TextRun::styled("this", StyleFlags::bold()).with_link("https://a.example/x"),
                TextRun::plain(" and "),
                TextRun::styled("a `tick`", StyleFlags::code()),
                TextRun::plain("."),
            ])),
            StructuralNode::list_item(false, 0, "top"),
            StructuralNode::list_item(true, 1, "nested"),
            StructuralNode::list_item(false, 2, "deep"),
            StructuralNode::list_item(false, 0, "back"),
            StructuralNode::code("", "```\ninner fence\n```"),
            StructuralNode::quote("quoted\ntwice"),
            StructuralNode::Table {
                rows: vec![
                    vec!["Key".into(), "Value".into()],
                    vec!["a|b".into(), InlineText::new(vec![TextRun::styled("x", StyleFlags::code())])],
                ],
            },
            StructuralNode::image("https://img.example/a b.png", "A [diagram]"),
            StructuralNode::Divider,
        ];
        assert_eq!(round_trip(&nodes), nodes);
    }

    #[test]
    fn edge_whitespace_and_line_breaks_round_trip() {
        let cell = |text: &str| InlineText::from(text);
        let nodes = vec![
            StructuralNode::paragraph("foo "),
            StructuralNode::paragraph("    foo"),
            StructuralNode::paragraph("a\n\nb"),
            StructuralNode::paragraph("\tindented"),
            StructuralNode::paragraph("a  \nb"),
            StructuralNode::paragraph("\nlead and trail\n"),
            StructuralNode::paragraph("carriage\r\nreturn"),
            StructuralNode::heading(2, " a\nb "),
            StructuralNode::list_item(false, 0, "foo "),
            StructuralNode::list_item(true, 1, "one\n\n  two"),
            StructuralNode::quote("a\n\nb"),
            StructuralNode::Table {
                rows: vec![
                    vec![cell("a\nb"), cell(" x ")],
                    vec![cell("\t"), cell("y\n")],
                ],
            },
        ];
        assert_eq!(round_trip(&nodes), nodes);
    }

    #[test]
    fn protected_whitespace_is_written_as_entities() {
        assert_eq!(
            render_body(&[StructuralNode::paragraph("  foo \n\tbar")]),
            "&#32;&#32;foo&#32;\\\n&#9;bar\n"
        );
        assert_eq!(
            render_body(&[StructuralNode::heading(1, "a\nb")]),
            "# a&#10;b\n"
        );
        assert_eq!(
            render_body(&[StructuralNode::quote("a\n\nb")]),
            "> a\\\n> &#10;b\n"
        );
    }

    #[test]
    fn styled_edges_stay_outside_entities() {
        let text = InlineText::new(vec![
            TextRun::styled(" lead", StyleFlags::bold()),
            TextRun::plain(" mid "),
            TextRun::styled("code ", StyleFlags::code()),
        ]);
        assert_eq!(render_inline(&text, InlineContext::Block), "&#32;**lead** mid `code `");
        assert_eq!(
            round_trip(&[StructuralNode::paragraph(text)]),
            vec![StructuralNode::paragraph(InlineText::new(vec![
                TextRun::plain(" "),
                TextRun::styled("lead", StyleFlags::bold()),
                TextRun::plain(" mid "),
                TextRun::styled("code ", StyleFlags::code()),
            ]))]
        );
    }

    #[test]
    fn empty_body_renders_empty() {
        assert_eq!(render_body(&[]), "");
        assert_eq!(render_body(&[StructuralNode::Table { rows: vec![] }]), "");
    }
}
