//! Markdown documents on disk: front-matter plus a CommonMark body

mod frontmatter;
mod reader;
mod writer;

pub use frontmatter::FrontMatter;
pub use reader::parse_body;
pub use writer::render_body;

use crate::error::Result;
use crate::models::{DocumentMetadata, StructuralDocument, StructuralNode};

/// A parsed local file. `raw_body` is the text after the front-matter,
/// kept verbatim so metadata-only rewrites do not reformat the body.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDocument {
    pub document: StructuralDocument,
    pub raw_body: String,
}

/// Parse file content. The title comes from front-matter, then the first
/// level-one heading, then `fallback_title` (usually the file stem).
pub fn parse_document(content: &str, fallback_title: &str) -> Result<LocalDocument> {
    let (yaml, body) = frontmatter::split(content);
    let front = frontmatter::parse(yaml)?;
    let nodes = parse_body(body);

    let title = front
        .title
        .or_else(|| first_heading(&nodes))
        .unwrap_or_else(|| fallback_title.to_string());
    let metadata = DocumentMetadata {
        title,
        ..front.metadata
    };

    Ok(LocalDocument {
        document: StructuralDocument::new(metadata, nodes),
        raw_body: body.to_string(),
    })
}

/// Full file content for `metadata` and an already rendered body.
pub fn render_document(metadata: &DocumentMetadata, body: &str) -> Result<String> {
    let yaml = frontmatter::render(metadata)?;
    let mut content = format!("---\n{yaml}---\n");
    if !body.is_empty() {
        content.push('\n');
        content.push_str(body);
        if !body.ends_with('\n') {
            content.push('\n');
        }
    }
    Ok(content)
}

fn first_heading(nodes: &[StructuralNode]) -> Option<String> {
    nodes.iter().find_map(|node| match node {
        StructuralNode::Heading { level: 1, text } => {
            let title = text.plain_text().trim().to_string();
            (!title.is_empty()).then_some(title)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn title_prefers_front_matter_then_heading_then_fallback() {
        let with_front = parse_document("---\ntitle: Front\n---\n# Heading\n", "stem").unwrap();
        assert_eq!(with_front.document.title(), "Front");

        let with_heading = parse_document("Intro\n\n# Heading\n", "stem").unwrap();
        assert_eq!(with_heading.document.title(), "Heading");

        let bare = parse_document("just text\n", "stem").unwrap();
        assert_eq!(bare.document.title(), "stem");
    }

    #[test]
    fn raw_body_is_kept_verbatim() {
        let content = "---\ntitle: T\nnotion_page_id: abc\n---\n\nSome   *odd*   spacing\n";
        let local = parse_document(content, "t").unwrap();
        assert_eq!(local.raw_body, "Some   *odd*   spacing\n");
        assert_eq!(local.document.remote_id(), Some("abc"));
    }

    #[test]
    fn rendered_document_parses_back() {
        let mut metadata = DocumentMetadata::titled("Plan");
        metadata.remote_id = Some("abc".to_string());
        metadata.extra.insert("author".into(), "Ada".into());
        let body = render_body(&[
            StructuralNode::heading(1, "Plan"),
            StructuralNode::paragraph("Text"),
        ]);

        let content = render_document(&metadata, &body).unwrap();
        let parsed = parse_document(&content, "x").unwrap();
        assert_eq!(parsed.document.metadata(), &metadata);
        assert_eq!(parsed.raw_body, body);
        assert_eq!(
            parsed.document.body(),
            &[
                StructuralNode::heading(1, "Plan"),
                StructuralNode::paragraph("Text"),
            ]
        );
    }

    #[test]
    fn metadata_does_not_change_fingerprint() {
        let plain = parse_document("# T\n\nbody\n", "x").unwrap();
        let tagged =
            parse_document("---\ntitle: T\ntags: [a]\nnotion_page_id: id\n---\n# T\n\nbody\n", "x")
                .unwrap();
        assert_eq!(plain.document.fingerprint(), tagged.document.fingerprint());
    }
}
