//! YAML front-matter split, parse and render

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};
use crate::models::DocumentMetadata;

const TITLE_KEY: &str = "title";
const REMOTE_ID_KEY: &str = "notion_page_id";
const LAST_SYNCED_KEY: &str = "last_synced";
const TAGS_KEY: &str = "tags";
const RESERVED_KEYS: &[&str] = &[TITLE_KEY, REMOTE_ID_KEY, LAST_SYNCED_KEY, TAGS_KEY];

/// Split `content` into the YAML block (without delimiters) and the body.
pub fn split(content: &str) -> (Option<&str>, &str) {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Some(rest) = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(['\r', '\n']);
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

/// Front-matter fields; `title` stays optional so callers can fall back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub metadata: DocumentMetadata,
}

pub fn parse(yaml: Option<&str>) -> Result<FrontMatter> {
    let Some(yaml) = yaml.filter(|yaml| !yaml.trim().is_empty()) else {
        return Ok(FrontMatter::default());
    };

    let mapping = match serde_yaml::from_str::<Value>(yaml)? {
        Value::Mapping(mapping) => mapping,
        Value::Null => Mapping::new(),
        _ => {
            return Err(Error::InvalidInput(
                "front-matter must be a key/value mapping".to_string(),
            ))
        }
    };

    let mut front = FrontMatter::default();
    for (key, value) in mapping {
        match key.as_str() {
            Some(TITLE_KEY) => front.title = scalar_text(&value),
            Some(REMOTE_ID_KEY) => front.metadata.remote_id = scalar_text(&value),
            Some(LAST_SYNCED_KEY) => {
                front.metadata.last_synced = scalar_text(&value).and_then(|text| parse_timestamp(&text));
            }
            Some(TAGS_KEY) => front.metadata.tags = parse_tags(&value).into_iter().collect(),
            _ => {
                front.metadata.extra.insert(key, value);
            }
        }
    }
    Ok(front)
}

/// Render metadata as a YAML block without the `---` delimiters.
pub fn render(metadata: &DocumentMetadata) -> Result<String> {
    let mut mapping = Mapping::new();
    mapping.insert(TITLE_KEY.into(), metadata.title.clone().into());
    if let Some(remote_id) = &metadata.remote_id {
        mapping.insert(REMOTE_ID_KEY.into(), remote_id.clone().into());
    }
    if let Some(last_synced) = metadata.last_synced {
        mapping.insert(
            LAST_SYNCED_KEY.into(),
            last_synced
                .to_rfc3339_opts(SecondsFormat::Secs, true)
                .into(),
        );
    }
    if !metadata.tags.is_empty() {
        let tags = metadata.tags.iter().cloned().map(Value::from).collect();
        mapping.insert(TAGS_KEY.into(), Value::Sequence(tags));
    }
    for (key, value) in &metadata.extra {
        if key.as_str().is_some_and(|key| RESERVED_KEYS.contains(&key)) {
            continue;
        }
        mapping.insert(key.clone(), value.clone());
    }

    Ok(serde_yaml::to_string(&Value::Mapping(mapping))?)
}

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn parse_tags(value: &Value) -> Vec<String> {
    match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// RFC 3339, or a naive ISO timestamp read as UTC.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_separates_yaml_and_body() {
        let content = "---\ntitle: Plan\n---\n\n# Body\n";
        let (yaml, body) = split(content);
        assert_eq!(yaml, Some("title: Plan\n"));
        assert_eq!(body, "# Body\n");
    }

    #[test]
    fn split_without_closing_delimiter_keeps_everything() {
        let content = "---\ntitle: Plan\n\nno end";
        assert_eq!(split(content), (None, content));
        assert_eq!(split("plain"), (None, "plain"));
    }

    #[test]
    fn parse_reads_recognized_keys_and_keeps_extras_in_order() {
        let yaml = "title: Plan\nnotion_page_id: abc\nlast_synced: 2024-03-01T10:00:00Z\ntags: [work, q3]\nauthor: Ada\naliases:\n  - plan\n";
        let front = parse(Some(yaml)).unwrap();

        assert_eq!(front.title.as_deref(), Some("Plan"));
        assert_eq!(front.metadata.remote_id.as_deref(), Some("abc"));
        assert_eq!(
            front.metadata.last_synced,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(
            front.metadata.tags.iter().collect::<Vec<_>>(),
            vec!["q3", "work"]
        );
        let keys: Vec<_> = front
            .metadata
            .extra
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["author", "aliases"]);
    }

    #[test]
    fn parse_accepts_comma_separated_tags_and_naive_timestamps() {
        let front = parse(Some("tags: a, b\nlast_synced: 2023-06-09T10:00:00.123456\n")).unwrap();
        assert_eq!(front.metadata.tags.len(), 2);
        assert!(front.metadata.last_synced.is_some());
    }

    #[test]
    fn parse_rejects_non_mapping() {
        assert!(parse(Some("- a\n- b\n")).is_err());
        assert!(parse(Some("title: [unclosed\n")).is_err());
        assert_eq!(parse(Some("  \n")).unwrap(), FrontMatter::default());
    }

    #[test]
    fn render_orders_recognized_keys_first() {
        let mut metadata = DocumentMetadata::titled("Plan");
        metadata.remote_id = Some("abc".to_string());
        metadata.last_synced = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        metadata.tags.insert("work".to_string());
        metadata
            .extra
            .insert("author".into(), "Ada".into());

        let yaml = render(&metadata).unwrap();
        assert!(yaml.starts_with("title: Plan\nnotion_page_id: abc\n"));
        let positions: Vec<usize> = ["last_synced:", "tags:", "author:"]
            .iter()
            .map(|key| yaml.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

        let front = parse(Some(&yaml)).unwrap();
        assert_eq!(front.metadata.extra, metadata.extra);
        assert_eq!(front.metadata.last_synced, metadata.last_synced);
    }
}
