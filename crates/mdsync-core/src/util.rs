//! Shared utility functions used across multiple modules.

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Convert `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(value: &str) -> String {
    if value.contains('\r') {
        value.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        value.to_string()
    }
}

/// Normalize a Notion page id to its dashed 8-4-4-4-12 form.
///
/// Accepts bare 32-digit ids, dashed ids, and page URLs ending in an id.
/// Returns `None` when no id can be found.
pub fn normalize_notion_id(value: &str) -> Option<String> {
    let value = value.split('?').next().unwrap_or_default();
    let value = value.trim().trim_end_matches('/');
    let tail = value
        .rsplit(['/', '-'])
        .next()
        .filter(|tail| tail.len() == 32 && tail.chars().all(|c| c.is_ascii_hexdigit()));
    let hex: String = match tail {
        Some(tail) => tail.to_string(),
        None => value.chars().filter(|c| *c != '-').collect(),
    };
    let hex = hex.to_ascii_lowercase();
    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}

/// File-name slug for a title: alphanumerics kept, whitespace runs become `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in title.trim().chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug
}
