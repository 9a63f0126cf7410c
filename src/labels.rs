//! Label normalization: the one place hierarchy strings and stringified label
//! lists are turned into per-level label sequences.

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_SEPARATOR: &str = " > ";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Splits `"protect from harm > protect from temperature"` into lowercase,
/// trimmed segments, broadest first.
pub fn split_hierarchy(raw: &str, separator: &str) -> Vec<String> {
    let separator = separator.trim();
    let parts: Vec<&str> = if separator.is_empty() {
        vec![raw]
    } else {
        raw.split(separator).collect()
    };
    parts
        .into_iter()
        .map(normalize_label)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// The segment of a hierarchy string at `depth` (0 = broadest).
pub fn label_at_level(raw: &str, depth: usize, separator: &str) -> Option<String> {
    split_hierarchy(raw, separator).into_iter().nth(depth)
}

pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Absent levels become empty; blank entries are dropped, order is kept.
pub fn normalize_level(level: Option<&[String]>) -> Vec<String> {
    level
        .unwrap_or_default()
        .iter()
        .map(|label| normalize_label(label))
        .filter(|label| !label.is_empty())
        .collect()
}

/// Form written to the golden dataset: `"Manage Mechanical Forces"` becomes
/// `"manage_mechanical_forces"`.
pub fn emitted_form(label: &str) -> String {
    WHITESPACE
        .replace_all(label.trim(), "_")
        .to_lowercase()
}

pub fn emitted_level(level: &[String]) -> Vec<String> {
    level.iter().map(|label| emitted_form(label)).collect()
}

/// Parses a CSV cell holding a stringified list such as `['attach', "move"]`
/// or `["attach"]`. A bare value is a single-element list; blank and `nan`
/// cells are empty.
pub fn parse_label_cell(cell: &str) -> Vec<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Vec::new();
    }
    if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
        return items
            .into_iter()
            .filter(|item| !item.trim().is_empty())
            .collect();
    }
    let Some(inner) = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return vec![trimmed.to_string()];
    };
    split_quoted_items(inner)
}

fn split_quoted_items(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in inner.chars() {
        match quote {
            Some(open) => {
                if escaped {
                    current.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == open {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                ',' => {
                    push_item(&mut items, &current);
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }
    push_item(&mut items, &current);
    items
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let item = raw.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
}
