//! DOI recovery from free text, URLs and landing-page links.

use once_cell::sync::Lazy;
use regex::Regex;

static DOI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b10[.][0-9]{4,}(?:[.][0-9]+)*/[^\s"&'<>]+"#).expect("valid regex")
});

static OPENALEX_PREFIX: &str = "https://openalex.org/";

/// First DOI embedded in `text`, uppercased, or an empty string.
pub fn extract_doi(text: &str) -> String {
    let Some(found) = DOI_PATTERN.find(text) else {
        return String::new();
    };
    // The match must end on a word character, like a closing `\b` would force.
    let candidate = found
        .as_str()
        .trim_end_matches(|ch: char| !(ch.is_alphanumeric() || ch == '_'));
    if !candidate.contains('/') || candidate.ends_with('/') {
        return String::new();
    }
    candidate.to_uppercase()
}

/// Case-insensitive DOI equality over the extracted forms. Two inputs without
/// a DOI are never the same.
pub fn same_doi(a: &str, b: &str) -> bool {
    let (a, b) = (extract_doi(a), extract_doi(b));
    !a.is_empty() && a.eq_ignore_ascii_case(&b)
}

/// DOI carried by a `doi.org` hyperlink, e.g. an anchor on a publisher page.
pub fn doi_from_link(href: &str) -> Option<String> {
    let lowered = href.to_ascii_lowercase();
    let start = lowered.find("doi.org/")? + "doi.org/".len();
    let tail = decode_slashes(&href[start..]);
    let tail = strip_leading_noise(&tail);
    let doi = extract_doi(tail);
    (!doi.is_empty()).then_some(doi)
}

/// Drops everything before the first ASCII digit: `"doi:10.1/x"` -> `"10.1/x"`.
pub fn strip_leading_noise(candidate: &str) -> &str {
    match candidate.find(|ch: char| ch.is_ascii_digit()) {
        Some(idx) => &candidate[idx..],
        None => "",
    }
}

/// `https://openalex.org/W2741809807` -> `W2741809807`.
pub fn openalex_short_id(id: &str) -> String {
    id.trim()
        .strip_prefix(OPENALEX_PREFIX)
        .unwrap_or(id.trim())
        .to_string()
}

fn decode_slashes(value: &str) -> String {
    value.replace("%2F", "/").replace("%2f", "/")
}
