//! Attachment filename generation for recognized items.

use crate::defaults::{ATTACHMENT_FILENAME_FALLBACK, ATTACHMENT_FILENAME_MAX_LEN};
use crate::item::ParsedItem;

/// Build `{creators} - {year} - {title}.{extension}` for a recognized item.
///
/// Creators render as `Last`, `Last and Last`, or `Last et al.`. Missing parts
/// are skipped. The result is sanitised and truncated to
/// [`ATTACHMENT_FILENAME_MAX_LEN`] characters with the extension preserved.
pub fn attachment_filename(item: &ParsedItem, extension: Option<&str>) -> String {
    let authors: Vec<&str> = item
        .creators
        .iter()
        .filter(|c| c.creator_type == "author")
        .map(|c| c.last_name.trim())
        .filter(|name| !name.is_empty())
        .collect();
    let creators = match authors.as_slice() {
        [] => None,
        [one] => Some((*one).to_string()),
        [first, second] => Some(format!("{} and {}", first, second)),
        [first, ..] => Some(format!("{} et al.", first)),
    };

    let parts: Vec<String> = [
        creators,
        item.year().map(str::to_string),
        Some(item.title.trim().to_string()).filter(|t| !t.is_empty()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let stem = if parts.is_empty() {
        ATTACHMENT_FILENAME_FALLBACK.to_string()
    } else {
        parts.join(" - ")
    };

    with_extension(&sanitize_filename(&stem), extension)
}

/// Replace path separators, reserved and control characters, and collapse whitespace.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();

    let collapsed = replaced.split_whitespace().collect::<Vec<_>>().join(" ");
    // Leading dots would hide the file on Unix.
    let trimmed = collapsed.trim_start_matches('.').trim();

    if trimmed.is_empty() {
        ATTACHMENT_FILENAME_FALLBACK.to_string()
    } else {
        trimmed.to_string()
    }
}

fn with_extension(stem: &str, extension: Option<&str>) -> String {
    let suffix = extension
        .map(|ext| ext.trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();

    let budget = ATTACHMENT_FILENAME_MAX_LEN.saturating_sub(suffix.chars().count());
    let stem: String = if stem.chars().count() > budget {
        stem.chars().take(budget).collect::<String>().trim_end().to_string()
    } else {
        stem.to_string()
    };

    format!("{}{}", stem, suffix)
}
