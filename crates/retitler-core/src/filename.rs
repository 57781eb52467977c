use crate::{MetadataRecord, UNKNOWN_TITLE};

/// Titles are truncated to this many characters before sanitizing.
pub const MAX_TITLE_CHARS: usize = 80;

/// Characters removed outright from a title.
const STRIPPED_CHARS: &[char] = &['*', '?', ':', '"', '<', '>', '|'];

/// Make a title safe for use as a filename component.
///
/// The title is truncated to [`MAX_TITLE_CHARS`] characters, path separators
/// become word breaks, reserved characters are removed, and each inner
/// whitespace character becomes an underscore.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .take(MAX_TITLE_CHARS)
        .filter(|c| !STRIPPED_CHARS.contains(c))
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return UNKNOWN_TITLE.to_string();
    }
    trimmed
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// `<year>_<sanitized title>.pdf`
pub fn build_filename(record: &MetadataRecord) -> String {
    format!("{}_{}.pdf", record.year, sanitize_title(&record.title))
}
