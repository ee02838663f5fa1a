//! Scanner input and manifest text handling
//!
//! Hardware scanners terminate each read with CR and/or LF, and a slow
//! scanner can deliver a tag in fragments. Manifests arrive as free text
//! (typed or OCR) with tags embedded among other words and numbers.

use crate::models::IgnoredInput;

/// Strip CR/LF anywhere in the input, then surrounding whitespace
pub fn clean_tag(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .trim()
        .to_string()
}

/// Clean scanner input and reject empty or partial reads
pub fn normalize_scanned_tag(raw: &str, min_length: usize) -> Result<String, IgnoredInput> {
    let tag = clean_tag(raw);
    if tag.is_empty() {
        return Err(IgnoredInput::Empty);
    }

    let length = tag.chars().count();
    if length < min_length {
        return Err(IgnoredInput::TooShort { length, min_length });
    }
    Ok(tag)
}

/// Pull candidate tags out of free text
///
/// Candidates are maximal runs of ASCII digits whose length lies in
/// `min_len..=max_len`. Runs outside the range are dropped whole, never
/// split. Result is de-duplicated, keeping first-seen order.
pub fn extract_tags_from_free_text(text: &str, min_len: usize, max_len: usize) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();

    for run in text.split(|c: char| !c.is_ascii_digit()) {
        if run.len() < min_len || run.len() > max_len {
            continue;
        }
        if !tags.iter().any(|t| t == run) {
            tags.push(run.to_string());
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tag_strips_terminators() {
        assert_eq!(clean_tag("0123456789\r\n"), "0123456789");
        assert_eq!(clean_tag("  0123\n456789 "), "0123456789");
        assert_eq!(clean_tag("\r\n"), "");
    }

    #[test]
    fn test_normalize_ignores_empty() {
        assert_eq!(normalize_scanned_tag("   \r\n", 6), Err(IgnoredInput::Empty));
    }

    #[test]
    fn test_normalize_ignores_partial_read() {
        assert_eq!(
            normalize_scanned_tag("0123", 6),
            Err(IgnoredInput::TooShort { length: 4, min_length: 6 })
        );
        assert_eq!(normalize_scanned_tag("012345\r", 6), Ok("012345".to_string()));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_scanned_tag(" 0220123456\r\n", 6).unwrap();
        let twice = normalize_scanned_tag(&once, 6).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_extract_tags_from_free_text() {
        let text = "PAX SMITH/J 0220123456 2PC\nBAG 0220123457, 0220123456; ref 12345 / 12345678901234";
        assert_eq!(
            extract_tags_from_free_text(text, 6, 12),
            vec!["0220123456".to_string(), "0220123457".to_string()]
        );
    }

    #[test]
    fn test_extract_long_run_is_not_split() {
        assert!(extract_tags_from_free_text("1234567890123456", 6, 12).is_empty());
    }

    #[test]
    fn test_extract_bounds_are_inclusive() {
        let tags = extract_tags_from_free_text("123456 123456789012 12345", 6, 12);
        assert_eq!(tags, vec!["123456".to_string(), "123456789012".to_string()]);
    }

    #[test]
    fn test_extract_empty_text() {
        assert!(extract_tags_from_free_text("", 6, 12).is_empty());
        assert!(extract_tags_from_free_text("no digits here", 6, 12).is_empty());
    }
}
