//! Input validation for names that end up in paths

use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::LazyLock;

/// Printable characters except path separators
static VALID_ENTRY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^/\\\x00-\x1f\x7f]+$").unwrap());

/// Longest accepted folder or file name
pub const MAX_NAME_LEN: usize = 191;

/// Validate a folder or file name and return it trimmed
pub fn validate_entry_name(name: &str, kind: &str) -> AppResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} name is required", kind)));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(AppError::Validation(format!("{} name is reserved: {}", kind, trimmed)));
    }
    if !VALID_ENTRY_NAME.is_match(trimmed) {
        return Err(AppError::Validation(format!(
            "{} name contains forbidden characters: {}",
            kind, trimmed
        )));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "{} name exceeds {} characters",
            kind, MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Require a non-blank value
pub fn require_text(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Treat empty or whitespace-only strings as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert_eq!(validate_entry_name(" Reports ", "Folder").unwrap(), "Reports");
        assert!(validate_entry_name("Q3 plan (final).pdf", "File").is_ok());
        assert!(validate_entry_name("2024", "Folder").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_entry_name("", "Folder").is_err());
        assert!(validate_entry_name("   ", "Folder").is_err());
        assert!(validate_entry_name("a/b", "Folder").is_err());
        assert!(validate_entry_name("a\\b", "Folder").is_err());
        assert!(validate_entry_name("..", "Folder").is_err());
        assert!(validate_entry_name("bad\u{0}name", "File").is_err());
        assert!(validate_entry_name(&"x".repeat(MAX_NAME_LEN + 1), "File").is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("a".into())), Some("a".into()));
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
