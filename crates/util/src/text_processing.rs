//! # Text Processing Utilities
//!
//! Literal classification shared by the parsers and the type coercion layer.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

static NUMERIC_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("numeric literal regex should compile")
});

/// Whether `token` is a plain decimal number such as `-5`, `3.14` or `1e-3`.
///
/// Numeric tokens are never treated as flags even though they may start with `-`.
///
/// # Example
/// ```rust
/// use parley_util::text_processing::is_numeric_literal;
///
/// assert!(is_numeric_literal("-42"));
/// assert!(is_numeric_literal("-0.5"));
/// assert!(!is_numeric_literal("-v"));
/// ```
pub fn is_numeric_literal(token: &str) -> bool {
    NUMERIC_LITERAL.is_match(token)
}

/// Whether `token` would be read as a flag by the default parser.
///
/// A lone `-` counts; it strips to an empty name and is discarded.
pub fn looks_like_flag(token: &str) -> bool {
    token.starts_with('-') && !is_numeric_literal(token)
}

/// Strip the flag prefix: two dashes for `--name`, one for `-n`.
pub fn strip_flag_prefix(token: &str) -> &str {
    token
        .strip_prefix("--")
        .or_else(|| token.strip_prefix('-'))
        .unwrap_or(token)
}

/// Parse a boolean literal, case-insensitively.
///
/// Accepts `true/false`, `yes/no`, `on/off` and `1/0`.
pub fn parse_bool_literal(literal: &str) -> Option<bool> {
    match literal.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let trimmed = path.trim();
    let Some(rest) = trimmed.strip_prefix('~') else {
        return PathBuf::from(trimmed);
    };
    let Some(home) = dirs_next::home_dir() else {
        return PathBuf::from(trimmed);
    };
    match rest.strip_prefix(['/', '\\']) {
        Some(relative) => home.join(relative),
        None if rest.is_empty() => home,
        // `~user` forms are left alone.
        None => PathBuf::from(trimmed),
    }
}
