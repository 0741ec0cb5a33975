//! Scanning of bracketed collection literals.
//!
//! `[a,b]` denotes a list or array, `(a,b)` a set and `{k:v,k2:v2}` a map.
//! Items may be single- or double-quoted to keep commas, colons or spaces.

use crate::shell_lexing::unquote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bracket {
    /// `[..]`
    Square,
    /// `(..)`
    Round,
    /// `{..}`
    Curly,
}

impl Bracket {
    pub fn from_open(character: char) -> Option<Self> {
        match character {
            '[' => Some(Self::Square),
            '(' => Some(Self::Round),
            '{' => Some(Self::Curly),
            _ => None,
        }
    }

    pub fn open(self) -> char {
        match self {
            Self::Square => '[',
            Self::Round => '(',
            Self::Curly => '{',
        }
    }

    pub fn close(self) -> char {
        match self {
            Self::Square => ']',
            Self::Round => ')',
            Self::Curly => '}',
        }
    }
}

/// A top-level bracketed span found in a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketSpan {
    pub bracket: Bracket,
    /// Byte offset of the opening bracket.
    pub start: usize,
    /// Byte offset just past the closing bracket.
    pub end: usize,
    /// Text between the brackets, untrimmed.
    pub inner: String,
}

/// Find every top-level bracketed span in `input`.
///
/// Brackets inside quotes are ignored and nested brackets stay part of the
/// enclosing span. An unterminated span is not reported.
///
/// # Example
/// ```rust
/// use parley_util::collection_literal::{Bracket, find_bracket_spans};
///
/// let spans = find_bracket_spans("--tags [a,b] {x:1}");
/// assert_eq!(spans.len(), 2);
/// assert_eq!(spans[0].bracket, Bracket::Square);
/// assert_eq!(spans[1].inner, "x:1");
/// ```
pub fn find_bracket_spans(input: &str) -> Vec<BracketSpan> {
    let mut spans = Vec::new();
    let mut quote: Option<char> = None;
    let mut open: Option<(Bracket, usize)> = None;
    let mut depth = 0usize;
    let mut chars = input.char_indices();

    while let Some((index, character)) = chars.next() {
        if character == '\\' && quote != Some('\'') {
            chars.next();
            continue;
        }
        if let Some(active) = quote {
            if character == active {
                quote = None;
            }
            continue;
        }
        match character {
            '\'' | '"' => quote = Some(character),
            _ if Bracket::from_open(character).is_some() => {
                if open.is_none() {
                    open = Bracket::from_open(character).map(|bracket| (bracket, index));
                }
                depth += 1;
            }
            ']' | ')' | '}' if depth > 0 => {
                depth -= 1;
                if depth == 0
                    && let Some((bracket, start)) = open.take()
                {
                    if character == bracket.close() {
                        spans.push(BracketSpan {
                            bracket,
                            start,
                            end: index + character.len_utf8(),
                            inner: input[start + 1..index].to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    spans
}

/// If `literal` is wholly wrapped in one bracket pair, return the pair and inner text.
pub fn strip_brackets(literal: &str) -> Option<(Bracket, &str)> {
    let trimmed = literal.trim();
    let bracket = Bracket::from_open(trimmed.chars().next()?)?;
    let inner = trimmed.strip_prefix(bracket.open())?.strip_suffix(bracket.close())?;
    Some((bracket, inner))
}

/// Split the inside of a collection literal on top-level commas.
///
/// Items are trimmed and unquoted; a blank literal yields no items.
pub fn split_items(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(inner, ',').into_iter().map(|item| unquote(item.trim())).collect()
}

/// Split a map entry on its first top-level colon.
///
/// Returns `None` for entries without a colon. Both halves are unquoted.
pub fn split_entry(entry: &str) -> Option<(String, String)> {
    let parts = split_top_level(entry, ':');
    let (key, _) = parts.split_first()?;
    if parts.len() < 2 {
        return None;
    }
    let value = &entry[key.len() + 1..];
    Some((unquote(key.trim()), unquote(value.trim())))
}

/// Split `text` on `separator` where it is outside quotes and brackets.
fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut segment_start = 0usize;
    let mut chars = text.char_indices();

    while let Some((index, character)) = chars.next() {
        if character == '\\' && quote != Some('\'') {
            chars.next();
            continue;
        }
        if let Some(active) = quote {
            if character == active {
                quote = None;
            }
            continue;
        }
        match character {
            '\'' | '"' => quote = Some(character),
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            _ if character == separator && depth == 0 => {
                parts.push(&text[segment_start..index]);
                segment_start = index + character.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[segment_start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_record_offsets_and_kinds() {
        let input = "a [1,2] b (x) {k:v}";
        let spans = find_bracket_spans(input);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].bracket, Bracket::Square);
        assert_eq!(&input[spans[0].start..spans[0].end], "[1,2]");
        assert_eq!(spans[1].bracket, Bracket::Round);
        assert_eq!(spans[2].inner, "k:v");
    }

    #[test]
    fn quoted_brackets_are_ignored() {
        let spans = find_bracket_spans("say '[not a list]' [\"a]b\", c]");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].inner, "\"a]b\", c");
    }

    #[test]
    fn nested_brackets_stay_in_outer_span() {
        let spans = find_bracket_spans("{a:[1,2],b:(3)}");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].inner, "a:[1,2],b:(3)");
    }

    #[test]
    fn unterminated_span_is_dropped() {
        assert!(find_bracket_spans("[1,2").is_empty());
    }

    #[test]
    fn items_keep_quoted_commas() {
        assert_eq!(split_items("a, 'b, c' ,\"d e\""), vec!["a", "b, c", "d e"]);
        assert!(split_items("  ").is_empty());
        assert_eq!(split_items("[1,2],3"), vec!["[1,2]", "3"]);
    }

    #[test]
    fn entries_split_on_first_colon() {
        assert_eq!(split_entry("url:'http://x'"), Some(("url".to_string(), "http://x".to_string())));
        assert_eq!(split_entry("time: 12:30"), Some(("time".to_string(), "12:30".to_string())));
        assert_eq!(split_entry("'a:b':c"), Some(("a:b".to_string(), "c".to_string())));
        assert_eq!(split_entry("novalue"), None);
    }

    #[test]
    fn strip_brackets_requires_matching_pair() {
        assert_eq!(strip_brackets(" [1,2] "), Some((Bracket::Square, "1,2")));
        assert_eq!(strip_brackets("{a:1}"), Some((Bracket::Curly, "a:1")));
        assert_eq!(strip_brackets("[1,2)"), None);
        assert_eq!(strip_brackets("1,2"), None);
    }
}
