//! Quote-aware tokenizing of command lines.
//!
//! Whitespace separates tokens. Single- and double-quoted spans stay inside
//! one token, and outside single quotes a backslash escapes the next character.

/// A token as it appears in the source line, quotes included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawToken<'a> {
    pub text: &'a str,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset just past the last character.
    pub end: usize,
}

impl<'a> RawToken<'a> {
    fn new(input: &'a str, start: usize, end: usize) -> Self {
        Self {
            text: &input[start..end],
            start,
            end,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

impl Quote {
    fn step(self, character: char) -> Self {
        match (self, character) {
            (Self::None, '\'') => Self::Single,
            (Self::None, '"') => Self::Double,
            (Self::Single, '\'') | (Self::Double, '"') => Self::None,
            (state, _) => state,
        }
    }

    fn escapes(self) -> bool {
        self != Self::Single
    }
}

/// Split a line into argument values with quotes and escapes removed.
///
/// # Example
/// ```rust
/// use parley_util::shell_lexing::split_arguments;
///
/// let tokens = split_arguments("greet --name 'Ada Lovelace' \"x y\"");
/// assert_eq!(tokens, vec!["greet", "--name", "Ada Lovelace", "x y"]);
/// ```
pub fn split_arguments(input: &str) -> Vec<String> {
    tokenize(input).into_iter().map(|token| unquote(token.text)).collect()
}

/// Tokenize `input` keeping each token's source slice and byte range.
///
/// # Example
/// ```rust
/// use parley_util::shell_lexing::tokenize;
///
/// let tokens = tokenize("tag 'two words'");
/// assert_eq!(tokens[1].text, "'two words'");
/// assert_eq!((tokens[1].start, tokens[1].end), (4, 15));
/// ```
pub fn tokenize(input: &str) -> Vec<RawToken<'_>> {
    let mut tokens = Vec::new();
    let mut open: Option<usize> = None;
    let mut quote = Quote::None;
    let mut chars = input.char_indices();

    while let Some((index, character)) = chars.next() {
        if quote == Quote::None && character.is_whitespace() {
            if let Some(start) = open.take() {
                tokens.push(RawToken::new(input, start, index));
            }
            continue;
        }
        open.get_or_insert(index);
        if character == '\\' && quote.escapes() {
            chars.next();
            continue;
        }
        quote = quote.step(character);
    }
    if let Some(start) = open {
        tokens.push(RawToken::new(input, start, input.len()));
    }

    tokens
}

/// Remove quoting and escapes from a single token.
///
/// Inside single quotes everything is literal.
pub fn unquote(token: &str) -> String {
    let mut output = String::with_capacity(token.len());
    let mut quote = Quote::None;
    let mut chars = token.chars();

    while let Some(character) = chars.next() {
        if character == '\\' && quote.escapes() {
            output.push(chars.next().unwrap_or('\\'));
            continue;
        }
        let next = quote.step(character);
        if next == quote {
            output.push(character);
        }
        quote = next;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_separates_tokens() {
        assert_eq!(split_arguments("  add\t1   2 "), vec!["add", "1", "2"]);
        assert!(split_arguments("").is_empty());
        assert!(split_arguments(" \t\n ").is_empty());
    }

    #[test]
    fn quotes_group_and_are_removed() {
        assert_eq!(split_arguments("note 'buy milk' \"and eggs\""), vec!["note", "buy milk", "and eggs"]);
        assert_eq!(split_arguments("say \"it's\""), vec!["say", "it's"]);
        assert_eq!(split_arguments("--title='a b' c"), vec!["--title=a b", "c"]);
    }

    #[test]
    fn backslash_escapes_outside_single_quotes() {
        assert_eq!(split_arguments("open my\\ file.txt"), vec!["open", "my file.txt"]);
        assert_eq!(split_arguments("'C:\\dir'"), vec!["C:\\dir"]);
        assert_eq!(split_arguments("tail\\"), vec!["tail\\"]);
        assert_eq!(split_arguments("a\\é b"), vec!["aé", "b"]);
    }

    #[test]
    fn ranges_map_back_to_source() {
        let input = "set name \"x y\"";
        let tokens = tokenize(input);
        assert_eq!(tokens.len(), 3);
        assert_eq!((tokens[0].start, tokens[0].end), (0, 3));
        assert_eq!(&input[tokens[2].start..tokens[2].end], "\"x y\"");
        assert_eq!(tokens[2].end, input.len());
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        assert_eq!(split_arguments("echo 'open ended"), vec!["echo", "open ended"]);
    }
}
