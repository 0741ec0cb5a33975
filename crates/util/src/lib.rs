//! Text utilities shared by the Parley registry and engine.

pub mod collection_literal;
pub mod shell_lexing;
pub mod text_processing;

pub use collection_literal::{Bracket, BracketSpan, find_bracket_spans, split_entry, split_items, strip_brackets};
pub use shell_lexing::{RawToken, split_arguments, tokenize, unquote};
pub use text_processing::{expand_tilde, is_numeric_literal, looks_like_flag, parse_bool_literal, strip_flag_prefix};
