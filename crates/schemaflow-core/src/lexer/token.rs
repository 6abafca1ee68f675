//! Token types for the statement lexer.

use super::Span;

/// The kind of a lexed token.
///
/// Token payloads are not copied out of the source; use [`Token::text`] to
/// get at the underlying characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A bare word: keyword, identifier or number (`[A-Za-z0-9_$]+`).
    Word,
    /// A single-quoted string literal.
    String,
    /// A double-quoted identifier.
    QuotedIdent,
    /// A `$$ ... $$` body (procedures, functions, tasks).
    DollarBlock,
    /// `.`
    Dot,
    /// `;`
    Semicolon,
    /// Any other single character.
    Punct(char),
    /// A quote or `$$` block that never closes.
    Unterminated,
}

/// A token with its location in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// Location in the source.
    pub span: Span,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Returns the raw source text of the token.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.slice(source)
    }

    /// Returns true if this is a word equal to `keyword`, ignoring case.
    #[must_use]
    pub fn is_keyword(&self, source: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(source).eq_ignore_ascii_case(keyword)
    }

    /// Returns the identifier this token names, unquoted and upper-cased
    /// when it was a bare word.
    ///
    /// Quoted identifiers keep their case (with `""` unescaped); other
    /// token kinds return `None`.
    #[must_use]
    pub fn identifier(&self, source: &str) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text(source).to_uppercase()),
            TokenKind::QuotedIdent => {
                let raw = self.text(source);
                let inner = &raw[1..raw.len() - 1];
                Some(inner.replace("\"\"", "\""))
            }
            _ => None,
        }
    }
}
