//! Statement lexer implementation.

use super::{Span, Token, TokenKind};

/// A lexer that turns SQL text into a token stream.
///
/// It only knows enough SQL to find statement boundaries and object
/// headers: words, quotes, `$$` bodies and punctuation. Comments and
/// whitespace are skipped.
pub struct Lexer<'a> {
    /// The input source code.
    input: &'a str,
    /// The current byte position.
    pos: usize,
    /// The byte position of the start of the current token.
    start: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given input.
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            start: 0,
        }
    }

    /// Returns the current character without advancing.
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    /// Returns the next character without advancing.
    fn peek_next(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    /// Advances to the next character and returns it.
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Skips whitespace and comments.
    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.advance();
            }

            if self.peek() == Some('-') && self.peek_next() == Some('-') {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.advance();
                }
                continue;
            }

            if self.peek() == Some('/') && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    match self.advance() {
                        Some('*') if self.peek() == Some('/') => {
                            self.advance();
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }
                continue;
            }

            break;
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, Span::new(self.start, self.pos))
    }

    fn scan_word(&mut self) -> Token {
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.advance();
        }
        self.make_token(TokenKind::Word)
    }

    /// Scans a quoted run. A doubled quote is an escaped quote; inside
    /// string literals a backslash escapes the next character.
    fn scan_quoted(&mut self, quote: char, kind: TokenKind) -> Token {
        loop {
            match self.advance() {
                Some(c) if c == quote => {
                    if self.peek() == Some(quote) {
                        self.advance();
                    } else {
                        return self.make_token(kind);
                    }
                }
                Some('\\') if quote == '\'' => {
                    self.advance();
                }
                Some(_) => {}
                None => return self.make_token(TokenKind::Unterminated),
            }
        }
    }

    fn scan_dollar_block(&mut self) -> Token {
        self.advance(); // second $
        loop {
            match self.advance() {
                Some('$') if self.peek() == Some('$') => {
                    self.advance();
                    return self.make_token(TokenKind::DollarBlock);
                }
                Some(_) => {}
                None => return self.make_token(TokenKind::Unterminated),
            }
        }
    }

    /// Scans the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_whitespace_and_comments();
        self.start = self.pos;

        let c = self.advance()?;
        let token = match c {
            ';' => self.make_token(TokenKind::Semicolon),
            '.' => self.make_token(TokenKind::Dot),
            '\'' => self.scan_quoted('\'', TokenKind::String),
            '"' => self.scan_quoted('"', TokenKind::QuotedIdent),
            '$' if self.peek() == Some('$') => self.scan_dollar_block(),
            c if c.is_alphanumeric() || c == '_' || c == '$' => self.scan_word(),
            c => self.make_token(TokenKind::Punct(c)),
        };
        Some(token)
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input).map(|t| t.kind).collect()
    }

    #[test]
    fn test_words_and_punctuation() {
        let input = "create table DB.S.T (id int);";
        let tokens: Vec<Token> = Lexer::new(input).collect();
        assert_eq!(tokens[0].text(input), "create");
        assert_eq!(tokens[2].text(input), "DB");
        assert_eq!(tokens[3].kind, TokenKind::Dot);
        assert_eq!(tokens[6].text(input), "T");
        assert_eq!(tokens[7].kind, TokenKind::Punct('('));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Semicolon));
    }

    #[test]
    fn test_comments_are_skipped() {
        let input = "-- header; with semicolon\n/* block; */ SELECT 1";
        let tokens: Vec<Token> = Lexer::new(input).collect();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text(input), "SELECT");
    }

    #[test]
    fn test_strings_hide_semicolons() {
        assert_eq!(
            kinds("'a;b' 'it''s' 'x\\'y'"),
            vec![TokenKind::String, TokenKind::String, TokenKind::String]
        );
    }

    #[test]
    fn test_dollar_block() {
        let input = "AS $$ BEGIN RETURN 1; END $$;";
        assert_eq!(
            kinds(input),
            vec![TokenKind::Word, TokenKind::DollarBlock, TokenKind::Semicolon]
        );
    }

    #[test]
    fn test_unterminated() {
        assert_eq!(kinds("'open"), vec![TokenKind::Unterminated]);
        assert_eq!(kinds("\"open"), vec![TokenKind::Unterminated]);
    }

    #[test]
    fn test_quoted_identifier() {
        let input = "\"My \"\"Table\"\"\"";
        let token = Lexer::new(input).next().unwrap();
        assert_eq!(token.kind, TokenKind::QuotedIdent);
        assert_eq!(token.identifier(input).as_deref(), Some("My \"Table\""));
    }
}
