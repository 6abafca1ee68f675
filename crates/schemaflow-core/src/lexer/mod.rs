//! Minimal SQL lexing.
//!
//! Not a SQL grammar: just enough structure to split a script into
//! statements without being fooled by semicolons in strings, comments or
//! `$$` bodies, and to recognize which object a `CREATE` statement defines.

mod span;
mod token;
mod tokenizer;

pub use span::Span;
pub use token::{Token, TokenKind};
pub use tokenizer::Lexer;

use crate::catalog::ObjectKind;

/// Words that may sit between `CREATE [OR REPLACE]` and the object kind.
pub(crate) const CREATE_MODIFIERS: &[&str] = &[
    "SECURE",
    "TRANSIENT",
    "TEMPORARY",
    "TEMP",
    "VOLATILE",
    "LOCAL",
    "GLOBAL",
    "RECURSIVE",
];

/// One statement of a SQL script.
#[derive(Debug, Clone)]
pub struct Statement<'a> {
    source: &'a str,
    /// Tokens of the statement, excluding the terminating semicolon.
    pub tokens: Vec<Token>,
}

impl<'a> Statement<'a> {
    /// Returns the span from the first to the last token.
    #[must_use]
    pub fn span(&self) -> Span {
        match (self.tokens.first(), self.tokens.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::default(),
        }
    }

    /// Returns the statement text, without leading comments or the
    /// terminating semicolon.
    #[must_use]
    pub fn text(&self) -> &'a str {
        self.span().slice(self.source)
    }

    /// Recognizes `CREATE [OR REPLACE] [modifiers] <KIND> [IF NOT EXISTS] <name>`.
    ///
    /// The name is the last part of a possibly qualified identifier, upper
    /// cased unless it was quoted.
    #[must_use]
    pub fn created_object(&self) -> Option<(ObjectKind, String)> {
        let src = self.source;
        let mut rest = self.tokens.as_slice();

        let (first, tail) = rest.split_first()?;
        if !first.is_keyword(src, "CREATE") {
            return None;
        }
        rest = tail;

        if rest.len() >= 2 && rest[0].is_keyword(src, "OR") && rest[1].is_keyword(src, "REPLACE")
        {
            rest = &rest[2..];
        }
        while rest
            .first()
            .is_some_and(|t| CREATE_MODIFIERS.iter().any(|m| t.is_keyword(src, m)))
        {
            rest = &rest[1..];
        }

        // Kinds are one or two words long; prefer the two-word reading.
        let kind = match rest {
            [a, b, ..] if a.kind == TokenKind::Word && b.kind == TokenKind::Word => {
                let pair = format!("{} {}", a.text(src), b.text(src));
                if let Some(kind) = ObjectKind::from_keyword(&pair) {
                    rest = &rest[2..];
                    Some(kind)
                } else {
                    None
                }
            }
            _ => None,
        };
        let kind = match kind {
            Some(kind) => kind,
            None => {
                let word = rest.first().filter(|t| t.kind == TokenKind::Word)?;
                let kind = ObjectKind::from_keyword(word.text(src))?;
                rest = &rest[1..];
                kind
            }
        };

        if rest.len() >= 3
            && rest[0].is_keyword(src, "IF")
            && rest[1].is_keyword(src, "NOT")
            && rest[2].is_keyword(src, "EXISTS")
        {
            rest = &rest[3..];
        }

        let mut name = rest.first()?.identifier(src)?;
        let mut idx = 1;
        while rest.get(idx).is_some_and(|t| t.kind == TokenKind::Dot) {
            name = rest.get(idx + 1)?.identifier(src)?;
            idx += 2;
        }
        Some((kind, name))
    }
}

/// Splits a script into non-empty statements.
#[must_use]
pub fn split_statements(source: &str) -> Vec<Statement<'_>> {
    let mut statements = Vec::new();
    let mut current = Vec::new();

    for token in Lexer::new(source) {
        if token.kind == TokenKind::Semicolon {
            if !current.is_empty() {
                statements.push(Statement {
                    source,
                    tokens: std::mem::take(&mut current),
                });
            }
        } else {
            current.push(token);
        }
    }
    if !current.is_empty() {
        statements.push(Statement {
            source,
            tokens: current,
        });
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_strings_and_comments() {
        let script = "-- header; comment\nCREATE TABLE A (x VARCHAR DEFAULT ';');\n\n\
                      create view B as select 1;;\n";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].text(),
            "CREATE TABLE A (x VARCHAR DEFAULT ';')"
        );
        assert_eq!(statements[1].text(), "create view B as select 1");
    }

    #[test]
    fn test_created_object_forms() {
        let cases = [
            ("create or replace TABLE ORDERS (id int)", ObjectKind::Table, "ORDERS"),
            ("CREATE SECURE VIEW db.s.v_orders AS SELECT 1", ObjectKind::View, "V_ORDERS"),
            (
                "create or replace materialized view MV as select 1",
                ObjectKind::MaterializedView,
                "MV",
            ),
            (
                "CREATE TRANSIENT DYNAMIC TABLE IF NOT EXISTS DT target_lag = '1 hour'",
                ObjectKind::DynamicTable,
                "DT",
            ),
            ("create file format \"Csv Fmt\" type = csv", ObjectKind::FileFormat, "Csv Fmt"),
            ("create task T1 as $$ select 1; $$", ObjectKind::Task, "T1"),
        ];
        for (sql, kind, name) in cases {
            let statements = split_statements(sql);
            assert_eq!(statements.len(), 1, "{sql}");
            assert_eq!(
                statements[0].created_object(),
                Some((kind, name.to_string())),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_created_object_rejects_other_statements() {
        for sql in [
            "ALTER TABLE T ADD COLUMN X INT",
            "CREATE MASKING POLICY P AS (v string) returns string -> v",
            "GRANT USAGE ON SCHEMA S TO ROLE R",
            "CREATE TABLE",
        ] {
            let statements = split_statements(sql);
            assert_eq!(statements[0].created_object(), None, "{sql}");
        }
    }
}
