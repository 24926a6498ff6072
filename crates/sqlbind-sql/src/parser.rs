//! SQL parsing using datafusion-sqlparser-rs
//!
//! Files are split into statements on the token stream so that every
//! statement keeps its leading comments and its byte location in the file.

use regex::Regex;
use sqlbind_core::Engine;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::keywords::{Keyword, ALL_KEYWORDS, ALL_KEYWORDS_INDEX, RESERVED_FOR_COLUMN_ALIAS, RESERVED_FOR_TABLE_ALIAS};
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::sync::OnceLock;

use crate::metadata::CommentSyntax;
use crate::source::LineIndex;

/// Byte range of one statement within a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementSpan {
    /// Offset of the first non-blank byte, leading comments included
    pub location: usize,

    /// Length up to, not including, the terminating semicolon
    pub len: usize,

    /// Whether a semicolon ended the statement
    pub terminated: bool,
}

/// A parsed statement and where it came from
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    pub statement: Statement,
    pub span: StatementSpan,
}

impl ParsedStatement {
    /// Statement text, leading comments included
    pub fn raw<'s>(&self, source: &'s str) -> &'s str {
        crate::source::pluck(source, self.span.location, self.span.len)
    }
}

/// Parser collaborator used by the compiler passes
pub trait SqlEngine {
    /// Engine this parser speaks
    fn engine(&self) -> Engine;

    /// Grammar used for tokenizing and parsing
    fn dialect(&self) -> &dyn Dialect;

    /// Split a file into statement spans
    fn split(&self, source: &str) -> Result<Vec<StatementSpan>, ParseError>;

    /// Parse the statement inside one span; `None` for comment-only spans
    fn parse_span(&self, source: &str, span: StatementSpan) -> Result<Option<Statement>, ParseError>;

    /// Comment markers accepted by the engine
    fn comment_syntax(&self) -> CommentSyntax;

    /// Whether `name` needs quoting when used as an identifier
    fn is_reserved_keyword(&self, name: &str) -> bool;

    /// Parse a whole file, stopping at the first error
    fn parse(&self, source: &str) -> Result<Vec<ParsedStatement>, ParseError> {
        let mut statements = Vec::new();
        for span in self.split(source)? {
            if let Some(statement) = self.parse_span(source, span)? {
                statements.push(ParsedStatement { statement, span });
            }
        }
        Ok(statements)
    }
}

/// SQL parser for one engine
pub struct SqlParser {
    engine: Engine,
    dialect: Box<dyn Dialect>,
}

impl SqlParser {
    /// Create a SQL parser for PostgreSQL
    pub fn postgres() -> Self {
        Self {
            engine: Engine::PostgreSql,
            dialect: Box::new(PostgreSqlDialect {}),
        }
    }

    /// Create a SQL parser for MySQL
    pub fn mysql() -> Self {
        Self {
            engine: Engine::MySql,
            dialect: Box::new(MySqlDialect {}),
        }
    }

    /// Create a SQL parser for SQLite
    pub fn sqlite() -> Self {
        Self {
            engine: Engine::Sqlite,
            dialect: Box::new(SQLiteDialect {}),
        }
    }

    /// Create a parser from the configured engine
    pub fn from_engine(engine: Engine) -> Self {
        match engine {
            Engine::PostgreSql => Self::postgres(),
            Engine::MySql => Self::mysql(),
            Engine::Sqlite => Self::sqlite(),
        }
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::postgres()
    }
}

impl SqlEngine for SqlParser {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn dialect(&self) -> &dyn Dialect {
        &*self.dialect
    }

    fn split(&self, source: &str) -> Result<Vec<StatementSpan>, ParseError> {
        let tokens = Tokenizer::new(&*self.dialect, source)
            .tokenize_with_location()
            .map_err(|e| ParseError::new(ParserError::TokenizerError(e.to_string()), 0))?;
        let index = LineIndex::new(source);

        let mut spans = Vec::new();
        let mut start: Option<usize> = None;
        let mut has_code = false;

        for token in &tokens {
            match &token.token {
                Token::SemiColon => {
                    let end = index.offset(token.span.start.line, token.span.start.column);
                    if let Some(location) = start.take() {
                        if has_code {
                            spans.push(StatementSpan {
                                location,
                                len: end - location,
                                terminated: true,
                            });
                        }
                    }
                    has_code = false;
                }
                Token::EOF => {}
                Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab) => {}
                Token::Whitespace(_) => {
                    start.get_or_insert_with(|| {
                        index.offset(token.span.start.line, token.span.start.column)
                    });
                }
                _ => {
                    start.get_or_insert_with(|| {
                        index.offset(token.span.start.line, token.span.start.column)
                    });
                    has_code = true;
                }
            }
        }

        if let (Some(location), true) = (start, has_code) {
            let len = source[location..].trim_end().len();
            spans.push(StatementSpan {
                location,
                len,
                terminated: false,
            });
        }

        Ok(spans)
    }

    fn parse_span(&self, source: &str, span: StatementSpan) -> Result<Option<Statement>, ParseError> {
        let text = crate::source::pluck(source, span.location, span.len);
        match Parser::parse_sql(&*self.dialect, text) {
            Ok(statements) => Ok(statements.into_iter().next()),
            Err(error) => {
                let location = span.location + error_offset(text, &error);
                Err(ParseError::new(error, location))
            }
        }
    }

    fn comment_syntax(&self) -> CommentSyntax {
        match self.engine {
            Engine::PostgreSql | Engine::Sqlite => CommentSyntax {
                dash: true,
                hash: false,
                slash_star: true,
            },
            Engine::MySql => CommentSyntax {
                dash: true,
                hash: true,
                slash_star: true,
            },
        }
    }

    fn is_reserved_keyword(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        let keyword = ALL_KEYWORDS
            .binary_search(&upper.as_str())
            .map_or(Keyword::NoKeyword, |i| ALL_KEYWORDS_INDEX[i]);

        keyword != Keyword::NoKeyword
            && (RESERVED_FOR_COLUMN_ALIAS.contains(&keyword)
                || RESERVED_FOR_TABLE_ALIAS.contains(&keyword))
    }
}

/// Offset within `text` that a parser error message points at
fn error_offset(text: &str, error: &ParserError) -> usize {
    static POSITION: OnceLock<Regex> = OnceLock::new();
    let pattern = POSITION.get_or_init(|| {
        Regex::new(r"Line: (\d+), Column: (\d+)").expect("valid position pattern")
    });

    let message = error.to_string();
    pattern
        .captures(&message)
        .and_then(|caps| {
            let line = caps[1].parse().ok()?;
            let column = caps[2].parse().ok()?;
            Some(LineIndex::new(text).offset(line, column))
        })
        .unwrap_or(0)
}

/// SQL parsing error with the byte offset it occurred at
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Parser error from sqlparser
    pub error: ParserError,

    /// Byte offset into the parsed file
    pub location: usize,
}

impl ParseError {
    pub fn new(error: ParserError, location: usize) -> Self {
        Self { error, location }
    }

    /// Check if this is an unsupported syntax error
    pub fn is_unsupported_syntax(&self) -> bool {
        let error_msg = self.error.to_string().to_lowercase();
        error_msg.contains("expected") || error_msg.contains("unexpected")
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQL parse error: {}", self.error)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_leading_comments() {
        let parser = SqlParser::postgres();
        let src = "-- name: A :one\nSELECT 1;\n\n-- name: B :many\nSELECT 2;\n";
        let spans = parser.split(src).unwrap();

        assert_eq!(spans.len(), 2);
        assert_eq!(crate::source::pluck(src, spans[0].location, spans[0].len), "-- name: A :one\nSELECT 1");
        assert_eq!(crate::source::pluck(src, spans[1].location, spans[1].len), "-- name: B :many\nSELECT 2");
        assert!(spans.iter().all(|s| s.terminated));
    }

    #[test]
    fn split_ignores_semicolons_in_strings_and_comments() {
        let parser = SqlParser::postgres();
        let src = "SELECT ';' AS a; -- trailing; comment\n";
        let spans = parser.split(src).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].len, "SELECT ';' AS a".len());
    }

    #[test]
    fn split_reports_unterminated_tail() {
        let parser = SqlParser::postgres();
        let src = "SELECT 1;\nSELECT 2\n";
        let spans = parser.split(src).unwrap();
        assert_eq!(spans.len(), 2);
        assert!(!spans[1].terminated);
        assert_eq!(crate::source::pluck(src, spans[1].location, spans[1].len), "SELECT 2");
    }

    #[test]
    fn comment_only_tail_is_not_a_statement() {
        let parser = SqlParser::postgres();
        let spans = parser.split("SELECT 1;\n-- done\n").unwrap();
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn parse_statements() {
        let parser = SqlParser::postgres();
        let src = "CREATE TABLE t (id int);\nSELECT id FROM t WHERE id = $1;";
        let statements = parser.parse(src).unwrap();
        assert_eq!(statements.len(), 2);
        assert!(matches!(statements[1].statement, Statement::Query(_)));
        assert_eq!(statements[1].raw(src), "SELECT id FROM t WHERE id = $1");
    }

    #[test]
    fn parse_error_points_into_file() {
        let parser = SqlParser::postgres();
        let src = "SELECT 1;\nSELECT * FROM WHERE;";
        let err = parser.parse(src).unwrap_err();
        assert!(err.location >= src.find("SELECT *").unwrap());
        assert!(err.to_string().starts_with("SQL parse error:"));
    }

    #[test]
    fn comment_syntax_per_engine() {
        assert!(SqlParser::mysql().comment_syntax().hash);
        assert!(!SqlParser::postgres().comment_syntax().hash);
        assert!(SqlParser::sqlite().comment_syntax().dash);
    }

    #[test]
    fn reserved_keywords() {
        let parser = SqlParser::postgres();
        assert!(parser.is_reserved_keyword("select"));
        assert!(parser.is_reserved_keyword("FROM"));
        assert!(!parser.is_reserved_keyword("author_id"));
    }
}
