//! Text rewrites turning named parameters and embeds into plain SQL
//!
//! Rewrites are edits against the original statement text; the AST is never
//! serialized back to SQL.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::params::{EmbedCall, PlaceholderKind, ScannedParams};
use crate::parser::{ParseError, SqlEngine};
use crate::source::{mutate, Edit, EditError};

/// A named parameter after numbering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedParam {
    pub name: String,
    pub number: usize,
    pub nullable: bool,
}

/// Name to number mapping of the named parameters of one statement
///
/// Only populated for `$N` style engines; `?` style numbers are assigned by
/// position once the references are known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedParams {
    by_number: BTreeMap<usize, NamedParam>,

    /// Positional parameters wrapped in `sqlbind.narg`
    nullable_positional: BTreeSet<usize>,
}

impl NamedParams {
    pub fn get(&self, number: usize) -> Option<&NamedParam> {
        self.by_number.get(&number)
    }

    pub fn number_of(&self, name: &str) -> Option<usize> {
        self.by_number.values().find(|p| p.name == name).map(|p| p.number)
    }

    /// True when any occurrence of the parameter was declared with `narg`
    pub fn is_nullable(&self, number: usize) -> bool {
        self.by_number.get(&number).is_some_and(|p| p.nullable)
            || self.nullable_positional.contains(&number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedParam> {
        self.by_number.values()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewriteError {
    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("edited query syntax is invalid: {0}")]
    Reparse(ParseError),

    #[error("sqlbind.embed() table \"{0}\" is not in the FROM clause")]
    UnknownEmbedTable(String),
}

/// Number the named parameters and produce the edits replacing every named
/// or helper-wrapped reference with the engine's placeholder
///
/// With `dollar`, the first appearance of a name takes the next free number
/// and later appearances reuse it. Otherwise every occurrence becomes `?`
/// and stays unnumbered. Placeholder numbers are updated in place.
pub fn named_parameters(scanned: &mut ScannedParams, dollar: bool) -> (NamedParams, Vec<Edit>) {
    let mut named = NamedParams::default();
    let mut edits = Vec::new();

    let mut next = scanned
        .placeholders
        .iter()
        .filter_map(|p| match p.kind {
            PlaceholderKind::Dollar(n) => Some(n),
            _ => None,
        })
        .max()
        .unwrap_or(0)
        + 1;
    let mut numbers: BTreeMap<String, usize> = BTreeMap::new();

    for placeholder in &mut scanned.placeholders {
        match &placeholder.kind {
            PlaceholderKind::Named(name) => {
                let replacement = if dollar {
                    let number = *numbers.entry(name.clone()).or_insert_with(|| {
                        next += 1;
                        next - 1
                    });
                    placeholder.number = number;

                    let entry = named.by_number.entry(number).or_insert_with(|| NamedParam {
                        name: name.clone(),
                        number,
                        nullable: false,
                    });
                    entry.nullable |= placeholder.nullable;
                    format!("${}", number)
                } else {
                    "?".to_string()
                };
                edits.push(Edit::new(
                    placeholder.span.start,
                    placeholder.span.len(),
                    replacement,
                ));
            }
            _ => {
                if let Some(wrapper) = &placeholder.wrapper {
                    edits.push(Edit::new(wrapper.start, wrapper.len(), placeholder.text.clone()));
                    if placeholder.nullable && placeholder.number > 0 {
                        named.nullable_positional.insert(placeholder.number);
                    }
                }
            }
        }
    }

    (named, edits)
}

/// Quote `name` when it is a reserved keyword or not a plain lower-case identifier
pub fn quote_ident(engine: &dyn SqlEngine, name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain && !engine.is_reserved_keyword(name) {
        return name.to_string();
    }

    let quote = match engine.engine() {
        sqlbind_core::Engine::MySql => '`',
        _ => '"',
    };
    format!("{quote}{}{quote}", name.replace(quote, &format!("{quote}{quote}")))
}

/// Expand `sqlbind.embed(t)` into the qualified column list of `t`
pub fn expand_embed(
    engine: &dyn SqlEngine,
    embed: &EmbedCall,
    qualifier: &str,
    columns: &[&str],
) -> Edit {
    let qualifier = quote_ident(engine, qualifier);
    let list = columns
        .iter()
        .map(|column| format!("{}.{}", qualifier, quote_ident(engine, column)))
        .collect::<Vec<_>>()
        .join(", ");
    Edit::new(embed.span.start, embed.span.len(), list)
}

/// Apply `edits` and make sure the result still parses
pub fn apply_edits(engine: &dyn SqlEngine, raw: &str, edits: &[Edit]) -> Result<String, RewriteError> {
    let edited = mutate(raw, edits)?;
    if edited != raw {
        debug!("Re-parsing statement after {} edit(s)", edits.len());
        engine.parse(&edited).map_err(RewriteError::Reparse)?;
    }
    Ok(edited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::scan_parameters;
    use crate::parser::SqlParser;
    use pretty_assertions::assert_eq;

    fn rewrite(parser: &SqlParser, sql: &str) -> (String, NamedParams, ScannedParams) {
        let mut scanned = scan_parameters(parser.dialect(), parser.engine(), sql).unwrap();
        let dollar = parser.engine().uses_dollar_params();
        let (named, edits) = named_parameters(&mut scanned, dollar);
        let edited = apply_edits(parser, sql, &edits).unwrap();
        (edited, named, scanned)
    }

    #[test]
    fn named_parameters_become_dollar_numbers() {
        let parser = SqlParser::postgres();
        let (sql, named, scanned) = rewrite(
            &parser,
            "SELECT * FROM users WHERE name = sqlbind.arg(name) AND age > @min_age OR name = @name",
        );

        assert_eq!(sql, "SELECT * FROM users WHERE name = $1 AND age > $2 OR name = $1");
        assert_eq!(named.number_of("name"), Some(1));
        assert_eq!(named.number_of("min_age"), Some(2));
        let numbers: Vec<usize> = scanned.placeholders.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 1]);
    }

    #[test]
    fn narg_marks_parameter_nullable() {
        let parser = SqlParser::postgres();
        let (sql, named, _) = rewrite(
            &parser,
            "UPDATE users SET bio = sqlbind.narg(bio) WHERE id = sqlbind.arg(id)",
        );
        assert_eq!(sql, "UPDATE users SET bio = $1 WHERE id = $2");
        assert!(named.is_nullable(1));
        assert!(!named.is_nullable(2));
    }

    #[test]
    fn wrapped_positional_is_unwrapped() {
        let parser = SqlParser::postgres();
        let (sql, named, _) =
            rewrite(&parser, "SELECT * FROM users WHERE bio = sqlbind.narg($1)");
        assert_eq!(sql, "SELECT * FROM users WHERE bio = $1");
        assert!(named.is_nullable(1));
    }

    #[test]
    fn question_style_rewrites_every_occurrence() {
        let parser = SqlParser::mysql();
        let (sql, named, scanned) =
            rewrite(&parser, "SELECT * FROM users WHERE a = @x AND b = sqlbind.arg(x)");
        assert_eq!(sql, "SELECT * FROM users WHERE a = ? AND b = ?");
        assert!(named.is_empty());
        assert!(scanned.placeholders.iter().all(|p| p.number == 0));
    }

    #[test]
    fn untouched_statement_is_returned_as_is() {
        let parser = SqlParser::postgres();
        let (sql, named, _) = rewrite(&parser, "SELECT  id\nFROM users WHERE id = $1");
        assert_eq!(sql, "SELECT  id\nFROM users WHERE id = $1");
        assert!(named.is_empty());
    }

    #[test]
    fn quoting_reserved_and_mixed_case() {
        let parser = SqlParser::postgres();
        assert_eq!(quote_ident(&parser, "name"), "name");
        assert_eq!(quote_ident(&parser, "select"), "\"select\"");
        assert_eq!(quote_ident(&parser, "CamelCase"), "\"CamelCase\"");

        let mysql = SqlParser::mysql();
        assert_eq!(quote_ident(&mysql, "order"), "`order`");
    }

    #[test]
    fn embed_expands_to_column_list() {
        let parser = SqlParser::postgres();
        let sql = "SELECT sqlbind.embed(u) FROM users u";
        let scanned = scan_parameters(parser.dialect(), parser.engine(), sql).unwrap();
        let edit = expand_embed(&parser, &scanned.embeds[0], "u", &["id", "name"]);
        let edited = apply_edits(&parser, sql, &[edit]).unwrap();
        assert_eq!(edited, "SELECT u.id, u.name FROM users u");
    }

    #[test]
    fn broken_edit_fails_reparse() {
        let parser = SqlParser::postgres();
        let sql = "SELECT id FROM users";
        let err = apply_edits(&parser, sql, &[Edit::new(7, 2, "(")]).unwrap_err();
        assert!(matches!(err, RewriteError::Reparse(_)));
    }
}
