//! Statement validation
//!
//! Checks that run before parameter resolution: placeholder style, INSERT
//! arity, command/statement compatibility and the select-only options.

use sqlbind_core::Engine;
use sqlparser::ast::{Expr, Insert, SetExpr, Statement, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::metadata::Cmd;
use crate::params::{helper_name, unnest, PlaceholderKind, ScannedParams};

pub const OPTION_CACHE: &str = "cache";
pub const OPTION_TIMEOUT: &str = "timeout";
pub const OPTION_INVALIDATE: &str = "invalidate";
pub const OPTION_COUNT_INTENT: &str = "count_intent";
pub const OPTION_ALLOW_REPLICA: &str = "allow_replica";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("can not mix $1 format with ? format")]
    MixedPlaceholders,

    #[error("query mixes positional parameters ($1) and named parameters (sqlbind.arg or @arg)")]
    MixedNamedAndPositional,

    #[error("unsupported parameter placeholder {placeholder} for {engine}")]
    UnsupportedPlaceholder { placeholder: String, engine: Engine },

    #[error("could not determine data type of parameter ${0}")]
    ParameterGap(usize),

    #[error("INSERT has more expressions than target columns")]
    TooManyValues,

    #[error("INSERT has more target columns than expressions")]
    TooFewValues,

    #[error("query {name:?} specifies parameter \"{cmd}\" without containing a RETURNING clause")]
    NotRowReturning { name: String, cmd: Cmd },

    #[error(":copyfrom requires an INSERT INTO statement")]
    CopyFromNotInsert,

    #[error(":copyfrom is not compatible with ON CONFLICT")]
    CopyFromOnConflict,

    #[error(":copyfrom doesn't support multi-row inserts")]
    CopyFromMultiRow,

    #[error(":copyfrom doesn't support non-parameter values")]
    CopyFromNonParameter,

    #[error(":batch* commands require parameters")]
    BatchWithoutParameters,

    #[error("query {name:?} has invalid {key} value: {value}")]
    InvalidBoolOption { name: String, key: String, value: String },

    #[error("query {name:?} uses {key} option but is not a SELECT")]
    SelectOnlyOption { name: String, key: String },

    #[error("query {name:?} uses invalidate option but is a SELECT")]
    InvalidateOnSelect { name: String },
}

/// Placeholder style must be consistent and supported by the engine
///
/// `$N` numbers may not leave gaps: referencing `$3` requires `$1` and `$2`.
pub fn param_style(scanned: &ScannedParams, engine: Engine) -> Result<(), ValidationError> {
    if let Some(other) = scanned.placeholders.iter().find_map(|p| match &p.kind {
        PlaceholderKind::Other(text) => Some(text.clone()),
        _ => None,
    }) {
        return Err(ValidationError::UnsupportedPlaceholder {
            placeholder: other,
            engine,
        });
    }

    let dollar = scanned.has_dollar();
    let question = scanned.has_question();
    if dollar && question {
        return Err(ValidationError::MixedPlaceholders);
    }
    if dollar != engine.uses_dollar_params() && (dollar || question) {
        let placeholder = if dollar { "$N" } else { "?" };
        return Err(ValidationError::UnsupportedPlaceholder {
            placeholder: placeholder.to_string(),
            engine,
        });
    }
    if scanned.has_named() && (dollar || question) {
        return Err(ValidationError::MixedNamedAndPositional);
    }

    let numbers: BTreeSet<usize> = scanned
        .placeholders
        .iter()
        .filter_map(|p| match p.kind {
            PlaceholderKind::Dollar(n) => Some(n),
            _ => None,
        })
        .collect();
    if let Some(&max) = numbers.iter().next_back() {
        if let Some(missing) = (1..=max).find(|n| !numbers.contains(n)) {
            return Err(ValidationError::ParameterGap(missing));
        }
    }

    Ok(())
}

/// VALUES rows of a plain `INSERT ... VALUES`
pub fn insert_values(insert: &Insert) -> Option<&[Vec<Expr>]> {
    let source = insert.source.as_ref()?;
    match source.body.as_ref() {
        SetExpr::Values(values) => Some(&values.rows),
        _ => None,
    }
}

/// Explicit INSERT column lists must match every VALUES row
pub fn insert_stmt(insert: &Insert) -> Result<(), ValidationError> {
    if insert.columns.is_empty() {
        return Ok(());
    }
    for row in insert_values(insert).unwrap_or_default() {
        if row.len() > insert.columns.len() {
            return Err(ValidationError::TooManyValues);
        }
        if row.len() < insert.columns.len() {
            return Err(ValidationError::TooFewValues);
        }
    }
    Ok(())
}

/// The command must fit the statement's shape
pub fn cmd(
    statement: &Statement,
    name: &str,
    cmd: Cmd,
    scanned: &ScannedParams,
) -> Result<(), ValidationError> {
    if cmd == Cmd::CopyFrom {
        return copy_from(statement);
    }
    if cmd.is_batch() && scanned.placeholders.is_empty() {
        return Err(ValidationError::BatchWithoutParameters);
    }
    if !matches!(cmd, Cmd::One | Cmd::Many | Cmd::BatchOne | Cmd::BatchMany) {
        return Ok(());
    }

    let returning = match statement {
        Statement::Query(_) => return Ok(()),
        Statement::Insert(insert) => insert.returning.as_ref(),
        Statement::Update { returning, .. } => returning.as_ref(),
        Statement::Delete(delete) => delete.returning.as_ref(),
        _ => return Ok(()),
    };
    if returning.map_or(true, Vec::is_empty) {
        return Err(ValidationError::NotRowReturning {
            name: name.to_string(),
            cmd,
        });
    }
    Ok(())
}

fn copy_from(statement: &Statement) -> Result<(), ValidationError> {
    let Statement::Insert(insert) = statement else {
        return Err(ValidationError::CopyFromNotInsert);
    };
    if insert.on.is_some() {
        return Err(ValidationError::CopyFromOnConflict);
    }
    let rows = insert_values(insert).ok_or(ValidationError::CopyFromNotInsert)?;
    if rows.len() != 1 {
        return Err(ValidationError::CopyFromMultiRow);
    }
    let all_params = rows[0].iter().all(|value| match unnest(value) {
        Expr::Value(Value::Placeholder(_)) => true,
        Expr::Function(func) => matches!(helper_name(func).as_deref(), Some("arg" | "narg")),
        Expr::UnaryOp { .. } | Expr::Identifier(_) => value_is_named(value),
        _ => false,
    });
    if !all_params {
        return Err(ValidationError::CopyFromNonParameter);
    }
    Ok(())
}

fn value_is_named(value: &Expr) -> bool {
    match unnest(value) {
        Expr::UnaryOp { op: sqlparser::ast::UnaryOperator::PGAbs, expr } => {
            matches!(expr.as_ref(), Expr::Identifier(_))
        }
        Expr::Identifier(id) => id.quote_style.is_none() && id.value.starts_with('@'),
        _ => false,
    }
}

/// Default the select-only boolean options and reject illegal combinations
///
/// `count_intent` and `allow_replica` default to `true` on SELECT and
/// `false` elsewhere; `invalidate` is only allowed on statements that write.
pub fn default_options(
    statement: &Statement,
    name: &str,
    options: &mut BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    let is_select = matches!(statement, Statement::Query(_));

    for key in [OPTION_COUNT_INTENT, OPTION_ALLOW_REPLICA] {
        match options.get(key).map(String::as_str) {
            None => {
                options.insert(key.to_string(), is_select.to_string());
            }
            Some("true") if !is_select => {
                return Err(ValidationError::SelectOnlyOption {
                    name: name.to_string(),
                    key: key.to_string(),
                });
            }
            Some("true" | "false") => {}
            Some(value) => {
                return Err(ValidationError::InvalidBoolOption {
                    name: name.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    if is_select && options.contains_key(OPTION_INVALIDATE) {
        return Err(ValidationError::InvalidateOnSelect {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::scan_parameters;
    use crate::parser::{SqlEngine, SqlParser};

    fn scan(parser: &SqlParser, sql: &str) -> ScannedParams {
        scan_parameters(parser.dialect(), parser.engine(), sql).unwrap()
    }

    fn statement(parser: &SqlParser, sql: &str) -> Statement {
        parser.parse(sql).unwrap().remove(0).statement
    }

    #[test]
    fn consistent_styles_pass() {
        let pg = SqlParser::postgres();
        assert!(param_style(&scan(&pg, "SELECT 1 WHERE $1 = $2"), Engine::PostgreSql).is_ok());
        assert!(param_style(&scan(&pg, "SELECT 1 WHERE @a = @b"), Engine::PostgreSql).is_ok());

        let mysql = SqlParser::mysql();
        assert!(param_style(&scan(&mysql, "SELECT 1 FROM t WHERE a = ? AND b = ?"), Engine::MySql).is_ok());
    }

    #[test]
    fn mixed_named_and_positional_is_rejected() {
        let pg = SqlParser::postgres();
        let err = param_style(&scan(&pg, "SELECT 1 WHERE a = $1 AND b = @b"), Engine::PostgreSql)
            .unwrap_err();
        assert_eq!(err, ValidationError::MixedNamedAndPositional);
    }

    #[test]
    fn mixed_dollar_and_question_is_rejected() {
        let sqlite = SqlParser::sqlite();
        let err = param_style(&scan(&sqlite, "SELECT 1 WHERE a = $1 AND b = ?"), Engine::Sqlite)
            .unwrap_err();
        assert_eq!(err, ValidationError::MixedPlaceholders);
        assert_eq!(err.to_string(), "can not mix $1 format with ? format");
    }

    #[test]
    fn gaps_in_numbering_are_rejected() {
        let pg = SqlParser::postgres();
        let err = param_style(&scan(&pg, "SELECT 1 WHERE a = $1 AND b = $3"), Engine::PostgreSql)
            .unwrap_err();
        assert_eq!(err, ValidationError::ParameterGap(2));
        assert_eq!(err.to_string(), "could not determine data type of parameter $2");
    }

    #[test]
    fn question_marks_on_postgres_style_engine_are_rejected() {
        let sqlite = SqlParser::sqlite();
        let err = param_style(&scan(&sqlite, "SELECT 1 WHERE a = $1"), Engine::Sqlite).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedPlaceholder { .. }));
    }

    #[test]
    fn insert_arity() {
        let pg = SqlParser::postgres();
        let Statement::Insert(ok) = statement(&pg, "INSERT INTO t (a, b) VALUES ($1, $2)") else {
            panic!("expected insert");
        };
        assert!(insert_stmt(&ok).is_ok());

        let Statement::Insert(more) = statement(&pg, "INSERT INTO t (a) VALUES ($1, $2)") else {
            panic!("expected insert");
        };
        assert_eq!(insert_stmt(&more).unwrap_err(), ValidationError::TooManyValues);

        let Statement::Insert(fewer) = statement(&pg, "INSERT INTO t (a, b) VALUES ($1)") else {
            panic!("expected insert");
        };
        assert_eq!(insert_stmt(&fewer).unwrap_err(), ValidationError::TooFewValues);
    }

    #[test]
    fn row_commands_need_rows() {
        let pg = SqlParser::postgres();
        let sql = "DELETE FROM t WHERE id = $1";
        let stmt = statement(&pg, sql);
        let scanned = scan(&pg, sql);
        assert!(cmd(&stmt, "DeleteT", Cmd::Exec, &scanned).is_ok());
        assert!(matches!(
            cmd(&stmt, "DeleteT", Cmd::One, &scanned),
            Err(ValidationError::NotRowReturning { .. })
        ));

        let sql = "DELETE FROM t WHERE id = $1 RETURNING id";
        assert!(cmd(&statement(&pg, sql), "DeleteT", Cmd::One, &scan(&pg, sql)).is_ok());
    }

    #[test]
    fn copy_from_shape() {
        let pg = SqlParser::postgres();
        let check = |sql: &str| cmd(&statement(&pg, sql), "Copy", Cmd::CopyFrom, &scan(&pg, sql));

        assert!(check("INSERT INTO t (a, b) VALUES ($1, $2)").is_ok());
        assert_eq!(check("SELECT 1").unwrap_err(), ValidationError::CopyFromNotInsert);
        assert_eq!(
            check("INSERT INTO t (a) VALUES ($1), ($2)").unwrap_err(),
            ValidationError::CopyFromMultiRow
        );
        assert_eq!(
            check("INSERT INTO t (a, b) VALUES ($1, 'x')").unwrap_err(),
            ValidationError::CopyFromNonParameter
        );
    }

    #[test]
    fn batch_needs_parameters() {
        let pg = SqlParser::postgres();
        let sql = "DELETE FROM t";
        assert_eq!(
            cmd(&statement(&pg, sql), "Batch", Cmd::BatchExec, &scan(&pg, sql)).unwrap_err(),
            ValidationError::BatchWithoutParameters
        );
    }

    #[test]
    fn select_options_default_to_true() {
        let pg = SqlParser::postgres();
        let mut options = BTreeMap::new();
        default_options(&statement(&pg, "SELECT 1"), "Q", &mut options).unwrap();
        assert_eq!(options[OPTION_COUNT_INTENT], "true");
        assert_eq!(options[OPTION_ALLOW_REPLICA], "true");

        let mut options = BTreeMap::new();
        default_options(&statement(&pg, "DELETE FROM t"), "Q", &mut options).unwrap();
        assert_eq!(options[OPTION_COUNT_INTENT], "false");
        assert_eq!(options[OPTION_ALLOW_REPLICA], "false");
    }

    #[test]
    fn illegal_options_are_rejected() {
        let pg = SqlParser::postgres();
        let select = statement(&pg, "SELECT 1");
        let delete = statement(&pg, "DELETE FROM t");

        let mut options = BTreeMap::from([(OPTION_INVALIDATE.to_string(), "[A]".to_string())]);
        assert!(matches!(
            default_options(&select, "Q", &mut options),
            Err(ValidationError::InvalidateOnSelect { .. })
        ));

        let mut options = BTreeMap::from([(OPTION_COUNT_INTENT.to_string(), "true".to_string())]);
        assert!(matches!(
            default_options(&delete, "Q", &mut options),
            Err(ValidationError::SelectOnlyOption { .. })
        ));

        let mut options = BTreeMap::from([(OPTION_ALLOW_REPLICA.to_string(), "yes".to_string())]);
        let err = default_options(&select, "Q", &mut options).unwrap_err();
        assert_eq!(err.to_string(), "query \"Q\" has invalid allow_replica value: yes");

        let mut options = BTreeMap::from([(OPTION_INVALIDATE.to_string(), "[A]".to_string())]);
        assert!(default_options(&delete, "Q", &mut options).is_ok());
    }
}
