//! Integration tests for statement analysis

use pretty_assertions::assert_eq;
use sqlbind_sql::rewrite::{apply_edits, named_parameters};
use sqlbind_sql::source::strip_comments;
use sqlbind_sql::{
    find_parameters, parse_query_flags, parse_query_name_and_type, scan_parameters,
    unique_param_refs, validate, Cmd, ContextKind, SqlEngine, SqlParser,
};

const QUERIES: &str = "\
-- name: GetAuthor :one
-- @cached
-- Fetch one author.
SELECT id, name FROM authors WHERE id = @id;

-- name: ListAuthors :many
-- -- cache: 10s
SELECT id, name FROM authors
WHERE name LIKE sqlbind.arg(pattern) OR bio = sqlbind.narg(bio)
ORDER BY name
LIMIT sqlbind.arg(page_size);

-- name: DeleteAuthor :exec
DELETE FROM authors WHERE id = $1;
";

#[test]
fn analyse_query_file() {
    let parser = SqlParser::postgres();
    let statements = parser.parse(QUERIES).unwrap();
    assert_eq!(statements.len(), 3);

    let mut names = Vec::new();
    for parsed in &statements {
        let raw = parsed.raw(QUERIES);
        let meta = parse_query_name_and_type(raw.trim(), parser.comment_syntax())
            .unwrap()
            .unwrap();

        let mut scanned = scan_parameters(parser.dialect(), parser.engine(), raw).unwrap();
        validate::param_style(&scanned, parser.engine()).unwrap();
        validate::cmd(&parsed.statement, &meta.name, meta.cmd, &scanned).unwrap();

        let (named, edits) = named_parameters(&mut scanned, true);
        let edited = apply_edits(&parser, raw, &edits).unwrap();
        let (sql, comments) = strip_comments(&edited, parser.comment_syntax());

        let set = find_parameters(&parsed.statement, &scanned.placeholders).unwrap();
        let params = unique_param_refs(set.refs, true);

        names.push(meta.name.clone());
        match meta.cmd {
            Cmd::One => {
                assert_eq!(sql, "SELECT id, name FROM authors WHERE id = $1");
                assert_eq!(parse_query_flags(&comments).get("@cached"), Some(&true));
                assert_eq!(params.len(), 1);
                assert_eq!(params[0].name.as_deref(), Some("id"));
            }
            Cmd::Many => {
                assert_eq!(meta.options.get("cache").map(String::as_str), Some("10s"));
                assert!(sql.contains("WHERE name LIKE $1 OR bio = $2"));
                assert!(sql.ends_with("LIMIT $3"));
                assert!(named.is_nullable(2));

                let contexts: Vec<ContextKind> =
                    params.iter().map(|p| p.parent.context()).collect();
                assert_eq!(
                    contexts,
                    vec![ContextKind::PatternMatch, ContextKind::Comparison, ContextKind::LimitOffset]
                );
            }
            Cmd::Exec => {
                assert_eq!(sql, "DELETE FROM authors WHERE id = $1");
                assert_eq!(params[0].number, 1);
            }
            other => panic!("unexpected command {}", other),
        }
    }
    assert_eq!(names, vec!["GetAuthor", "ListAuthors", "DeleteAuthor"]);
}

#[test]
fn positional_numbers_follow_source_order() {
    let parser = SqlParser::sqlite();
    let sql = "UPDATE t SET a = ?, b = ? WHERE c = ? AND d IN (?, ?)";
    let statement = parser.parse(sql).unwrap().remove(0).statement;
    let scanned = scan_parameters(parser.dialect(), parser.engine(), sql).unwrap();
    validate::param_style(&scanned, parser.engine()).unwrap();

    let set = find_parameters(&statement, &scanned.placeholders).unwrap();
    let params = unique_param_refs(set.refs, false);

    let numbers: Vec<usize> = params.iter().map(|p| p.number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert!(params.windows(2).all(|w| w[0].location < w[1].location));
    assert_eq!(params[0].parent.context(), ContextKind::Target);
    assert_eq!(params[3].parent.context(), ContextKind::InList);
}

#[test]
fn rewritten_sql_reparses() {
    let parser = SqlParser::mysql();
    let sql = "SELECT * FROM users WHERE email = sqlbind.arg('email') AND org = @org";
    let mut scanned = scan_parameters(parser.dialect(), parser.engine(), sql).unwrap();
    let (_, edits) = named_parameters(&mut scanned, false);
    let edited = apply_edits(&parser, sql, &edits).unwrap();
    assert_eq!(edited, "SELECT * FROM users WHERE email = ? AND org = ?");
    assert!(parser.parse(&edited).is_ok());
}
