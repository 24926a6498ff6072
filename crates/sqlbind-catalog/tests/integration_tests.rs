//! Integration tests for applying schema files to the catalog

use pretty_assertions::assert_eq;
use sqlbind_catalog::{remove_rollback_statements, Catalog};
use sqlbind_core::{Nullability, TableIdentifier};
use sqlbind_sql::{SqlEngine, SqlParser};

const MIGRATION: &str = "\
-- +goose Up
CREATE TABLE authors (
    id   BIGSERIAL PRIMARY KEY,
    name text      NOT NULL,
    bio  text
);
ALTER TABLE authors ADD COLUMN created_at timestamptz NOT NULL;

-- +goose Down
DROP TABLE authors;
";

#[test]
fn migration_up_half_builds_table() {
    let parser = SqlParser::postgres();
    let contents = remove_rollback_statements(MIGRATION);
    let statements = parser.parse(&contents).unwrap();

    let mut catalog = Catalog::new("public");
    for (i, parsed) in statements.iter().enumerate() {
        catalog.apply_statement(&parsed.statement, i == 0).unwrap();
    }

    let authors = TableIdentifier::new("public", "authors");
    let table = catalog.get_table(&authors).unwrap();
    assert_eq!(table.column_names(), vec!["id", "name", "bio", "created_at"]);
    assert_eq!(table.columns[3].data_type, "timestamptz");
    assert_eq!(table.columns[2].nullable, Nullability::Yes);
    assert_eq!(catalog.main_table, Some(authors));
}

#[test]
fn mysql_schema() {
    let parser = SqlParser::mysql();
    let statements = parser
        .parse("CREATE TABLE `Orders` (id INT NOT NULL AUTO_INCREMENT PRIMARY KEY, total DECIMAL(10, 2), note VARCHAR(64) COMMENT 'free text');")
        .unwrap();

    let mut catalog = Catalog::new("public");
    catalog.apply_statement(&statements[0].statement, true).unwrap();

    let table = catalog.get_table(&TableIdentifier::new("public", "Orders")).unwrap();
    assert_eq!(table.column_names(), vec!["id", "total", "note"]);
    assert_eq!(table.columns[1].data_type, "numeric");
    assert_eq!(table.columns[2].comment.as_deref(), Some("free text"));
}

#[test]
fn catalog_serializes_to_json() {
    let parser = SqlParser::sqlite();
    let statements = parser.parse("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL);").unwrap();

    let mut catalog = Catalog::new("main");
    catalog.apply_statement(&statements[0].statement, false).unwrap();

    let json = serde_json::to_value(&catalog).unwrap();
    assert_eq!(json["default_schema"], "main");
    assert_eq!(json["schemas"][0]["tables"][0]["id"]["name"], "notes");
}
