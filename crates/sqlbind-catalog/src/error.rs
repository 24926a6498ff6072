//! Catalog errors

use sqlbind_core::TableIdentifier;

/// Errors raised while applying DDL to the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("schema \"{0}\" already exists")]
    SchemaExists(String),

    #[error("schema \"{0}\" does not exist")]
    SchemaNotFound(String),

    #[error("relation \"{}\" already exists", .0.name)]
    TableExists(TableIdentifier),

    #[error("relation \"{}\" does not exist", .0.name)]
    TableNotFound(TableIdentifier),

    #[error("column \"{column}\" of relation \"{}\" already exists", .table.name)]
    ColumnExists { table: TableIdentifier, column: String },

    #[error("column \"{column}\" of relation \"{}\" does not exist", .table.name)]
    ColumnNotFound { table: TableIdentifier, column: String },

    #[error("type \"{0}\" already exists")]
    TypeExists(String),

    #[error("type \"{0}\" does not exist")]
    TypeNotFound(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("unsupported DDL: {0}")]
    Unsupported(String),
}
