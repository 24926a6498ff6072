//! Schema catalog built from DDL
//!
//! The catalog is the single mutable piece of a compilation run: schema
//! files are applied to it statement by statement, after which it is only
//! read while queries are resolved.

pub mod catalog;
pub mod error;
pub mod migrations;
pub mod types;

pub use catalog::{ident_name, statement_kind, Catalog, Schema};
pub use error::CatalogError;
pub use migrations::remove_rollback_statements;
pub use types::{column_type, named_type, ColumnType};
