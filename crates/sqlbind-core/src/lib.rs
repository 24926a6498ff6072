//! sqlbind core
//!
//! Shared domain model for the sqlbind compiler front-end.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod schema;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, FileError, Location, MultiError, Severity};
pub use schema::{Column, EnumType, LogicalType, Nullability, Table, TableIdentifier};
pub use report::{PackageOutcome, Report, ReportSummary, REPORT_FORMAT};
pub use config::{Config, ConfigError, Engine, SqlPackage};
