//! Query compilation
//!
//! This crate handles:
//! - Building the catalog from schema files (schema pass)
//! - Compiling named statements into typed query records (query pass)
//! - Name resolution across tables, aliases, CTEs and subqueries
//! - Parameter type binding and output column resolution
//! - Typed query options

pub mod bind;
pub mod compiler;
pub mod error;
pub mod files;
pub mod options;
pub mod output;
pub mod query;
pub mod scope;

pub use compiler::{compile_package, Compiler};
pub use error::{CompileError, QueryError};
pub use files::{sql_files, PathError};
pub use options::{parse_duration, OptionError, QueryOptions};
pub use output::Resolver;
pub use query::{CompileResult, Parameter, Query};
pub use scope::{Env, Relation, ResolveError};
