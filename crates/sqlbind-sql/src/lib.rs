//! SQL parsing and statement analysis
//!
//! This crate handles:
//! - Parsing SQL using datafusion-sqlparser-rs and splitting files into statements
//! - Query metadata comments (`-- name: GetAuthor :one`, options, flags)
//! - Finding parameter references and scoring their context
//! - Rewriting named parameters and embeds into positional SQL
//! - Validating parameter style, commands and options

pub mod metadata;
pub mod params;
pub mod parser;
pub mod rewrite;
pub mod source;
pub mod validate;

pub use metadata::{parse_query_flags, parse_query_name_and_type, Cmd, CommentSyntax, MetadataError, QueryMetadata};
pub use params::{
    find_parameters, is_parameter, scan_parameters, unique_param_refs, ContextKind, EmbedCall, ParamError,
    ParamRef, ParamSet, Parent, Placeholder, PlaceholderKind, ScannedParams, Scope, ScopeId,
};
pub use parser::{ParseError, ParsedStatement, SqlEngine, SqlParser, StatementSpan};
pub use rewrite::{NamedParam, NamedParams, RewriteError};
pub use source::{Edit, EditError, LineIndex};
pub use validate::ValidationError;
