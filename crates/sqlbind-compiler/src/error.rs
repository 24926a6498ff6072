//! Compiler error types

use sqlbind_catalog::CatalogError;
use sqlbind_core::{Diagnostic, DiagnosticCode, Location, MultiError, Severity};
use sqlbind_sql::{MetadataError, ParamError, ParseError, RewriteError, ValidationError};

use crate::files::PathError;
use crate::options::OptionError;
use crate::scope::ResolveError;

/// Failure compiling one statement
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Option(#[from] OptionError),

    #[error("missing semicolon at end of file")]
    MissingSemicolon,
}

impl QueryError {
    /// Diagnostic code this error is reported under
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Parse(_) | Self::Param(_) | Self::MissingSemicolon => DiagnosticCode::SqlParseError,
            Self::Metadata(_) => DiagnosticCode::MetadataError,
            Self::Validation(_) => DiagnosticCode::ValidationError,
            Self::Rewrite(RewriteError::UnknownEmbedTable(_)) => DiagnosticCode::ResolutionError,
            Self::Rewrite(_) => DiagnosticCode::RewriteInternalError,
            Self::Resolve(_) | Self::Catalog(_) => DiagnosticCode::ResolutionError,
            Self::Option(_) => DiagnosticCode::OptionError,
        }
    }

    /// File offset carried by the error itself, if any
    pub fn location(&self) -> Option<usize> {
        match self {
            Self::Parse(e) if e.location != 0 => Some(e.location),
            _ => None,
        }
    }
}

/// Failure of a compilation run
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Multi(#[from] MultiError),

    #[error("no queries contained in paths {0}")]
    NoQueries(String),
}

impl CompileError {
    /// Report diagnostics for this failure
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Multi(errors) => errors.to_diagnostics(),
            Self::Path(PathError::Missing(path)) | Self::Path(PathError::Walk { path, .. }) => {
                vec![Diagnostic::new(DiagnosticCode::IoError, Severity::Error, self.to_string())
                    .with_location(Location::new(path.display().to_string()))]
            }
            Self::NoQueries(_) => vec![Diagnostic::new(
                DiagnosticCode::NoQueries,
                Severity::Error,
                self.to_string(),
            )],
        }
    }
}
