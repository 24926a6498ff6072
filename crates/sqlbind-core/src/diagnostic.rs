//! Diagnostic codes and error aggregation
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// The parser rejected a statement
    SqlParseError,

    /// Malformed `name:` line or query option comment
    MetadataError,

    /// A schema statement could not be applied to the catalog
    CatalogError,

    /// A query statement failed a structural check
    ValidationError,

    /// Rewritten query text no longer parses
    RewriteInternalError,

    /// Two queries share a name
    DuplicateQueryName,

    /// A table or column reference could not be resolved
    ResolutionError,

    /// A query option value is invalid
    OptionError,

    /// A schema or query file could not be read
    IoError,

    /// The query paths contained no named queries
    NoQueries,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::MetadataError => "METADATA_ERROR",
            Self::CatalogError => "CATALOG_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::RewriteInternalError => "REWRITE_INTERNAL_ERROR",
            Self::DuplicateQueryName => "DUPLICATE_QUERY_NAME",
            Self::ResolutionError => "RESOLUTION_ERROR",
            Self::OptionError => "OPTION_ERROR",
            Self::IoError => "IO_ERROR",
            Self::NoQueries => "NO_QUERIES",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue that should fail CI
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Source location in a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path as given on the command line or in the config
    pub file: String,

    /// Optional line number (1-indexed)
    pub line: Option<usize>,

    /// Optional column number (1-indexed)
    pub column: Option<usize>,

    /// Optional byte offset into the file
    pub offset: Option<usize>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
            offset: None,
        }
    }

    /// Create a location with file, line, and column
    pub fn with_position(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
            column: Some(column),
            offset: None,
        }
    }

    /// Set the byte offset
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Source line the diagnostic points at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set the source snippet
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// A single failure tied to a position in a schema or query file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    /// File the error was found in
    pub filename: String,

    /// 1-indexed line of `offset`
    pub line: usize,

    /// 1-indexed column (in characters) of `offset`
    pub column: usize,

    /// Byte offset into the file
    pub offset: usize,

    /// The source line containing `offset`
    pub snippet: String,

    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Rendered error message
    pub message: String,
}

impl FileError {
    /// Build an error at `offset` within `source`, computing line, column and snippet
    pub fn new(
        filename: impl Into<String>,
        source: &str,
        offset: usize,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) -> Self {
        let offset = clamp_to_char_boundary(source, offset);
        let line_start = source[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = source[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(source.len());
        let line = source[..offset].matches('\n').count() + 1;
        let column = source[line_start..offset].chars().count() + 1;

        Self {
            filename: filename.into(),
            line,
            column,
            offset,
            snippet: source[line_start..line_end].trim_end_matches('\r').to_string(),
            code,
            message: message.into(),
        }
    }

    /// Convert into a report diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::new(self.code, Severity::Error, self.message.clone())
            .with_location(
                Location::with_position(&self.filename, self.line, self.column)
                    .with_offset(self.offset),
            )
            .with_snippet(self.snippet.clone())
    }
}

impl std::fmt::Display for FileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}: {}", self.filename, self.line, self.column, self.message)
    }
}

fn clamp_to_char_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Accumulates every failure of a compilation pass
///
/// Processing continues after an error so that a single run reports all
/// problems; the aggregate is returned once the pass is finished.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiError {
    errors: Vec<FileError>,
}

impl MultiError {
    /// Create an empty aggregate
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error at `offset` within `source`
    pub fn add(
        &mut self,
        filename: impl Into<String>,
        source: &str,
        offset: usize,
        code: DiagnosticCode,
        message: impl std::fmt::Display,
    ) {
        self.errors
            .push(FileError::new(filename, source, offset, code, message.to_string()));
    }

    /// Record an already located error
    pub fn push(&mut self, error: FileError) {
        self.errors.push(error);
    }

    /// Append every error of another aggregate
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    /// All recorded errors in the order they were found
    pub fn errors(&self) -> &[FileError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(value)` when nothing was recorded, otherwise the aggregate
    pub fn into_result<T>(self, value: T) -> Result<T, MultiError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    /// Convert every entry into a report diagnostic
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().map(FileError::to_diagnostic).collect()
    }
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.errors.len() {
            0 => write!(f, "no errors"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                write!(f, "{} errors:", n)?;
                for error in &self.errors {
                    write!(f, "\n  {}", error)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {}

impl IntoIterator for MultiError {
    type Item = FileError;
    type IntoIter = std::vec::IntoIter<FileError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
