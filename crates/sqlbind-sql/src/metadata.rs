//! Query metadata comments
//!
//! Every query carries a `name:` line giving its name and command, e.g.
//! `-- name: GetAuthor :one`. Lines of the form `-- -- key: value` attach
//! options, and comment lines starting with `@` set flags.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Comment markers the engine accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSyntax {
    /// `-- comment`
    pub dash: bool,

    /// `# comment`
    pub hash: bool,

    /// `/* comment */`
    pub slash_star: bool,
}

/// Query command, deciding the shape of the generated method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cmd {
    #[serde(rename = ":exec")]
    Exec,
    #[serde(rename = ":execresult")]
    ExecResult,
    #[serde(rename = ":execrows")]
    ExecRows,
    #[serde(rename = ":execlastid")]
    ExecLastId,
    #[serde(rename = ":many")]
    Many,
    #[serde(rename = ":one")]
    One,
    #[serde(rename = ":copyfrom")]
    CopyFrom,
    #[serde(rename = ":batchexec")]
    BatchExec,
    #[serde(rename = ":batchmany")]
    BatchMany,
    #[serde(rename = ":batchone")]
    BatchOne,
}

impl Cmd {
    pub const ALL: [Cmd; 10] = [
        Cmd::One,
        Cmd::Many,
        Cmd::Exec,
        Cmd::ExecRows,
        Cmd::ExecLastId,
        Cmd::ExecResult,
        Cmd::CopyFrom,
        Cmd::BatchExec,
        Cmd::BatchMany,
        Cmd::BatchOne,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exec => ":exec",
            Self::ExecResult => ":execresult",
            Self::ExecRows => ":execrows",
            Self::ExecLastId => ":execlastid",
            Self::Many => ":many",
            Self::One => ":one",
            Self::CopyFrom => ":copyfrom",
            Self::BatchExec => ":batchexec",
            Self::BatchMany => ":batchmany",
            Self::BatchOne => ":batchone",
        }
    }

    /// Commands whose result is a row set
    pub fn returns_rows(&self) -> bool {
        matches!(self, Self::One | Self::Many | Self::BatchOne | Self::BatchMany)
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::BatchExec | Self::BatchMany | Self::BatchOne)
    }
}

impl std::fmt::Display for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Cmd {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == s)
            .ok_or_else(|| MetadataError::InvalidCommand(s.to_string()))
    }
}

/// Name, command and raw options of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMetadata {
    pub name: String,
    pub cmd: Cmd,
    pub options: BTreeMap<String, String>,
}

/// Malformed metadata comment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("missing query type [':one', ':many', ':exec', ':execrows', ':execlastid', ':execresult', ':copyfrom', ':batchexec', ':batchmany', ':batchone']: {0}")]
    MissingCommand(String),

    #[error("invalid query comment: {0}")]
    InvalidComment(String),

    #[error("invalid query type: {0}")]
    InvalidCommand(String),

    #[error("invalid query name {0:?}")]
    InvalidName(String),

    #[error("invalid query option string: {0}")]
    InvalidOption(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\p{L}_][\p{L}\p{Nd}_]*$").expect("valid name pattern"))
}

/// A query name must start with a letter or underscore, followed by letters,
/// digits or underscores
pub fn validate_query_name(name: &str) -> Result<(), MetadataError> {
    if name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(MetadataError::InvalidName(name.to_string()))
    }
}

/// Split a comment line into its marker and body
fn comment_body(line: &str, syntax: CommentSyntax) -> Option<(&'static str, &str)> {
    if line.starts_with("--") {
        return syntax.dash.then(|| ("--", &line[2..]));
    }
    if line.starts_with("/*") {
        if !syntax.slash_star {
            return None;
        }
        let body = &line[2..];
        let body = body.trim_end().strip_suffix("*/").unwrap_or(body);
        return Some(("/*", body));
    }
    if line.starts_with('#') {
        return syntax.hash.then(|| ("#", &line[1..]));
    }
    None
}

/// Parse the name line and option lines of a statement
///
/// Returns `Ok(None)` for statements without a `name:` line.
pub fn parse_query_name_and_type(
    text: &str,
    syntax: CommentSyntax,
) -> Result<Option<QueryMetadata>, MetadataError> {
    let mut named: Option<(String, Cmd)> = None;
    let mut options = BTreeMap::new();

    for line in text.lines() {
        let Some((prefix, body)) = comment_body(line, syntax) else {
            continue;
        };
        let body = body.trim();

        if body.starts_with("name:") {
            let mut trimmed = line.trim();
            if prefix == "/*" {
                trimmed = trimmed.strip_suffix("*/").unwrap_or(trimmed).trim_end();
            }
            let parts: Vec<&str> = trimmed.split(' ').collect();
            if parts.len() == 2 {
                return Err(MetadataError::MissingCommand(line.to_string()));
            }
            if parts.len() != 4 {
                return Err(MetadataError::InvalidComment(line.to_string()));
            }
            let cmd: Cmd = parts[3].trim().parse()?;
            validate_query_name(parts[2])?;
            named = Some((parts[2].to_string(), cmd));
        } else if let Some(option) = body.strip_prefix("--") {
            let Some((key, value)) = option.split_once(':') else {
                return Err(MetadataError::InvalidOption(line.to_string()));
            };
            options.insert(key.trim().to_string(), value.trim().to_string());
        } else if body.starts_with("name") && body.contains(':') {
            return Err(MetadataError::InvalidMetadata(line.to_string()));
        }
    }

    Ok(named.map(|(name, cmd)| QueryMetadata { name, cmd, options }))
}

/// Collect `@flag` markers from comment bodies
pub fn parse_query_flags(comments: &[String]) -> BTreeMap<String, bool> {
    let mut flags = BTreeMap::new();
    for line in comments {
        let clean = line.strip_prefix("--").unwrap_or(line);
        let clean = clean.strip_prefix("/*").unwrap_or(clean);
        let clean = clean.strip_prefix('#').unwrap_or(clean);
        let clean = clean.strip_suffix("*/").unwrap_or(clean).trim();

        if clean.starts_with('@') {
            let flag = clean.split(' ').next().unwrap_or(clean);
            flags.insert(flag.to_string(), true);
        }
    }
    flags
}
