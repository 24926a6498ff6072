//! Source text utilities: positions, text edits and comment stripping

use crate::metadata::CommentSyntax;

/// Maps between byte offsets and 1-indexed line/column positions
///
/// Columns count characters, matching the tokenizer's span columns.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { source, line_starts }
    }

    /// Byte offset of a 1-indexed line/column, clamped to the source length
    pub fn offset(&self, line: u64, column: u64) -> usize {
        let line = (line.max(1) - 1) as usize;
        let Some(&start) = self.line_starts.get(line) else {
            return self.source.len();
        };
        let skip = (column.max(1) - 1) as usize;
        self.source[start..]
            .char_indices()
            .nth(skip)
            .map(|(i, _)| start + i)
            .unwrap_or(self.source.len())
    }

    /// 1-indexed line and column of a byte offset
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let start = self.line_starts[line - 1];
        let column = self.source[start..offset].chars().count() + 1;
        (line, column)
    }
}

/// Replace `old_len` bytes at `location` with `new_text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte offset into the statement text
    pub location: usize,

    /// Number of bytes replaced
    pub old_len: usize,

    /// Replacement text
    pub new_text: String,
}

impl Edit {
    pub fn new(location: usize, old_len: usize, new_text: impl Into<String>) -> Self {
        Self {
            location,
            old_len,
            new_text: new_text.into(),
        }
    }

    fn end(&self) -> usize {
        self.location + self.old_len
    }
}

/// Invalid edit set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("edit at {location} (length {len}) is outside the statement")]
    OutOfBounds { location: usize, len: usize },

    #[error("edits at {first} and {second} overlap")]
    Overlapping { first: usize, second: usize },
}

/// Apply non-overlapping edits to `raw`
///
/// Edit locations always refer to the original text, so the result does not
/// depend on the order the edits were produced in.
pub fn mutate(raw: &str, edits: &[Edit]) -> Result<String, EditError> {
    let mut sorted: Vec<&Edit> = edits.iter().collect();
    sorted.sort_by_key(|e| e.location);

    for edit in &sorted {
        if edit.end() > raw.len()
            || !raw.is_char_boundary(edit.location)
            || !raw.is_char_boundary(edit.end())
        {
            return Err(EditError::OutOfBounds {
                location: edit.location,
                len: edit.old_len,
            });
        }
    }
    for pair in sorted.windows(2) {
        if pair[0].end() > pair[1].location {
            return Err(EditError::Overlapping {
                first: pair[0].location,
                second: pair[1].location,
            });
        }
    }

    let mut out = String::with_capacity(raw.len());
    let mut cursor = 0;
    for edit in sorted {
        out.push_str(&raw[cursor..edit.location]);
        out.push_str(&edit.new_text);
        cursor = edit.end();
    }
    out.push_str(&raw[cursor..]);
    Ok(out)
}

/// The text of a statement given its location and length
pub fn pluck(source: &str, location: usize, len: usize) -> &str {
    let end = (location + len).min(source.len());
    source.get(location..end).unwrap_or("")
}

/// Remove whole-line comments from a query
///
/// Returns the remaining lines and the comment bodies with their markers
/// removed. `name:` metadata lines are dropped without being collected.
pub fn strip_comments(sql: &str, syntax: CommentSyntax) -> (String, Vec<String>) {
    let mut lines = Vec::new();
    let mut comments = Vec::new();

    for line in sql.trim().lines() {
        let trimmed = line.trim_start();

        if syntax.dash {
            if let Some(body) = trimmed.strip_prefix("--") {
                if !body.trim_start().starts_with("name:") {
                    comments.push(body.to_string());
                }
                continue;
            }
        }
        if syntax.slash_star && trimmed.starts_with("/*") && trimmed.trim_end().ends_with("*/") {
            let body = trimmed.trim_end();
            let body = &body[2..body.len() - 2];
            if !body.trim_start().starts_with("name:") {
                comments.push(body.to_string());
            }
            continue;
        }
        if syntax.hash {
            if let Some(body) = trimmed.strip_prefix('#') {
                if !body.trim_start().starts_with("name:") {
                    comments.push(body.to_string());
                }
                continue;
            }
        }

        lines.push(line);
    }

    (lines.join("\n"), comments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_roundtrip() {
        let src = "SELECT 1;\n-- é comment\nSELECT $1;";
        let index = LineIndex::new(src);

        let offset = index.offset(3, 8);
        assert_eq!(&src[offset..offset + 2], "$1");
        assert_eq!(index.position(offset), (3, 8));

        // columns count characters, not bytes
        let e = src.find('é').unwrap();
        assert_eq!(index.offset(2, 4), e);
        assert_eq!(index.offset(2, 5), e + 'é'.len_utf8());
    }

    #[test]
    fn line_index_clamps() {
        let index = LineIndex::new("ab");
        assert_eq!(index.offset(9, 1), 2);
        assert_eq!(index.offset(1, 99), 2);
    }

    #[test]
    fn mutate_applies_in_location_order() {
        let raw = "SELECT * FROM t WHERE a = @a AND b = @b";
        let edits = vec![
            Edit::new(37, 2, "$2"),
            Edit::new(26, 2, "$1"),
        ];
        assert_eq!(
            mutate(raw, &edits).unwrap(),
            "SELECT * FROM t WHERE a = $1 AND b = $2"
        );
    }

    #[test]
    fn mutate_without_edits_is_identity() {
        assert_eq!(mutate("SELECT 1", &[]).unwrap(), "SELECT 1");
    }

    #[test]
    fn mutate_rejects_overlap() {
        let edits = vec![Edit::new(0, 4, "x"), Edit::new(2, 1, "y")];
        assert_eq!(
            mutate("abcdef", &edits),
            Err(EditError::Overlapping { first: 0, second: 2 })
        );
    }

    #[test]
    fn mutate_rejects_out_of_bounds() {
        let edits = vec![Edit::new(4, 10, "x")];
        assert!(matches!(mutate("abcdef", &edits), Err(EditError::OutOfBounds { .. })));
    }

    #[test]
    fn strip_comments_collects_bodies() {
        let sql = "-- name: GetFoo :one\n-- @deprecated\n/* cached */\nSELECT 1\n-- trailing";
        let syntax = CommentSyntax { dash: true, hash: false, slash_star: true };
        let (query, comments) = strip_comments(sql, syntax);

        assert_eq!(query, "SELECT 1");
        assert_eq!(comments, vec![" @deprecated", " cached ", " trailing"]);
    }

    #[test]
    fn strip_comments_respects_syntax() {
        let sql = "# note\nSELECT 1";
        let (query, comments) = strip_comments(sql, CommentSyntax { dash: true, hash: false, slash_star: false });
        assert_eq!(query, "# note\nSELECT 1");
        assert!(comments.is_empty());

        let (query, comments) = strip_comments(sql, CommentSyntax { dash: true, hash: true, slash_star: false });
        assert_eq!(query, "SELECT 1");
        assert_eq!(comments, vec![" note"]);
    }
}
