//! Compiled query records

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlbind_catalog::Catalog;
use sqlbind_core::{Column, TableIdentifier};
use sqlbind_sql::Cmd;

use crate::options::QueryOptions;

/// A bound query parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// 1-based positional number
    pub number: usize,

    pub column: Column,
}

/// One typed, resolved statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,

    pub cmd: Cmd,

    /// Executable SQL: named parameters and embeds rewritten, comments removed
    pub sql: String,

    /// Parameters ordered by number
    pub params: Vec<Parameter>,

    /// Output columns in select-list order
    pub columns: Vec<Column>,

    /// Table written by an INSERT
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_into_table: Option<TableIdentifier>,

    /// Comment lines, markers removed, metadata lines excluded
    #[serde(default)]
    pub comments: Vec<String>,

    /// `@flag` comment lines
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,

    /// Base name of the file the query was read from
    pub filename: String,

    /// Options as written, after defaulting
    #[serde(default)]
    pub raw_options: BTreeMap<String, String>,

    #[serde(default)]
    pub options: QueryOptions,
}

impl Query {
    /// Output columns with repeated names dropped, first occurrence wins
    pub fn unique_columns(&self) -> Vec<&Column> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .filter(|c| c.name.is_empty() || seen.insert(c.name.as_str()))
            .collect()
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }
}

/// Everything a compilation run hands to code generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileResult {
    pub catalog: Catalog,
    pub queries: Vec<Query>,
}

impl CompileResult {
    pub fn query(&self, name: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(columns: Vec<Column>) -> Query {
        Query {
            name: "ListUsers".to_string(),
            cmd: Cmd::Many,
            sql: "SELECT u.id, o.id FROM users u JOIN orgs o ON o.id = u.org_id".to_string(),
            params: Vec::new(),
            columns,
            insert_into_table: None,
            comments: Vec::new(),
            flags: BTreeMap::from([("@cached".to_string(), true)]),
            filename: "users.sql".to_string(),
            raw_options: BTreeMap::new(),
            options: QueryOptions::default(),
        }
    }

    #[test]
    fn unique_columns_keeps_first() {
        let q = query(vec![
            Column::new("id", "integer"),
            Column::new("id", "bigint"),
            Column::new("", "text"),
            Column::new("", "text"),
        ]);
        let unique = q.unique_columns();
        assert_eq!(unique.len(), 3);
        assert_eq!(unique[0].data_type, "integer");
        assert_eq!(q.columns.len(), 4);
    }

    #[test]
    fn flags() {
        let q = query(Vec::new());
        assert!(q.has_flag("@cached"));
        assert!(!q.has_flag("@other"));
    }
}
