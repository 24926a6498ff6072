//! Name resolution for tables, aliases and CTEs
//!
//! An [`Env`] is a stack of frames, one per nested query level. Each frame
//! holds the CTEs declared at that level and the relations its FROM clause
//! brings into scope. Lookups walk frames from the innermost outwards.

use std::ops::Range;

use sqlbind_core::{Column, Nullability, TableIdentifier};

/// A relation visible to column references
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Alias, or the table name when no alias was given
    pub name: String,

    /// Catalog identity, `None` for CTEs and derived tables
    pub table: Option<TableIdentifier>,

    /// Whether the table was referenced through an alias
    pub aliased: bool,

    pub columns: Vec<Column>,

    /// Brought in by the outer side of a LEFT/RIGHT/FULL join
    pub nullable: bool,
}

impl Relation {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            table: None,
            aliased: false,
            columns,
            nullable: false,
        }
    }

    /// Column as seen through this relation
    pub fn column(&self, name: &str) -> Option<Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| self.qualify(c.clone()))
    }

    /// Every column as seen through this relation
    pub fn all_columns(&self) -> Vec<Column> {
        self.columns.iter().cloned().map(|c| self.qualify(c)).collect()
    }

    fn qualify(&self, mut column: Column) -> Column {
        if self.aliased {
            column.table_alias = Some(self.name.clone());
        }
        if self.nullable {
            column.nullable = Nullability::Yes;
        }
        column
    }
}

/// Lookup failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("relation \"{0}\" does not exist")]
    RelationNotFound(String),

    #[error("column \"{0}\" does not exist")]
    ColumnNotFound(String),

    #[error("column reference \"{0}\" is ambiguous")]
    AmbiguousColumn(String),

    #[error("column \"{column}\" of relation \"{table}\" does not exist")]
    TargetColumnNotFound { table: String, column: String },

    #[error("INSERT has more expressions than target columns")]
    TooManyValues,

    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

#[derive(Debug, Clone, Default)]
struct Frame {
    ctes: Vec<(String, Vec<Column>)>,
    relations: Vec<Relation>,

    /// Columns merged by `JOIN ... USING`; unqualified references to them
    /// are not ambiguous
    using: Vec<String>,
}

/// Nested lookup scope
#[derive(Debug, Clone, Default)]
pub struct Env {
    frames: Vec<Frame>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of this scope with a fresh innermost frame
    pub fn child(&self) -> Self {
        let mut env = self.clone();
        env.frames.push(Frame::default());
        env
    }

    fn innermost(&mut self) -> &mut Frame {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn add_cte(&mut self, name: impl Into<String>, columns: Vec<Column>) {
        self.innermost().ctes.push((name.into(), columns));
    }

    pub fn add_relation(&mut self, relation: Relation) {
        self.innermost().relations.push(relation);
    }

    pub fn add_using(&mut self, column: impl Into<String>) {
        self.innermost().using.push(column.into());
    }

    /// Mark relations `range` of the innermost frame as nullable
    pub fn make_nullable(&mut self, range: Range<usize>) {
        let relations = &mut self.innermost().relations;
        let end = range.end.min(relations.len());
        for relation in &mut relations[range.start.min(end)..end] {
            relation.nullable = true;
        }
    }

    /// Number of relations in the innermost frame
    pub fn relation_count(&self) -> usize {
        self.frames.last().map(|f| f.relations.len()).unwrap_or(0)
    }

    /// Relations of the innermost frame, in FROM order
    pub fn relations(&self) -> &[Relation] {
        self.frames.last().map(|f| f.relations.as_slice()).unwrap_or(&[])
    }

    /// CTE columns by name, innermost declaration first
    pub fn cte(&self, name: &str) -> Option<&[Column]> {
        self.frames.iter().rev().find_map(|frame| {
            frame
                .ctes
                .iter()
                .rev()
                .find(|(cte, _)| cte == name)
                .map(|(_, columns)| columns.as_slice())
        })
    }

    /// Relation by alias or table name
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.relations.iter().find(|r| r.name == name))
    }

    /// Resolve a possibly qualified column reference
    pub fn column(&self, parts: &[String]) -> Result<Column, ResolveError> {
        match parts {
            [name] => self.unqualified(name),
            [.., relation, name] => {
                let relation = self
                    .relation(relation)
                    .ok_or_else(|| ResolveError::RelationNotFound(relation.clone()))?;
                relation
                    .column(name)
                    .ok_or_else(|| ResolveError::ColumnNotFound(name.clone()))
            }
            [] => Err(ResolveError::InvalidReference(String::new())),
        }
    }

    fn unqualified(&self, name: &str) -> Result<Column, ResolveError> {
        for frame in self.frames.iter().rev() {
            let mut found = frame.relations.iter().filter_map(|r| r.column(name));
            let Some(first) = found.next() else {
                continue;
            };
            if found.next().is_some() && !frame.using.iter().any(|u| u == name) {
                return Err(ResolveError::AmbiguousColumn(name.to_string()));
            }
            return Ok(first);
        }
        Err(ResolveError::ColumnNotFound(name.to_string()))
    }
}
