//! In-memory schema catalog built from DDL

use serde::{Deserialize, Serialize};
use sqlbind_core::{Column, EnumType, LogicalType, Nullability, Table, TableIdentifier};
use sqlparser::ast::{
    AlterColumnOperation, AlterTableOperation, ColumnDef, ColumnOption, CommentObject, CreateTable,
    Ident, ObjectName, ObjectType, SchemaName, Statement, TableConstraint,
    UserDefinedTypeRepresentation,
};
use tracing::debug;

use crate::error::CatalogError;
use crate::types::column_type;

/// Name of an identifier as the engine sees it: unquoted identifiers fold to lower case
pub fn ident_name(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

/// A namespace of tables and types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    pub tables: Vec<Table>,
    pub enums: Vec<EnumType>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
            enums: Vec::new(),
        }
    }

    fn table_index(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.id.name == name)
    }
}

/// Schema registry for one compilation run
///
/// Mutated only while the schema files are applied; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// Schema used for unqualified names
    pub default_schema: String,

    pub schemas: Vec<Schema>,

    /// First table created by the first schema file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_table: Option<TableIdentifier>,

    /// Raw contents of the first schema file
    #[serde(default)]
    pub raw_sql: Vec<String>,
}

impl Catalog {
    /// Empty catalog containing only the default schema
    pub fn new(default_schema: impl Into<String>) -> Self {
        let default_schema = default_schema.into();
        Self {
            schemas: vec![Schema::new(default_schema.clone())],
            default_schema,
            main_table: None,
            raw_sql: Vec::new(),
        }
    }

    /// Whether `statement` lays out a new table
    pub fn is_creating_new_table_layout(statement: &Statement) -> bool {
        matches!(statement, Statement::CreateTable(_))
    }

    pub fn add_raw_sql(&mut self, sql: impl Into<String>) {
        self.raw_sql.push(sql.into());
    }

    /// Resolve an object name against the default schema
    pub fn table_id(&self, name: &ObjectName) -> Result<TableIdentifier, CatalogError> {
        let parts: Vec<String> = name.0.iter().map(ident_name).collect();
        match parts.as_slice() {
            [table] => Ok(TableIdentifier::new(&self.default_schema, table)),
            [schema, table] => Ok(TableIdentifier::new(schema, table)),
            [catalog, schema, table] => Ok(TableIdentifier {
                catalog: catalog.clone(),
                schema: schema.clone(),
                name: table.clone(),
            }),
            _ => Err(CatalogError::InvalidName(name.to_string())),
        }
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    fn schema_mut(&mut self, name: &str) -> Result<&mut Schema, CatalogError> {
        self.schemas
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| CatalogError::SchemaNotFound(name.to_string()))
    }

    pub fn get_table(&self, id: &TableIdentifier) -> Result<&Table, CatalogError> {
        self.schema(&id.schema)
            .and_then(|s| s.tables.iter().find(|t| t.id.name == id.name))
            .ok_or_else(|| CatalogError::TableNotFound(id.clone()))
    }

    fn get_table_mut(&mut self, id: &TableIdentifier) -> Result<&mut Table, CatalogError> {
        self.schemas
            .iter_mut()
            .find(|s| s.name == id.schema)
            .and_then(|s| s.tables.iter_mut().find(|t| t.id.name == id.name))
            .ok_or_else(|| CatalogError::TableNotFound(id.clone()))
    }

    /// Look a table up by the name used in a statement
    pub fn resolve_table(&self, name: &ObjectName) -> Result<&Table, CatalogError> {
        self.get_table(&self.table_id(name)?)
    }

    /// All tables in schema order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.schemas.iter().flat_map(|s| s.tables.iter())
    }

    /// Find an enum type, preferring the default schema
    pub fn find_enum(&self, name: &str) -> Option<&EnumType> {
        self.schema(&self.default_schema)
            .into_iter()
            .chain(self.schemas.iter())
            .flat_map(|s| s.enums.iter())
            .find(|e| e.name == name)
    }

    /// Apply one DDL statement
    ///
    /// `is_first_table_def` marks the table created by this statement as the
    /// catalog's main table. Statements that do not change the table layout
    /// (indexes, functions, grants, ...) are accepted and ignored.
    pub fn apply_statement(
        &mut self,
        statement: &Statement,
        is_first_table_def: bool,
    ) -> Result<(), CatalogError> {
        match statement {
            Statement::CreateSchema {
                schema_name,
                if_not_exists,
                ..
            } => self.create_schema(schema_name, *if_not_exists),
            Statement::CreateTable(create) => {
                let id = self.create_table(create)?;
                if is_first_table_def {
                    if let Some(id) = id {
                        self.main_table = Some(id);
                    }
                }
                Ok(())
            }
            Statement::AlterTable {
                name,
                if_exists,
                operations,
                ..
            } => self.alter_table(name, *if_exists, operations),
            Statement::Drop {
                object_type,
                if_exists,
                names,
                ..
            } => self.drop(object_type, *if_exists, names),
            Statement::CreateType {
                name,
                representation,
            } => self.create_type(name, representation),
            Statement::Comment {
                object_type,
                object_name,
                comment,
                ..
            } => self.comment(object_type, object_name, comment.clone()),
            other => {
                debug!("Ignoring DDL statement: {}", statement_kind(other));
                Ok(())
            }
        }
    }

    fn create_schema(&mut self, name: &SchemaName, if_not_exists: bool) -> Result<(), CatalogError> {
        let name = match name {
            SchemaName::Simple(name) | SchemaName::NamedAuthorization(name, _) => name
                .0
                .last()
                .map(ident_name)
                .ok_or_else(|| CatalogError::InvalidName(name.to_string()))?,
            SchemaName::UnnamedAuthorization(ident) => ident_name(ident),
        };

        if self.schema(&name).is_some() {
            if if_not_exists {
                return Ok(());
            }
            return Err(CatalogError::SchemaExists(name));
        }
        self.schemas.push(Schema::new(name));
        Ok(())
    }

    fn column(&self, table: &TableIdentifier, def: &ColumnDef, primary_key: bool) -> Column {
        let ty = column_type(&def.data_type);
        let logical = match (&ty.logical, self.find_enum(&ty.name)) {
            (LogicalType::Unknown, Some(e)) => LogicalType::Enum {
                name: e.name.clone(),
            },
            (logical, _) => logical.clone(),
        };

        let mut not_null = ty.serial || primary_key;
        let mut comment = None;
        for option in &def.options {
            match &option.option {
                ColumnOption::NotNull => not_null = true,
                ColumnOption::Null => not_null = primary_key,
                ColumnOption::Unique { is_primary: true, .. } => not_null = true,
                ColumnOption::Comment(text) => comment = Some(text.clone()),
                _ => {}
            }
        }

        let mut column = Column::new(ident_name(&def.name), ty.name)
            .with_logical_type(logical)
            .with_nullability(Nullability::from_not_null(not_null))
            .with_array(ty.is_array)
            .with_table(table.clone());
        column.comment = comment;
        column
    }

    fn create_table(&mut self, create: &CreateTable) -> Result<Option<TableIdentifier>, CatalogError> {
        if create.query.is_some() {
            return Err(CatalogError::Unsupported("CREATE TABLE AS".to_string()));
        }

        let id = self.table_id(&create.name)?;
        if self.get_table(&id).is_ok() {
            if create.if_not_exists {
                return Ok(None);
            }
            return Err(CatalogError::TableExists(id));
        }

        let primary_key: Vec<String> = create
            .constraints
            .iter()
            .filter_map(|constraint| match constraint {
                TableConstraint::PrimaryKey { columns, .. } => Some(columns),
                _ => None,
            })
            .flatten()
            .map(ident_name)
            .collect();

        let mut table = Table::new(id.clone());
        for def in &create.columns {
            let name = ident_name(&def.name);
            if table.find_column(&name).is_some() {
                return Err(CatalogError::ColumnExists {
                    table: id,
                    column: name,
                });
            }
            let column = self.column(&id, def, primary_key.contains(&name));
            table.columns.push(column);
        }

        debug!("Created table {} with {} columns", id, table.columns.len());
        self.schema_mut(&id.schema)?.tables.push(table);
        Ok(Some(id))
    }

    fn alter_table(
        &mut self,
        name: &ObjectName,
        if_exists: bool,
        operations: &[AlterTableOperation],
    ) -> Result<(), CatalogError> {
        let mut id = self.table_id(name)?;
        if self.get_table(&id).is_err() && if_exists {
            return Ok(());
        }

        for operation in operations {
            match operation {
                AlterTableOperation::AddColumn {
                    if_not_exists,
                    column_def,
                    ..
                } => {
                    let column = self.column(&id, column_def, false);
                    let table = self.get_table_mut(&id)?;
                    if table.find_column(&column.name).is_some() {
                        if *if_not_exists {
                            continue;
                        }
                        return Err(CatalogError::ColumnExists {
                            table: id,
                            column: column.name,
                        });
                    }
                    table.columns.push(column);
                }
                AlterTableOperation::DropColumn {
                    column_name,
                    if_exists,
                    ..
                } => {
                    let column = ident_name(column_name);
                    let table = self.get_table_mut(&id)?;
                    match table.columns.iter().position(|c| c.name == column) {
                        Some(index) => {
                            table.columns.remove(index);
                        }
                        None if *if_exists => {}
                        None => return Err(CatalogError::ColumnNotFound { table: id, column }),
                    }
                }
                AlterTableOperation::RenameColumn {
                    old_column_name,
                    new_column_name,
                } => {
                    let old = ident_name(old_column_name);
                    let new = ident_name(new_column_name);
                    let table = self.get_table_mut(&id)?;
                    if table.find_column(&new).is_some() {
                        return Err(CatalogError::ColumnExists { table: id, column: new });
                    }
                    match table.find_column_mut(&old) {
                        Some(column) => column.name = new,
                        None => return Err(CatalogError::ColumnNotFound { table: id, column: old }),
                    }
                }
                AlterTableOperation::RenameTable { table_name } => {
                    let target = self.table_id(table_name)?;
                    let renamed = TableIdentifier {
                        name: target.name,
                        ..id.clone()
                    };
                    if self.get_table(&renamed).is_ok() {
                        return Err(CatalogError::TableExists(renamed));
                    }
                    let table = self.get_table_mut(&id)?;
                    table.id = renamed.clone();
                    for column in &mut table.columns {
                        column.table = Some(renamed.clone());
                    }
                    if self.main_table.as_ref() == Some(&id) {
                        self.main_table = Some(renamed.clone());
                    }
                    id = renamed;
                }
                AlterTableOperation::AlterColumn { column_name, op } => {
                    let name = ident_name(column_name);
                    let replacement = match op {
                        AlterColumnOperation::SetDataType { data_type, .. } => Some(column_type(data_type)),
                        _ => None,
                    };
                    let table = self.get_table_mut(&id)?;
                    let Some(column) = table.find_column_mut(&name) else {
                        return Err(CatalogError::ColumnNotFound { table: id, column: name });
                    };
                    match op {
                        AlterColumnOperation::SetNotNull => column.nullable = Nullability::No,
                        AlterColumnOperation::DropNotNull => column.nullable = Nullability::Yes,
                        _ => {}
                    }
                    if let Some(ty) = replacement {
                        column.data_type = ty.name;
                        column.logical_type = ty.logical;
                        column.is_array = ty.is_array;
                    }
                }
                other => debug!("Ignoring ALTER TABLE operation: {}", other),
            }
        }
        Ok(())
    }

    fn drop(&mut self, object_type: &ObjectType, if_exists: bool, names: &[ObjectName]) -> Result<(), CatalogError> {
        for name in names {
            match object_type {
                ObjectType::Table => {
                    let id = self.table_id(name)?;
                    let schema = self.schemas.iter_mut().find(|s| s.name == id.schema);
                    match schema.and_then(|s| s.table_index(&id.name).map(|i| (s, i))) {
                        Some((schema, index)) => {
                            schema.tables.remove(index);
                        }
                        None if if_exists => {}
                        None => return Err(CatalogError::TableNotFound(id)),
                    }
                }
                ObjectType::Schema => {
                    let schema = name.0.last().map(ident_name).unwrap_or_default();
                    match self.schemas.iter().position(|s| s.name == schema) {
                        Some(index) => {
                            self.schemas.remove(index);
                        }
                        None if if_exists => {}
                        None => return Err(CatalogError::SchemaNotFound(schema)),
                    }
                }
                ObjectType::Type => {
                    let type_name = name.0.last().map(ident_name).unwrap_or_default();
                    let found = self.schemas.iter_mut().find_map(|s| {
                        let index = s.enums.iter().position(|e| e.name == type_name)?;
                        Some((s, index))
                    });
                    match found {
                        Some((schema, index)) => {
                            schema.enums.remove(index);
                        }
                        None if if_exists => {}
                        None => return Err(CatalogError::TypeNotFound(type_name)),
                    }
                }
                other => debug!("Ignoring DROP {}", other),
            }
        }
        Ok(())
    }

    fn create_type(
        &mut self,
        name: &ObjectName,
        representation: &UserDefinedTypeRepresentation,
    ) -> Result<(), CatalogError> {
        let UserDefinedTypeRepresentation::Enum { labels } = representation else {
            debug!("Ignoring composite type {}", name);
            return Ok(());
        };

        let (schema, type_name) = match name.0.as_slice() {
            [type_name] => (self.default_schema.clone(), ident_name(type_name)),
            [schema, type_name] => (ident_name(schema), ident_name(type_name)),
            _ => return Err(CatalogError::InvalidName(name.to_string())),
        };
        let schema = self.schema_mut(&schema)?;
        if schema.enums.iter().any(|e| e.name == type_name) {
            return Err(CatalogError::TypeExists(type_name));
        }
        schema.enums.push(EnumType {
            schema: schema.name.clone(),
            name: type_name,
            values: labels.iter().map(|l| l.value.clone()).collect(),
        });
        Ok(())
    }

    fn comment(
        &mut self,
        object_type: &CommentObject,
        name: &ObjectName,
        comment: Option<String>,
    ) -> Result<(), CatalogError> {
        match object_type {
            CommentObject::Table => {
                let id = self.table_id(name)?;
                self.get_table_mut(&id)?.comment = comment;
            }
            CommentObject::Column => {
                let Some((column, table)) = name.0.split_last() else {
                    return Err(CatalogError::InvalidName(name.to_string()));
                };
                let id = self.table_id(&ObjectName(table.to_vec()))?;
                let column = ident_name(column);
                let table = self.get_table_mut(&id)?;
                match table.find_column_mut(&column) {
                    Some(c) => c.comment = comment,
                    None => return Err(CatalogError::ColumnNotFound { table: id, column }),
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Leading keywords of a statement, for log messages
pub fn statement_kind(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}
