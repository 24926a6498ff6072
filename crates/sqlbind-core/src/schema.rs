//! Schema types and canonical type system

use serde::{Deserialize, Serialize};

/// Portable logical type system
///
/// Maps engine-specific type names to a common representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogicalType {
    /// Boolean type
    Bool,

    /// Integer type (any precision)
    Int,

    /// Floating point (any precision)
    Float,

    /// Decimal with precision and scale
    Decimal {
        precision: Option<u16>,
        scale: Option<u16>,
    },

    /// String/text type
    String,

    /// Binary data
    Bytes,

    /// Date (no time component)
    Date,

    /// Time of day
    Time,

    /// Timestamp (with time component)
    Timestamp,

    /// UUID
    Uuid,

    /// JSON/JSONB
    Json,

    /// Array type
    Array {
        element_type: Box<LogicalType>,
    },

    /// User-defined enum
    Enum {
        name: String,
    },

    /// Unknown type (cannot infer)
    Unknown,
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "BOOL"),
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Decimal { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => write!(f, "DECIMAL({}, {})", p, s),
                (Some(p), None) => write!(f, "DECIMAL({})", p),
                _ => write!(f, "DECIMAL"),
            },
            Self::String => write!(f, "STRING"),
            Self::Bytes => write!(f, "BYTES"),
            Self::Date => write!(f, "DATE"),
            Self::Time => write!(f, "TIME"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Uuid => write!(f, "UUID"),
            Self::Json => write!(f, "JSON"),
            Self::Array { element_type } => write!(f, "ARRAY<{}>", element_type),
            Self::Enum { name } => write!(f, "ENUM({})", name),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Nullability state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nullability {
    /// Definitely nullable
    Yes,

    /// Definitely not nullable
    No,

    /// Cannot determine nullability
    Unknown,
}

impl Nullability {
    /// `No` when `not_null` is set, `Yes` otherwise
    pub fn from_not_null(not_null: bool) -> Self {
        if not_null {
            Self::No
        } else {
            Self::Yes
        }
    }
}

/// Fully qualified table identity
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableIdentifier {
    /// Catalog (database) name, usually empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog: String,

    /// Schema (namespace) name
    pub schema: String,

    /// Table name
    pub name: String,
}

impl TableIdentifier {
    /// Create a new schema-qualified identifier
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            catalog: String::new(),
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Dotted name, skipping empty parts
    pub fn fqn(&self) -> String {
        [&self.catalog, &self.schema, &self.name]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl std::fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// A column of a table, a query result, or a query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Column name (may be empty for unnamed expressions)
    pub name: String,

    /// Engine type name, lower case, without array brackets
    pub data_type: String,

    /// Logical type
    pub logical_type: LogicalType,

    /// Nullability
    pub nullable: Nullability,

    /// Whether the value is an array of `data_type`
    #[serde(default)]
    pub is_array: bool,

    /// Table the column was read from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableIdentifier>,

    /// Alias the table was referenced by in the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_alias: Option<String>,

    /// Set when this output column stands for a whole embedded table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embed_table: Option<TableIdentifier>,

    /// Set for parameters declared by name
    #[serde(default)]
    pub is_named_param: bool,

    /// Comment attached with COMMENT ON COLUMN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Column {
    /// Create a nullable column of the given engine type
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            logical_type: LogicalType::Unknown,
            nullable: Nullability::Unknown,
            is_array: false,
            table: None,
            table_alias: None,
            embed_table: None,
            is_named_param: false,
            comment: None,
        }
    }

    /// Column of type `any` with unknown nullability
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, "any")
    }

    /// Set logical type
    pub fn with_logical_type(mut self, logical_type: LogicalType) -> Self {
        self.logical_type = logical_type;
        self
    }

    /// Set nullability
    pub fn with_nullability(mut self, nullable: Nullability) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set the source table
    pub fn with_table(mut self, table: TableIdentifier) -> Self {
        self.table = Some(table);
        self
    }

    /// Mark the column as an array
    pub fn with_array(mut self, is_array: bool) -> Self {
        self.is_array = is_array;
        self
    }

    /// Whether the column is known to never be null
    pub fn is_not_null(&self) -> bool {
        self.nullable == Nullability::No
    }
}

/// A table in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table identity
    pub id: TableIdentifier,

    /// Ordered list of columns
    pub columns: Vec<Column>,

    /// Comment attached with COMMENT ON TABLE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Table {
    /// Create a new empty table
    pub fn new(id: TableIdentifier) -> Self {
        Self {
            id,
            columns: Vec::new(),
            comment: None,
        }
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Find a column by name for modification
    pub fn find_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// A user-defined enum type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumType {
    /// Schema the type lives in
    pub schema: String,

    /// Type name
    pub name: String,

    /// Ordered labels
    pub values: Vec<String>,
}
