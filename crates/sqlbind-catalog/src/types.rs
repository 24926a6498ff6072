//! Mapping DDL data types to catalog column types

use sqlbind_core::LogicalType;
use sqlparser::ast::{ArrayElemTypeDef, DataType, ExactNumberInfo};

/// Column type as recorded in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnType {
    /// Canonical lower-case engine type name, without array brackets
    pub name: String,

    pub logical: LogicalType,

    pub is_array: bool,

    /// `serial`-family types are implicitly NOT NULL
    pub serial: bool,
}

/// Resolve a DDL data type
pub fn column_type(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Array(element) => {
            let inner = match element {
                ArrayElemTypeDef::AngleBracket(inner)
                | ArrayElemTypeDef::SquareBracket(inner, _)
                | ArrayElemTypeDef::Parenthesis(inner) => column_type(inner),
                ArrayElemTypeDef::None => ColumnType {
                    name: "any".to_string(),
                    logical: LogicalType::Unknown,
                    is_array: false,
                    serial: false,
                },
            };
            ColumnType {
                is_array: true,
                ..inner
            }
        }
        DataType::Decimal(info) | DataType::Numeric(info) => ColumnType {
            name: "numeric".to_string(),
            logical: decimal(info),
            is_array: false,
            serial: false,
        },
        DataType::Custom(name, _) => {
            let type_name = name
                .0
                .last()
                .map(|ident| {
                    if ident.quote_style.is_some() {
                        ident.value.clone()
                    } else {
                        ident.value.to_lowercase()
                    }
                })
                .unwrap_or_default();
            named_type(&type_name)
        }
        other => {
            let name = strip_modifiers(&other.to_string().to_lowercase());
            named_type(name.trim_end_matches(" unsigned"))
        }
    }
}

fn decimal(info: &ExactNumberInfo) -> LogicalType {
    match info {
        ExactNumberInfo::None => LogicalType::Decimal {
            precision: None,
            scale: None,
        },
        ExactNumberInfo::Precision(p) => LogicalType::Decimal {
            precision: Some((*p).min(u16::MAX as u64) as u16),
            scale: Some(0),
        },
        ExactNumberInfo::PrecisionAndScale(p, s) => LogicalType::Decimal {
            precision: Some((*p).min(u16::MAX as u64) as u16),
            scale: Some((*s as u64).min(u16::MAX as u64) as u16),
        },
    }
}

/// Drop `(n)` / `(p, s)` modifiers: `varchar(255)` -> `varchar`
fn strip_modifiers(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical name and logical type for a type name
pub fn named_type(name: &str) -> ColumnType {
    let (canonical, logical, serial) = match name {
        "serial" | "serial4" => ("integer", LogicalType::Int, true),
        "bigserial" | "serial8" => ("bigint", LogicalType::Int, true),
        "smallserial" | "serial2" => ("smallint", LogicalType::Int, true),
        "int" | "int4" | "integer" | "mediumint" => ("integer", LogicalType::Int, false),
        "int2" | "smallint" => ("smallint", LogicalType::Int, false),
        "int8" | "bigint" => ("bigint", LogicalType::Int, false),
        "tinyint" => ("tinyint", LogicalType::Int, false),
        "bool" | "boolean" => ("boolean", LogicalType::Bool, false),
        "real" | "float4" => ("real", LogicalType::Float, false),
        "float" | "float8" | "double" | "double precision" => {
            ("double precision", LogicalType::Float, false)
        }
        "decimal" | "numeric" => (
            "numeric",
            LogicalType::Decimal {
                precision: None,
                scale: None,
            },
            false,
        ),
        "text" | "string" | "citext" | "clob" | "tinytext" | "mediumtext" | "longtext" => {
            ("text", LogicalType::String, false)
        }
        "varchar" | "character varying" | "nvarchar" => ("varchar", LogicalType::String, false),
        "char" | "character" | "bpchar" | "nchar" => ("bpchar", LogicalType::String, false),
        "bytea" | "blob" | "binary" | "varbinary" | "longblob" | "bytes" => {
            ("bytea", LogicalType::Bytes, false)
        }
        "date" => ("date", LogicalType::Date, false),
        "time" | "time without time zone" => ("time", LogicalType::Time, false),
        "timetz" | "time with time zone" => ("timetz", LogicalType::Time, false),
        "timestamp" | "timestamp without time zone" | "datetime" => {
            ("timestamp", LogicalType::Timestamp, false)
        }
        "timestamptz" | "timestamp with time zone" => {
            ("timestamptz", LogicalType::Timestamp, false)
        }
        "uuid" => ("uuid", LogicalType::Uuid, false),
        "json" => ("json", LogicalType::Json, false),
        "jsonb" => ("jsonb", LogicalType::Json, false),
        other => {
            return ColumnType {
                name: other.to_string(),
                logical: LogicalType::Unknown,
                is_array: false,
                serial: false,
            }
        }
    };

    ColumnType {
        name: canonical.to_string(),
        logical,
        is_array: false,
        serial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::{Ident, ObjectName};

    #[test]
    fn integers_and_serials() {
        assert_eq!(column_type(&DataType::Int(None)).name, "integer");
        assert_eq!(column_type(&DataType::BigInt(None)).name, "bigint");

        let serial = column_type(&DataType::Custom(ObjectName(vec![Ident::new("BIGSERIAL")]), vec![]));
        assert_eq!(serial.name, "bigint");
        assert_eq!(serial.logical, LogicalType::Int);
        assert!(serial.serial);
    }

    #[test]
    fn modifiers_are_stripped() {
        let varchar = column_type(&DataType::Varchar(None));
        assert_eq!(varchar.name, "varchar");
        assert_eq!(strip_modifiers("character varying(255)"), "character varying");
        assert_eq!(strip_modifiers("timestamp(3) with time zone"), "timestamp with time zone");
    }

    #[test]
    fn decimal_precision() {
        let numeric = column_type(&DataType::Numeric(ExactNumberInfo::PrecisionAndScale(10, 2)));
        assert_eq!(numeric.name, "numeric");
        assert_eq!(
            numeric.logical,
            LogicalType::Decimal {
                precision: Some(10),
                scale: Some(2)
            }
        );
    }

    #[test]
    fn arrays_keep_element_type() {
        let array = column_type(&DataType::Array(ArrayElemTypeDef::SquareBracket(
            Box::new(DataType::Text),
            None,
        )));
        assert!(array.is_array);
        assert_eq!(array.name, "text");
        assert_eq!(array.logical, LogicalType::String);
    }

    #[test]
    fn unknown_names_pass_through() {
        let custom = named_type("mood");
        assert_eq!(custom.name, "mood");
        assert_eq!(custom.logical, LogicalType::Unknown);
    }
}
