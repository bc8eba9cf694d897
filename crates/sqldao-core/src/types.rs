//! Database type names and their in-memory representation.

use serde::{Deserialize, Serialize};

/// In-memory categories that database column types translate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// Unknown or untyped column
    #[default]
    Default,
    Boolean,
    Int,
    UInt,
    Long,
    ULong,
    Decimal,
    String,
    ByteArray,
    DateTime,
}

impl DataType {
    /// Rust type name used for diagnostics.
    pub const fn rust_name(self) -> &'static str {
        match self {
            DataType::Default => "Value",
            DataType::Boolean => "bool",
            DataType::Int => "i32",
            DataType::UInt => "u32",
            DataType::Long => "i64",
            DataType::ULong => "u64",
            DataType::Decimal => "Decimal",
            DataType::String => "String",
            DataType::ByteArray => "Vec<u8>",
            DataType::DateTime => "Timestamp",
        }
    }

    /// Check if this type is numeric.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Int
                | DataType::UInt
                | DataType::Long
                | DataType::ULong
                | DataType::Decimal
        )
    }
}

/// Maps database type names onto [`DataType`].
///
/// Dialects may override individual names; unknown names fall back to
/// [`DataType::String`].
pub trait DataTypeTranslator: Send + Sync {
    /// Translate a database type name (case-insensitive, size suffix ignored).
    fn translate(&self, db_type: &str) -> DataType {
        default_translation(&normalize(db_type))
    }
}

/// The translation table shared by every dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardTypeTranslator;

impl DataTypeTranslator for StandardTypeTranslator {}

fn normalize(db_type: &str) -> String {
    let lower = db_type.trim().to_ascii_lowercase();
    match lower.find('(') {
        Some(idx) => lower[..idx].trim_end().to_string(),
        None => lower,
    }
}

fn default_translation(db_type: &str) -> DataType {
    match db_type {
        "bigint" => DataType::ULong,
        "binary" | "blob" | "tinyblob" | "varbinary" => DataType::ByteArray,
        "bit" => DataType::Boolean,
        "char" | "enum" | "text" | "tinytext" | "varchar" | "timestamp" | "year" => {
            DataType::String
        }
        "date" | "datetime" | "time" => DataType::DateTime,
        "decimal" | "double" | "float" => DataType::Decimal,
        "int" | "smallint" | "tinyint" => DataType::Int,
        _ => DataType::String,
    }
}
