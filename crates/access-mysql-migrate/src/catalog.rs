//! Catalog metadata produced by source discovery.
//!
//! A [`CatalogEntry`] is built once per table when a source database is
//! opened and is immutable afterward; the transfer engine schedules and
//! decides from it without going back to the source.

use serde::{Deserialize, Serialize};

/// Native Access/Jet column types.
///
/// Closed set of the type names the Jet engine reports through ODBC, plus a
/// passthrough for anything unrecognized. Unknown types are mapped, never
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeType {
    /// Auto-incrementing long integer.
    Counter,
    /// 32-bit integer (Jet reports both LONG and INTEGER).
    Long,
    /// 16-bit integer.
    Short,
    /// 8-bit integer.
    Byte,
    /// Single-precision float.
    Single,
    /// Double-precision float.
    Double,
    /// Fixed-point currency, 4 decimal places.
    Currency,
    /// Date/time without timezone.
    DateTime,
    /// Boolean (Yes/No).
    Bit,
    /// Short text, up to 255 characters.
    Text,
    /// Long text (memo).
    Memo,
    /// OLE object / long binary.
    LongBinary,
    /// Fixed-size binary.
    Binary,
    /// Anything else the driver reported.
    Other(String),
}

impl NativeType {
    /// Parse a type name as reported by the ODBC driver.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "COUNTER" | "AUTOINCREMENT" | "IDENTITY" => NativeType::Counter,
            "LONG" | "INTEGER" | "INT" | "LONG INTEGER" => NativeType::Long,
            "SHORT" | "SMALLINT" => NativeType::Short,
            "BYTE" | "TINYINT" | "UNSIGNED TINYINT" => NativeType::Byte,
            "SINGLE" | "REAL" => NativeType::Single,
            "DOUBLE" | "FLOAT" | "NUMERIC" => NativeType::Double,
            "CURRENCY" | "MONEY" => NativeType::Currency,
            "DATETIME" | "DATE" | "TIME" | "TIMESTAMP" => NativeType::DateTime,
            "BIT" | "YESNO" | "BOOLEAN" => NativeType::Bit,
            "TEXT" | "VARCHAR" | "CHAR" | "NVARCHAR" => NativeType::Text,
            "MEMO" | "LONGTEXT" | "LONGCHAR" | "NTEXT" => NativeType::Memo,
            "LONGBINARY" | "OLEOBJECT" | "IMAGE" | "LONGVARBINARY" => NativeType::LongBinary,
            "BINARY" | "VARBINARY" => NativeType::Binary,
            other => NativeType::Other(other.to_string()),
        }
    }
}

/// Column metadata as reported by the source.
///
/// Names are unique within a table; the source connector sanitizes them
/// before building an entry, so a descriptor's `name` is already a valid
/// MySQL identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Sanitized column name.
    pub name: String,

    /// Native type reported by the driver.
    pub native_type: NativeType,

    /// Declared size (characters for text, bytes for binary; 0 if unknown).
    pub declared_size: u32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is (part of) the primary key.
    pub is_primary_key: bool,
}

/// One table discovered in a source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Sanitized database identifier (derived from the source file stem).
    pub database: String,

    /// Sanitized table name.
    pub name: String,

    /// Estimated row count from a fast COUNT query at discovery time.
    pub estimated_rows: u64,

    /// Column descriptors in ordinal order.
    pub columns: Vec<ColumnDescriptor>,
}

impl CatalogEntry {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Primary key column names, if any.
    pub fn key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}
