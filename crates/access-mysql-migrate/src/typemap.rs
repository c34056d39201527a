//! Type mapping between Access/Jet and MySQL.

use tracing::warn;

use crate::catalog::{ColumnDescriptor, NativeType};

/// Longest TEXT declaration that still maps to a bounded VARCHAR.
const VARCHAR_LIMIT: u32 = 255;

/// Cap for fixed binary columns; longer declarations are truncated.
const VARBINARY_CAP: u32 = 255;

/// A mapped target column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetColumn {
    /// Column name (already sanitized by the source connector).
    pub name: String,

    /// MySQL type string (e.g. "VARCHAR(50)", "DECIMAL(19,4)").
    pub sql_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column auto-increments.
    pub auto_increment: bool,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Warning for lossy or fallback mappings, surfaced in the table
    /// outcome; never a fatal error.
    pub warning: Option<String>,
}

/// Map a source column descriptor to a MySQL column definition.
///
/// Pure function: same input always yields the same output. Unknown native
/// types fall back to TEXT with a warning.
pub fn map_column(col: &ColumnDescriptor) -> TargetColumn {
    let mut warning = None;
    let mut auto_increment = false;
    let mut is_primary_key = col.is_primary_key;

    let sql_type = match &col.native_type {
        NativeType::Counter => {
            auto_increment = true;
            is_primary_key = true;
            "INT".to_string()
        }
        NativeType::Long => "INT".to_string(),
        NativeType::Short => "SMALLINT".to_string(),
        NativeType::Byte => "TINYINT".to_string(),
        NativeType::Single => "FLOAT".to_string(),
        NativeType::Double => "DOUBLE".to_string(),
        NativeType::Currency => "DECIMAL(19,4)".to_string(),
        NativeType::DateTime => "DATETIME".to_string(),
        NativeType::Bit => "BOOLEAN".to_string(),
        NativeType::Text => {
            if col.declared_size >= 1 && col.declared_size <= VARCHAR_LIMIT {
                format!("VARCHAR({})", col.declared_size)
            } else {
                "TEXT".to_string()
            }
        }
        NativeType::Memo => "TEXT".to_string(),
        NativeType::LongBinary => "LONGBLOB".to_string(),
        NativeType::Binary => {
            let size = if col.declared_size == 0 {
                VARBINARY_CAP
            } else {
                col.declared_size.min(VARBINARY_CAP)
            };
            if col.declared_size > VARBINARY_CAP {
                warning = Some(format!(
                    "binary column declared {} bytes, capped at {} (data beyond the cap is truncated)",
                    col.declared_size, VARBINARY_CAP
                ));
            }
            format!("VARBINARY({})", size)
        }
        NativeType::Other(name) => {
            warn!(
                "Unknown source type '{}' for column '{}', mapping to TEXT",
                name, col.name
            );
            warning = Some(format!("unknown source type '{}' mapped to TEXT", name));
            "TEXT".to_string()
        }
    };

    // Key columns must be NOT NULL regardless of what the source declares.
    let is_nullable = col.is_nullable && !is_primary_key;

    TargetColumn {
        name: col.name.clone(),
        sql_type,
        is_nullable,
        auto_increment,
        is_primary_key,
        warning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(native: NativeType, size: u32) -> ColumnDescriptor {
        ColumnDescriptor {
            name: "c".to_string(),
            native_type: native,
            declared_size: size,
            is_nullable: true,
            is_primary_key: false,
        }
    }

    #[test]
    fn test_integer_types() {
        assert_eq!(map_column(&col(NativeType::Long, 0)).sql_type, "INT");
        assert_eq!(map_column(&col(NativeType::Short, 0)).sql_type, "SMALLINT");
        assert_eq!(map_column(&col(NativeType::Byte, 0)).sql_type, "TINYINT");
    }

    #[test]
    fn test_counter_is_auto_increment_key() {
        let mapped = map_column(&col(NativeType::Counter, 0));
        assert_eq!(mapped.sql_type, "INT");
        assert!(mapped.auto_increment);
        assert!(mapped.is_primary_key);
        assert!(!mapped.is_nullable);
    }

    #[test]
    fn test_float_types() {
        assert_eq!(map_column(&col(NativeType::Single, 0)).sql_type, "FLOAT");
        assert_eq!(map_column(&col(NativeType::Double, 0)).sql_type, "DOUBLE");
    }

    #[test]
    fn test_currency_preserves_scale() {
        assert_eq!(
            map_column(&col(NativeType::Currency, 0)).sql_type,
            "DECIMAL(19,4)"
        );
    }

    #[test]
    fn test_text_size_branches() {
        assert_eq!(map_column(&col(NativeType::Text, 50)).sql_type, "VARCHAR(50)");
        assert_eq!(map_column(&col(NativeType::Text, 255)).sql_type, "VARCHAR(255)");
        assert_eq!(map_column(&col(NativeType::Text, 256)).sql_type, "TEXT");
        assert_eq!(map_column(&col(NativeType::Text, 0)).sql_type, "TEXT");
        assert_eq!(map_column(&col(NativeType::Memo, 0)).sql_type, "TEXT");
    }

    #[test]
    fn test_binary_cap_is_lossy_not_fatal() {
        let ok = map_column(&col(NativeType::Binary, 100));
        assert_eq!(ok.sql_type, "VARBINARY(100)");
        assert!(ok.warning.is_none());

        let capped = map_column(&col(NativeType::Binary, 1000));
        assert_eq!(capped.sql_type, "VARBINARY(255)");
        assert!(capped.warning.is_some());

        assert_eq!(
            map_column(&col(NativeType::LongBinary, 0)).sql_type,
            "LONGBLOB"
        );
    }

    #[test]
    fn test_unknown_type_falls_back_to_text() {
        let mapped = map_column(&col(NativeType::Other("GUID".into()), 0));
        assert_eq!(mapped.sql_type, "TEXT");
        assert!(mapped.warning.unwrap().contains("GUID"));
    }

    #[test]
    fn test_deterministic() {
        let c = col(NativeType::Text, 80);
        assert_eq!(map_column(&c), map_column(&c));
    }

    #[test]
    fn test_datetime_and_bool() {
        assert_eq!(map_column(&col(NativeType::DateTime, 0)).sql_type, "DATETIME");
        assert_eq!(map_column(&col(NativeType::Bit, 0)).sql_type, "BOOLEAN");
    }
}
