//! Tagged value types for database-agnostic row transfer.
//!
//! Source readers produce [`SqlValue`]s from this closed set and the target
//! writer consumes them uniformly, so column values never carry
//! driver-specific types across the pipeline.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::catalog::NativeType;

/// A single column value in transit.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (covers BYTE through LONG).
    Int(i64),

    /// Floating point (SINGLE and DOUBLE).
    Float(f64),

    /// Fixed-point decimal (CURRENCY).
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Approximate wire size in bytes, used for throughput accounting.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        match self {
            SqlValue::Null => 1,
            SqlValue::Bool(_) => 1,
            SqlValue::Int(_) => 8,
            SqlValue::Float(_) => 8,
            SqlValue::Decimal(_) => 16,
            SqlValue::Text(s) => s.len(),
            SqlValue::DateTime(_) => 8,
            SqlValue::Bytes(b) => b.len(),
        }
    }

    /// Convert a raw text value (as fetched from a text-mode ODBC buffer or
    /// a CSV field) into the tag matching the column's native type.
    ///
    /// Unparseable values degrade to `Text` rather than failing the row;
    /// exact binary fidelity of exotic source types is a non-goal.
    pub fn from_text(raw: Option<String>, native: &NativeType) -> SqlValue {
        let Some(raw) = raw else {
            return SqlValue::Null;
        };
        if raw.is_empty() && !matches!(native, NativeType::Text | NativeType::Memo) {
            return SqlValue::Null;
        }

        match native {
            NativeType::Counter | NativeType::Long | NativeType::Short | NativeType::Byte => raw
                .trim()
                .parse::<i64>()
                .map(SqlValue::Int)
                .unwrap_or(SqlValue::Text(raw)),
            NativeType::Single | NativeType::Double => raw
                .trim()
                .parse::<f64>()
                .map(SqlValue::Float)
                .unwrap_or(SqlValue::Text(raw)),
            NativeType::Currency => raw
                .trim()
                .parse::<Decimal>()
                .map(SqlValue::Decimal)
                .unwrap_or(SqlValue::Text(raw)),
            NativeType::Bit => match raw.trim() {
                "1" | "-1" | "true" | "True" | "TRUE" | "yes" | "Yes" => SqlValue::Bool(true),
                "0" | "false" | "False" | "FALSE" | "no" | "No" => SqlValue::Bool(false),
                _ => SqlValue::Text(raw),
            },
            NativeType::DateTime => parse_datetime(raw.trim())
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Text(raw)),
            NativeType::LongBinary | NativeType::Binary => SqlValue::Bytes(raw.into_bytes()),
            NativeType::Text | NativeType::Memo | NativeType::Other(_) => SqlValue::Text(raw),
        }
    }
}

/// Parse the date-time formats the Jet engine and CSV exports produce.
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%y %H:%M:%S",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    // Bare dates come through without a time component
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// A bounded batch of rows moved in one transfer step.
///
/// Never persisted; lives from the source read to the target write. Bounded
/// channels of `RowChunk`s cap peak memory regardless of table size.
#[derive(Debug)]
pub struct RowChunk {
    /// Rows in source natural order.
    pub rows: Vec<Vec<SqlValue>>,

    /// Number of rows the source yielded before this chunk (resume cursor).
    pub offset: u64,

    /// Whether this is the final chunk for the table.
    pub is_last: bool,
}

impl RowChunk {
    /// Get the number of rows in this chunk.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_integers() {
        assert_eq!(
            SqlValue::from_text(Some("42".into()), &NativeType::Long),
            SqlValue::Int(42)
        );
        assert_eq!(
            SqlValue::from_text(Some(" 7 ".into()), &NativeType::Byte),
            SqlValue::Int(7)
        );
        assert_eq!(SqlValue::from_text(None, &NativeType::Long), SqlValue::Null);
    }

    #[test]
    fn test_from_text_bool() {
        // Jet represents True as -1
        assert_eq!(
            SqlValue::from_text(Some("-1".into()), &NativeType::Bit),
            SqlValue::Bool(true)
        );
        assert_eq!(
            SqlValue::from_text(Some("0".into()), &NativeType::Bit),
            SqlValue::Bool(false)
        );
    }

    #[test]
    fn test_from_text_currency() {
        assert_eq!(
            SqlValue::from_text(Some("19.9500".into()), &NativeType::Currency),
            SqlValue::Decimal("19.9500".parse().unwrap())
        );
    }

    #[test]
    fn test_from_text_datetime_formats() {
        for raw in ["2024-03-01 10:30:00", "03/01/2024 10:30:00"] {
            let v = SqlValue::from_text(Some(raw.into()), &NativeType::DateTime);
            assert!(matches!(v, SqlValue::DateTime(_)), "failed for {}", raw);
        }
        let date_only = SqlValue::from_text(Some("2024-03-01".into()), &NativeType::DateTime);
        assert!(matches!(date_only, SqlValue::DateTime(_)));
    }

    #[test]
    fn test_from_text_unparseable_degrades_to_text() {
        assert_eq!(
            SqlValue::from_text(Some("n/a".into()), &NativeType::Long),
            SqlValue::Text("n/a".into())
        );
    }

    #[test]
    fn test_empty_text_stays_text_but_empty_number_is_null() {
        assert_eq!(
            SqlValue::from_text(Some("".into()), &NativeType::Text),
            SqlValue::Text("".into())
        );
        assert_eq!(
            SqlValue::from_text(Some("".into()), &NativeType::Long),
            SqlValue::Null
        );
    }

    #[test]
    fn test_estimated_size() {
        assert_eq!(SqlValue::Text("abcd".into()).estimated_size(), 4);
        assert_eq!(SqlValue::Int(1).estimated_size(), 8);
    }
}
