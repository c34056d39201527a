//! Identifier sanitization and quoting for MySQL.
//!
//! Access places almost no restrictions on table and column names (spaces,
//! punctuation, leading digits all occur in the wild), so every source name
//! is rewritten into a safe MySQL identifier before any DDL or DML is built.
//!
//! SQL identifiers cannot be passed as parameters in prepared statements,
//! so dynamic SQL quotes them with backticks and escapes embedded backticks
//! by doubling.

/// Maximum identifier length accepted by MySQL.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// MySQL reserved words that commonly collide with Access column names.
///
/// A sanitized name matching one of these case-insensitively gets a trailing
/// underscore appended. The list covers the words that can actually appear
/// as bare column references in the generated statements; exotic reserved
/// words are already neutralized by backtick quoting, the rename exists so
/// downstream consumers can address columns without quoting.
const RESERVED_WORDS: &[&str] = &[
    "add", "all", "alter", "and", "as", "asc", "between", "by", "case", "check", "column",
    "create", "database", "default", "delete", "desc", "distinct", "drop", "else", "exists",
    "false", "from", "group", "having", "in", "index", "insert", "int", "integer", "interval",
    "into", "is", "join", "key", "keys", "like", "limit", "long", "match", "not", "null", "on",
    "or", "order", "primary", "range", "rank", "references", "select", "set", "table", "then",
    "to", "true", "union", "unique", "update", "values", "when", "where",
];

/// Sanitize a source name (database, table or column) for MySQL.
///
/// - every non-word character becomes `_`
/// - a leading digit gets a `db_` prefix
/// - the result is lowercased and capped at 64 characters
/// - a case-insensitive match against a reserved word gets `_` appended
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out = format!("db_{}", out);
    }
    if out.is_empty() {
        out = "unnamed".to_string();
    }

    // Char-wise cap: source names may contain multi-byte letters.
    let out: String = out
        .to_lowercase()
        .chars()
        .take(MAX_IDENTIFIER_LENGTH - 1)
        .collect();

    if RESERVED_WORDS.contains(&out.as_str()) {
        format!("{}_", out)
    } else {
        out
    }
}

/// Quote a MySQL identifier.
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Qualify a table name with its database, quoting both parts.
pub fn qualify(database: &str, table: &str) -> String {
    format!("{}.{}", quote(database), quote(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_punctuation() {
        assert_eq!(sanitize("Order Details"), "order_details");
        assert_eq!(sanitize("Unit-Price ($)"), "unit_price____");
    }

    #[test]
    fn test_sanitize_leading_digit() {
        assert_eq!(sanitize("2024 Sales"), "db_2024_sales");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(200);
        assert!(sanitize(&long).len() < MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_sanitize_reserved_word() {
        assert_eq!(sanitize("Order"), "order_");
        assert_eq!(sanitize("KEY"), "key_");
        assert_eq!(sanitize("orders"), "orders");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize(""), "unnamed");
    }

    #[test]
    fn test_quote_escapes_backticks() {
        assert_eq!(quote("name"), "`name`");
        assert_eq!(quote("ta`ble"), "`ta``ble`");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("northwind", "orders"), "`northwind`.`orders`");
    }
}
