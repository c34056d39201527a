//! Target database implementations.

mod mysql;

pub use mysql::MysqlTarget;
