//! `MySQL`-protocol driver built on `sqlx`.
//!
//! Serves both `MySQL` and `TiDB` instances. Connections are opened per
//! operation; the schema syncer and executors never share one.

mod driver;
mod dump;
mod introspect;

pub use driver::MySqlDriver;

/// Databases that belong to the server rather than to users.
const SYSTEM_DATABASES: &str = "('information_schema', 'mysql', 'performance_schema', 'sys')";

/// Quotes an identifier with backticks, doubling embedded backticks.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
