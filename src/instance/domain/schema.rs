//! Schema snapshots read from an instance and the cached table metadata
//! derived from them.

use super::{DatabaseId, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Column name.
    pub name: String,
    /// One-based ordinal position.
    pub position: u32,
    /// Default value expression, if any.
    pub default: Option<String>,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
    /// Full column type, for example `varchar(255)`.
    pub column_type: String,
    /// Character set for textual columns.
    pub character_set: Option<String>,
    /// Collation for textual columns.
    pub collation: Option<String>,
    /// Column comment.
    pub comment: String,
}

/// One column entry of an index.
///
/// Multi-column indexes are represented by one entry per column sharing
/// the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Index name.
    pub name: String,
    /// Indexed column or expression.
    pub expression: String,
    /// One-based position of this entry within the index.
    pub position: u32,
    /// Index method, for example `BTREE`.
    pub index_type: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Index comment.
    pub comment: String,
}

/// Table-level metadata as reported by the instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// Table name.
    pub name: String,
    /// Table type, for example `BASE TABLE` or `VIEW`.
    pub table_type: String,
    /// Storage engine.
    pub engine: String,
    /// Default collation.
    pub collation: String,
    /// Estimated row count.
    pub row_count: i64,
    /// Data length in bytes.
    pub data_size: i64,
    /// Index length in bytes.
    pub index_size: i64,
    /// Allocated but unused bytes.
    pub data_free: i64,
    /// Extra table options.
    pub create_options: String,
    /// Table comment.
    pub comment: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnMetadata>,
    /// Index entries ordered by index name and position.
    pub indexes: Vec<IndexMetadata>,
}

/// Snapshot of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Database name.
    pub name: String,
    /// Default character set.
    pub character_set: Option<String>,
    /// Default collation.
    pub collation: Option<String>,
    /// Tables in name order.
    pub tables: Vec<TableMetadata>,
}

/// Snapshot of every user database on an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSchema {
    /// Databases in name order.
    pub databases: Vec<DatabaseSchema>,
}

/// Cached table metadata owned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Owning database.
    pub database_id: DatabaseId,
    /// Metadata from the latest successful sync.
    pub metadata: TableMetadata,
    /// Outcome of the latest sync touching this table.
    pub sync_status: SyncStatus,
    /// When the table was last refreshed.
    pub last_successful_sync_at: DateTime<Utc>,
}

impl Table {
    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
