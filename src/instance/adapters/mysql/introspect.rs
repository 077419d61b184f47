//! Reads schema snapshots from `information_schema`.

use super::SYSTEM_DATABASES;
use crate::instance::{
    domain::{ColumnMetadata, DatabaseSchema, IndexMetadata, InstanceSchema, TableMetadata},
    ports::{DriverError, DriverResult},
};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::Row;
use std::collections::BTreeMap;

type TableKey = (String, String);

pub(super) async fn fetch_schema(connection: &mut MySqlConnection) -> DriverResult<InstanceSchema> {
    let databases_sql = format!(
        "SELECT CAST(SCHEMA_NAME AS CHAR) AS name, \
         CAST(DEFAULT_CHARACTER_SET_NAME AS CHAR) AS character_set, \
         CAST(DEFAULT_COLLATION_NAME AS CHAR) AS collation_name \
         FROM information_schema.SCHEMATA \
         WHERE SCHEMA_NAME NOT IN {SYSTEM_DATABASES} ORDER BY SCHEMA_NAME"
    );
    let tables_sql = format!(
        "SELECT CAST(TABLE_SCHEMA AS CHAR) AS db, CAST(TABLE_NAME AS CHAR) AS name, \
         CAST(TABLE_TYPE AS CHAR) AS table_type, CAST(IFNULL(ENGINE, '') AS CHAR) AS engine, \
         CAST(IFNULL(TABLE_COLLATION, '') AS CHAR) AS collation_name, \
         CAST(IFNULL(TABLE_ROWS, 0) AS SIGNED) AS row_count, \
         CAST(IFNULL(DATA_LENGTH, 0) AS SIGNED) AS data_size, \
         CAST(IFNULL(INDEX_LENGTH, 0) AS SIGNED) AS index_size, \
         CAST(IFNULL(DATA_FREE, 0) AS SIGNED) AS data_free, \
         CAST(IFNULL(CREATE_OPTIONS, '') AS CHAR) AS create_options, \
         CAST(IFNULL(TABLE_COMMENT, '') AS CHAR) AS comment \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA NOT IN {SYSTEM_DATABASES} ORDER BY TABLE_SCHEMA, TABLE_NAME"
    );
    let columns_sql = format!(
        "SELECT CAST(TABLE_SCHEMA AS CHAR) AS db, CAST(TABLE_NAME AS CHAR) AS table_name, \
         CAST(COLUMN_NAME AS CHAR) AS name, CAST(ORDINAL_POSITION AS SIGNED) AS position, \
         CAST(COLUMN_DEFAULT AS CHAR) AS column_default, CAST(IS_NULLABLE AS CHAR) AS nullable, \
         CAST(COLUMN_TYPE AS CHAR) AS column_type, \
         CAST(CHARACTER_SET_NAME AS CHAR) AS character_set, \
         CAST(COLLATION_NAME AS CHAR) AS collation_name, \
         CAST(IFNULL(COLUMN_COMMENT, '') AS CHAR) AS comment \
         FROM information_schema.COLUMNS \
         WHERE TABLE_SCHEMA NOT IN {SYSTEM_DATABASES} \
         ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION"
    );
    let indexes_sql = format!(
        "SELECT CAST(TABLE_SCHEMA AS CHAR) AS db, CAST(TABLE_NAME AS CHAR) AS table_name, \
         CAST(INDEX_NAME AS CHAR) AS name, CAST(IFNULL(COLUMN_NAME, '') AS CHAR) AS expression, \
         CAST(SEQ_IN_INDEX AS SIGNED) AS position, CAST(INDEX_TYPE AS CHAR) AS index_type, \
         CAST(NON_UNIQUE AS SIGNED) AS non_unique, \
         CAST(IFNULL(INDEX_COMMENT, '') AS CHAR) AS comment \
         FROM information_schema.STATISTICS \
         WHERE TABLE_SCHEMA NOT IN {SYSTEM_DATABASES} \
         ORDER BY TABLE_SCHEMA, TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX"
    );

    let mut databases: BTreeMap<String, DatabaseSchema> = BTreeMap::new();
    for row in fetch_all(connection, &databases_sql).await? {
        let name = get::<String>(&row, "name", &databases_sql)?;
        databases.insert(
            name.clone(),
            DatabaseSchema {
                name,
                character_set: get(&row, "character_set", &databases_sql)?,
                collation: get(&row, "collation_name", &databases_sql)?,
                tables: Vec::new(),
            },
        );
    }

    let mut tables: BTreeMap<TableKey, TableMetadata> = BTreeMap::new();
    for row in fetch_all(connection, &tables_sql).await? {
        let key = (
            get::<String>(&row, "db", &tables_sql)?,
            get::<String>(&row, "name", &tables_sql)?,
        );
        let metadata = TableMetadata {
            name: key.1.clone(),
            table_type: get(&row, "table_type", &tables_sql)?,
            engine: get(&row, "engine", &tables_sql)?,
            collation: get(&row, "collation_name", &tables_sql)?,
            row_count: get(&row, "row_count", &tables_sql)?,
            data_size: get(&row, "data_size", &tables_sql)?,
            index_size: get(&row, "index_size", &tables_sql)?,
            data_free: get(&row, "data_free", &tables_sql)?,
            create_options: get(&row, "create_options", &tables_sql)?,
            comment: get(&row, "comment", &tables_sql)?,
            columns: Vec::new(),
            indexes: Vec::new(),
        };
        tables.insert(key, metadata);
    }

    let mut columns = Vec::new();
    for row in fetch_all(connection, &columns_sql).await? {
        let key = (
            get::<String>(&row, "db", &columns_sql)?,
            get::<String>(&row, "table_name", &columns_sql)?,
        );
        let nullable: String = get(&row, "nullable", &columns_sql)?;
        let column = ColumnMetadata {
            name: get(&row, "name", &columns_sql)?,
            position: position(get(&row, "position", &columns_sql)?, &columns_sql)?,
            default: get(&row, "column_default", &columns_sql)?,
            nullable: nullable.eq_ignore_ascii_case("YES"),
            column_type: get(&row, "column_type", &columns_sql)?,
            character_set: get(&row, "character_set", &columns_sql)?,
            collation: get(&row, "collation_name", &columns_sql)?,
            comment: get(&row, "comment", &columns_sql)?,
        };
        columns.push((key, column));
    }

    let mut indexes = Vec::new();
    for row in fetch_all(connection, &indexes_sql).await? {
        let key = (
            get::<String>(&row, "db", &indexes_sql)?,
            get::<String>(&row, "table_name", &indexes_sql)?,
        );
        let non_unique: i64 = get(&row, "non_unique", &indexes_sql)?;
        let index = IndexMetadata {
            name: get(&row, "name", &indexes_sql)?,
            expression: get(&row, "expression", &indexes_sql)?,
            position: position(get(&row, "position", &indexes_sql)?, &indexes_sql)?,
            index_type: get(&row, "index_type", &indexes_sql)?,
            unique: non_unique == 0,
            comment: get(&row, "comment", &indexes_sql)?,
        };
        indexes.push((key, index));
    }

    Ok(assemble(databases, tables, columns, indexes))
}

/// Attaches columns and indexes to their tables and tables to their
/// databases.
///
/// Rows whose table or database is absent from the snapshot are dropped;
/// they belong to objects created between the individual queries.
fn assemble(
    mut databases: BTreeMap<String, DatabaseSchema>,
    mut tables: BTreeMap<TableKey, TableMetadata>,
    columns: Vec<(TableKey, ColumnMetadata)>,
    indexes: Vec<(TableKey, IndexMetadata)>,
) -> InstanceSchema {
    for (key, column) in columns {
        if let Some(table) = tables.get_mut(&key) {
            table.columns.push(column);
        }
    }
    for (key, index) in indexes {
        if let Some(table) = tables.get_mut(&key) {
            table.indexes.push(index);
        }
    }
    for ((database, _), table) in tables {
        if let Some(schema) = databases.get_mut(&database) {
            schema.tables.push(table);
        }
    }
    InstanceSchema {
        databases: databases.into_values().collect(),
    }
}

async fn fetch_all(connection: &mut MySqlConnection, sql: &str) -> DriverResult<Vec<MySqlRow>> {
    sqlx::query(sql)
        .fetch_all(connection)
        .await
        .map_err(|err| DriverError::query(sql, err))
}

fn get<T>(row: &MySqlRow, column: &str, sql: &str) -> DriverResult<T>
where
    T: for<'r> sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
{
    row.try_get::<T, _>(column)
        .map_err(|err| DriverError::query(sql, err))
}

fn position(value: i64, sql: &str) -> DriverResult<u32> {
    u32::try_from(value).map_err(|err| DriverError::query(sql, err))
}

#[cfg(test)]
mod tests {
    use super::{TableKey, assemble};
    use crate::instance::domain::{ColumnMetadata, DatabaseSchema, IndexMetadata, TableMetadata};
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn key(database: &str, table: &str) -> TableKey {
        (database.to_owned(), table.to_owned())
    }

    fn database(name: &str) -> (String, DatabaseSchema) {
        (
            name.to_owned(),
            DatabaseSchema {
                name: name.to_owned(),
                character_set: Some("utf8mb4".to_owned()),
                collation: None,
                tables: Vec::new(),
            },
        )
    }

    fn table(name: &str) -> TableMetadata {
        TableMetadata {
            name: name.to_owned(),
            table_type: "BASE TABLE".to_owned(),
            ..TableMetadata::default()
        }
    }

    fn column(name: &str, position: u32) -> ColumnMetadata {
        ColumnMetadata {
            name: name.to_owned(),
            position,
            default: None,
            nullable: true,
            column_type: "int".to_owned(),
            character_set: None,
            collation: None,
            comment: String::new(),
        }
    }

    fn index(name: &str, expression: &str, position: u32) -> IndexMetadata {
        IndexMetadata {
            name: name.to_owned(),
            expression: expression.to_owned(),
            position,
            index_type: "BTREE".to_owned(),
            unique: true,
            comment: String::new(),
        }
    }

    #[rstest]
    fn rows_are_grouped_under_their_tables_and_databases() {
        let databases = BTreeMap::from([database("shop"), database("blog")]);
        let tables = BTreeMap::from([
            (key("shop", "orders"), table("orders")),
            (key("shop", "customers"), table("customers")),
            (key("blog", "posts"), table("posts")),
        ]);
        let columns = vec![
            (key("shop", "orders"), column("id", 1)),
            (key("shop", "orders"), column("total", 2)),
            (key("blog", "posts"), column("id", 1)),
        ];
        let indexes = vec![
            (key("shop", "orders"), index("PRIMARY", "id", 1)),
            (key("shop", "orders"), index("by_total", "total", 1)),
        ];

        let schema = assemble(databases, tables, columns, indexes);

        let names: Vec<&str> = schema.databases.iter().map(|db| db.name.as_str()).collect();
        assert_eq!(names, vec!["blog", "shop"]);
        let shop = schema.databases.get(1).expect("shop snapshot");
        let table_names: Vec<&str> = shop.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(table_names, vec!["customers", "orders"]);
        let orders = shop.tables.get(1).expect("orders table");
        let column_names: Vec<&str> = orders.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(column_names, vec!["id", "total"]);
        let index_names: Vec<&str> = orders.indexes.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(index_names, vec!["PRIMARY", "by_total"]);
    }

    #[rstest]
    fn rows_for_vanished_objects_are_dropped() {
        let databases = BTreeMap::from([database("shop")]);
        let tables = BTreeMap::from([
            (key("shop", "orders"), table("orders")),
            (key("dropped", "ghost"), table("ghost")),
        ]);
        let columns = vec![
            (key("shop", "orders"), column("id", 1)),
            (key("shop", "created_later"), column("id", 1)),
        ];

        let schema = assemble(databases, tables, columns, Vec::new());

        let [shop] = schema.databases.as_slice() else {
            panic!("expected one database, got {}", schema.databases.len());
        };
        let [orders] = shop.tables.as_slice() else {
            panic!("expected one table, got {}", shop.tables.len());
        };
        assert_eq!(orders.columns, vec![column("id", 1)]);
    }
}
