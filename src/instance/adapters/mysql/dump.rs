//! Produces replayable dumps of a single database.
//!
//! Output order is tables with their rows, then views, routines, and
//! triggers. Routine and trigger bodies are wrapped in `DELIMITER ;;` blocks
//! so the restore interpreter keeps them whole. Row values never span lines:
//! line breaks inside quoted values are written as `\n` and `\r` escapes,
//! because the interpreter splits statements at line ends.

use super::quote_identifier;
use crate::instance::ports::{DriverError, DriverResult};
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Executor, Row};

const OBJECTS_QUERY: &str = "SELECT CAST(TABLE_NAME AS CHAR) AS name, \
     CAST(TABLE_TYPE AS CHAR) AS table_type \
     FROM information_schema.TABLES WHERE TABLE_SCHEMA = ? ORDER BY TABLE_TYPE, TABLE_NAME";
const COLUMNS_QUERY: &str = "SELECT CAST(COLUMN_NAME AS CHAR) AS name, \
     CAST(DATA_TYPE AS CHAR) AS data_type \
     FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";
const ROUTINES_QUERY: &str = "SELECT CAST(ROUTINE_NAME AS CHAR) AS name, \
     CAST(ROUTINE_TYPE AS CHAR) AS routine_type \
     FROM information_schema.ROUTINES WHERE ROUTINE_SCHEMA = ? ORDER BY ROUTINE_NAME";
const TRIGGERS_QUERY: &str = "SELECT CAST(TRIGGER_NAME AS CHAR) AS name \
     FROM information_schema.TRIGGERS WHERE TRIGGER_SCHEMA = ? ORDER BY TRIGGER_NAME";

/// Column types dumped as hexadecimal literals instead of quoted text.
const BINARY_TYPES: [&str; 7] = [
    "binary",
    "varbinary",
    "tinyblob",
    "blob",
    "mediumblob",
    "longblob",
    "bit",
];

/// Column name and `information_schema` data type.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DumpColumn {
    name: String,
    data_type: String,
}

pub(super) async fn dump_database(
    connection: &mut MySqlConnection,
    database: &str,
) -> DriverResult<String> {
    let mut out = header(database);

    let objects = sqlx::query(OBJECTS_QUERY)
        .bind(database)
        .fetch_all(&mut *connection)
        .await
        .map_err(|err| DriverError::query(OBJECTS_QUERY, err))?;
    for object in &objects {
        let name = text(object, "name", OBJECTS_QUERY)?;
        let table_type = text(object, "table_type", OBJECTS_QUERY)?;
        if table_type == "VIEW" {
            let create = show_create(connection, "VIEW", &name, 1).await?;
            push_view(&mut out, &name, &create);
        } else {
            dump_table(connection, database, &name, &mut out).await?;
        }
    }

    let routines = sqlx::query(ROUTINES_QUERY)
        .bind(database)
        .fetch_all(&mut *connection)
        .await
        .map_err(|err| DriverError::query(ROUTINES_QUERY, err))?;
    for routine in &routines {
        let name = text(routine, "name", ROUTINES_QUERY)?;
        let kind = text(routine, "routine_type", ROUTINES_QUERY)?;
        let body = show_create(connection, &kind, &name, 2).await?;
        push_compound(&mut out, &kind, &name, &body);
    }

    let triggers = sqlx::query(TRIGGERS_QUERY)
        .bind(database)
        .fetch_all(&mut *connection)
        .await
        .map_err(|err| DriverError::query(TRIGGERS_QUERY, err))?;
    for trigger in &triggers {
        let name = text(trigger, "name", TRIGGERS_QUERY)?;
        let body = show_create(connection, "TRIGGER", &name, 2).await?;
        push_compound(&mut out, "TRIGGER", &name, &body);
    }

    out.push_str(FOOTER);
    Ok(out)
}

async fn dump_table(
    connection: &mut MySqlConnection,
    database: &str,
    table: &str,
    out: &mut String,
) -> DriverResult<()> {
    let create = show_create(connection, "TABLE", table, 1).await?;
    push_table(out, table, &create);

    let columns = sqlx::query(COLUMNS_QUERY)
        .bind(database)
        .bind(table)
        .fetch_all(&mut *connection)
        .await
        .map_err(|err| DriverError::query(COLUMNS_QUERY, err))?
        .iter()
        .map(|row| {
            Ok(DumpColumn {
                name: text(row, "name", COLUMNS_QUERY)?,
                data_type: text(row, "data_type", COLUMNS_QUERY)?,
            })
        })
        .collect::<DriverResult<Vec<_>>>()?;
    let Some(select) = rows_query(table, &columns) else {
        return Ok(());
    };

    let rows = (&mut *connection)
        .fetch_all(sqlx::raw_sql(&select))
        .await
        .map_err(|err| DriverError::query(&select, err))?;
    for row in &rows {
        let values: String = row
            .try_get(0)
            .map_err(|err| DriverError::query(&select, err))?;
        out.push_str(&insert_statement(table, &values));
    }
    Ok(())
}

async fn show_create(
    connection: &mut MySqlConnection,
    kind: &str,
    name: &str,
    column: usize,
) -> DriverResult<String> {
    let statement = format!("SHOW CREATE {kind} {}", quote_identifier(name));
    let row = (&mut *connection)
        .fetch_one(sqlx::raw_sql(&statement))
        .await
        .map_err(|err| DriverError::query(&statement, err))?;
    let body: Option<String> = row
        .try_get(column)
        .map_err(|err| DriverError::query(&statement, err))?;
    body.ok_or_else(|| {
        DriverError::query(&statement, "definition is hidden; the login lacks privileges")
    })
}

const FOOTER: &str = "SET FOREIGN_KEY_CHECKS=1;\n";

fn header(database: &str) -> String {
    format!(
        "-- Dump of database {}\nSET FOREIGN_KEY_CHECKS=0;\n",
        quote_identifier(database)
    )
}

/// SQL expression rendering one column as a literal for an `INSERT`.
///
/// `QUOTE` yields `NULL` unquoted for null values. Binary columns become
/// `X'..'` hex literals so arbitrary bytes survive the text round trip.
fn value_expression(column: &DumpColumn) -> String {
    let quoted = quote_identifier(&column.name);
    if BINARY_TYPES.contains(&column.data_type.to_ascii_lowercase().as_str()) {
        format!("IF({quoted} IS NULL, 'NULL', CONCAT('X''', HEX({quoted}), ''''))")
    } else {
        format!("QUOTE({quoted})")
    }
}

/// Query returning one row per table row, each a comma-separated literal
/// list; `None` for a table without columns.
fn rows_query(table: &str, columns: &[DumpColumn]) -> Option<String> {
    if columns.is_empty() {
        return None;
    }
    let values = columns
        .iter()
        .map(value_expression)
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!(
        "SELECT CAST(CONCAT_WS(', ', {values}) AS CHAR) FROM {}",
        quote_identifier(table)
    ))
}

/// One-line `INSERT` for a row rendered by [`rows_query`].
fn insert_statement(table: &str, values: &str) -> String {
    format!(
        "INSERT INTO {} VALUES ({});\n",
        quote_identifier(table),
        single_line(values)
    )
}

fn push_table(out: &mut String, table: &str, create: &str) {
    let quoted = quote_identifier(table);
    out.push_str(&format!("\n-- Table {quoted}\n"));
    out.push_str(&format!("DROP TABLE IF EXISTS {quoted};\n{create};\n"));
}

fn push_view(out: &mut String, name: &str, create: &str) {
    out.push_str(&format!("\n-- View {}\n", quote_identifier(name)));
    out.push_str(&format!("{};\n", single_line(create)));
}

fn push_compound(out: &mut String, kind: &str, name: &str, body: &str) {
    out.push_str(&format!("\n-- {kind} {}\n", quote_identifier(name)));
    out.push_str("DELIMITER ;;\n");
    out.push_str(body);
    out.push_str(" ;;\nDELIMITER ;\n");
}

/// Replaces raw line breaks with their escaped forms.
///
/// Only valid for text whose line breaks sit inside quoted literals, as
/// in `QUOTE` output and canonical view definitions.
fn single_line(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

fn text(row: &MySqlRow, column: &str, sql: &str) -> DriverResult<String> {
    row.try_get::<String, _>(column)
        .map_err(|err| DriverError::query(sql, err))
}

#[cfg(test)]
mod tests {
    //! Dump text checks, replayed through the script interpreter.

    use super::{
        DumpColumn, FOOTER, header, insert_statement, push_compound, push_table, push_view,
        rows_query, value_expression,
    };
    use crate::script::{ReplayReport, ScriptConnection, StatementError, replay_script};
    use async_trait::async_trait;
    use rstest::rstest;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Recorder {
        statements: Vec<String>,
    }

    #[async_trait]
    impl ScriptConnection for Recorder {
        async fn execute(&mut self, statement: &str) -> Result<(), StatementError> {
            self.statements.push(statement.to_owned());
            Ok(())
        }
    }

    async fn replay(script: &str) -> (Vec<String>, ReplayReport) {
        let mut recorder = Recorder::default();
        let report = replay_script(script, &mut recorder, &CancellationToken::new())
            .await
            .expect("dump text should replay");
        (recorder.statements, report)
    }

    fn column(name: &str, data_type: &str) -> DumpColumn {
        DumpColumn {
            name: name.to_owned(),
            data_type: data_type.to_owned(),
        }
    }

    #[rstest]
    #[case("1, 'first;\nsecond'", "INSERT INTO `t` VALUES (1, 'first;\\nsecond');\n")]
    #[case(
        "2, 'note\n-- not a comment'",
        "INSERT INTO `t` VALUES (2, 'note\\n-- not a comment');\n"
    )]
    #[case("3, 'dos\r\nline'", "INSERT INTO `t` VALUES (3, 'dos\\r\\nline');\n")]
    #[case("4, NULL, X'00FF'", "INSERT INTO `t` VALUES (4, NULL, X'00FF');\n")]
    #[tokio::test(flavor = "multi_thread")]
    async fn multi_line_values_replay_as_one_insert(
        #[case] values: &str,
        #[case] expected: &str,
    ) {
        let (statements, report) = replay(&insert_statement("t", values)).await;

        assert_eq!(statements, vec![expected.to_owned()]);
        assert_eq!(report.unterminated, None);
    }

    #[rstest]
    #[case("varchar", "QUOTE(`note`)")]
    #[case("longtext", "QUOTE(`note`)")]
    #[case("BLOB", "IF(`note` IS NULL, 'NULL', CONCAT('X''', HEX(`note`), ''''))")]
    #[case("varbinary", "IF(`note` IS NULL, 'NULL', CONCAT('X''', HEX(`note`), ''''))")]
    fn binary_columns_are_hex_encoded(#[case] data_type: &str, #[case] expected: &str) {
        assert_eq!(value_expression(&column("note", data_type)), expected);
    }

    #[rstest]
    fn rows_query_lists_every_column_in_order() {
        let query = rows_query("orders", &[column("id", "int"), column("raw", "blob")]);

        assert_eq!(
            query.as_deref(),
            Some(
                "SELECT CAST(CONCAT_WS(', ', QUOTE(`id`), \
                 IF(`raw` IS NULL, 'NULL', CONCAT('X''', HEX(`raw`), ''''))) AS CHAR) \
                 FROM `orders`"
            )
        );
        assert_eq!(rows_query("orders", &[]), None);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread")]
    async fn full_dump_replays_statement_for_statement() {
        let create_table = "CREATE TABLE `orders` (\n  \
                            `id` int NOT NULL,\n  \
                            `note` varchar(32) DEFAULT 'a;b',\n  \
                            PRIMARY KEY (`id`)\n\
                            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";
        let trigger = "CREATE TRIGGER `stamp` BEFORE INSERT ON `orders` FOR EACH ROW BEGIN\n\
                       SET NEW.note = 'x';\n\
                       END";
        let mut dump = header("shop");
        push_table(&mut dump, "orders", create_table);
        dump.push_str(&insert_statement("orders", "1, 'line one;\nline two'"));
        dump.push_str(&insert_statement("orders", "2, NULL"));
        push_view(
            &mut dump,
            "recent",
            "CREATE VIEW `recent` AS select 'a\nb' AS `label`",
        );
        push_compound(&mut dump, "TRIGGER", "stamp", trigger);
        dump.push_str(FOOTER);

        let (statements, report) = replay(&dump).await;

        assert_eq!(
            statements,
            vec![
                "SET FOREIGN_KEY_CHECKS=0;\n".to_owned(),
                "DROP TABLE IF EXISTS `orders`;\n".to_owned(),
                format!("{create_table};\n"),
                "INSERT INTO `orders` VALUES (1, 'line one;\\nline two');\n".to_owned(),
                "INSERT INTO `orders` VALUES (2, NULL);\n".to_owned(),
                "CREATE VIEW `recent` AS select 'a\\nb' AS `label`;\n".to_owned(),
                format!("{trigger} ;;\n"),
                "SET FOREIGN_KEY_CHECKS=1;\n".to_owned(),
            ]
        );
        assert_eq!(report.unterminated, None);
    }
}
