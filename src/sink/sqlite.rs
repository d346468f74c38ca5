//! [`SqliteSink`]: a [`Sink`] backed by a single SQLite file.
//!
//! Merges run as one `CREATE TABLE ... AS SELECT` statement rendered by
//! [`MergePlan::to_sql`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};

use crate::merge::{quote_ident, MergePlan};
use crate::record::{Row, Value};
use crate::schema::{Column, ColumnType};
use crate::sink::Sink;
use crate::{Error, Result};

const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
";

pub struct SqliteSink {
    conn: Mutex<Connection>,
}

impl SqliteSink {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(PRAGMAS)?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(SqliteSink {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Float(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
        }))
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn ensure_table_locked(conn: &Connection, name: &str, schema: &[Column]) -> Result<()> {
    let existing = table_columns(conn, name)?;
    if existing.is_empty() {
        if schema.is_empty() {
            return Ok(());
        }
        let columns = schema
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.ty.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({columns})",
            quote_ident(name)
        ))?;
        return Ok(());
    }
    // SQLite column names are case-insensitive.
    for column in schema {
        match existing.iter().find(|e| e.eq_ignore_ascii_case(&column.name)) {
            Some(e) if *e == column.name => {}
            Some(e) => tracing::warn!(
                table = name,
                column = %column.name,
                existing = %e,
                "column differs from an existing column only by case; values share one column"
            ),
            None => conn.execute_batch(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(name),
                quote_ident(&column.name),
                column.ty.sql()
            ))?,
        }
    }
    Ok(())
}

fn inferred_columns(rows: &[Row]) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    for row in rows {
        for (key, value) in row {
            if columns.iter().any(|c| &c.name == key) {
                continue;
            }
            let ty = match value {
                Value::Integer(_) => ColumnType::Integer,
                Value::Float(_) => ColumnType::Float,
                Value::Null | Value::Text(_) => ColumnType::String,
            };
            columns.push(Column::new(key.clone(), ty));
        }
    }
    columns
}

fn insert_sql(table: &str, row: &Row) -> String {
    let names = row.keys().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ");
    let params = (1..=row.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {} ({names}) VALUES ({params})", quote_ident(table))
}

impl Sink for SqliteSink {
    fn ensure_table(&self, name: &str, schema: &[Column]) -> Result<()> {
        let conn = self.lock();
        ensure_table_locked(&conn, name, schema)
    }

    fn append_rows(&self, name: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock();
        ensure_table_locked(&conn, name, &inferred_columns(rows))?;
        let tx = conn.transaction()?;
        for row in rows {
            let mut stmt = tx.prepare_cached(&insert_sql(name, row))?;
            stmt.execute(params_from_iter(row.values()))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_tables(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names.into_iter().filter(|n| n.starts_with(prefix)).collect())
    }

    fn columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.lock();
        let columns = table_columns(&conn, table)?;
        if columns.is_empty() {
            return Err(Error::TableNotFound(table.to_owned()));
        }
        Ok(columns)
    }

    fn delete_table(&self, name: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))?;
        Ok(())
    }

    fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let conn = self.lock();
        if table_columns(&conn, from)?.is_empty() {
            return Err(Error::TableNotFound(from.to_owned()));
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(from),
            quote_ident(to)
        ))?;
        Ok(())
    }

    fn read_rows(&self, table: &str) -> Result<Vec<Row>> {
        let conn = self.lock();
        if table_columns(&conn, table)?.is_empty() {
            return Err(Error::TableNotFound(table.to_owned()));
        }
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote_ident(table)))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map([], |r| {
                let mut row = Row::new();
                for (i, name) in names.iter().enumerate() {
                    row.insert(name.clone(), value_from_ref(r.get_ref(i)?));
                }
                Ok(row)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn materialize(&self, plan: &MergePlan) -> Result<usize> {
        if plan.sources.is_empty() {
            self.delete_table(&plan.target)?;
            self.ensure_table(&plan.target, &plan.columns)?;
            return Ok(0);
        }
        let select = plan.to_sql();
        tracing::debug!(target_table = %plan.target, sql = %select, "materializing merge");

        let staging = plan.staging_table();
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&staging)))?;
        tx.execute_batch(&format!("CREATE TABLE {} AS {select}", quote_ident(&staging)))?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&plan.target)))?;
        tx.execute_batch(&format!(
            "ALTER TABLE {} RENAME TO {}",
            quote_ident(&staging),
            quote_ident(&plan.target)
        ))?;
        let count: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&plan.target)),
            [],
            |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(pairs: &[(&str, Option<&str>)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(v.map(str::to_string))))
            .collect()
    }

    #[test]
    fn test_round_trip_rows() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_table("games_x_2020-01_0001", &[Column::string("GameId"), Column::string("Event")])
            .unwrap();
        sink.append_rows(
            "games_x_2020-01_0001",
            &[
                text_row(&[("GameId", Some("a")), ("Event", Some("Blitz"))]),
                text_row(&[("GameId", Some("b")), ("Event", None)]),
            ],
        )
        .unwrap();

        let rows = sink.read_rows("games_x_2020-01_0001").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["GameId"], Value::Text("a".to_string()));
        assert!(rows[1]["Event"].is_null());
    }

    #[test]
    fn test_append_adds_new_columns() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.append_rows("t", &[text_row(&[("A", Some("1"))])]).unwrap();
        sink.append_rows("t", &[text_row(&[("A", Some("2")), ("B", Some("3"))])])
            .unwrap();
        assert_eq!(sink.columns("t").unwrap(), vec!["A", "B"]);
        let rows = sink.read_rows("t").unwrap();
        assert!(rows[0]["B"].is_null());
    }

    #[test]
    fn test_case_only_column_difference_shares_column() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_table("t", &[Column::string("FEN")]).unwrap();
        sink.ensure_table("t", &[Column::string("Fen"), Column::string("Event")])
            .unwrap();
        assert_eq!(sink.columns("t").unwrap(), vec!["FEN", "Event"]);

        sink.append_rows("t", &[text_row(&[("Fen", Some("8/8/8/8/8/8/8/8 w - - 0 1"))])])
            .unwrap();
        let rows = sink.read_rows("t").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["FEN"], Value::Text("8/8/8/8/8/8/8/8 w - - 0 1".to_string()));
    }

    #[test]
    fn test_typed_move_columns() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_table("moves_x_2020-01", &crate::schema::move_schema())
            .unwrap();
        let mut row = Row::new();
        row.insert("ply".to_string(), Value::Integer(3));
        row.insert("clock".to_string(), Value::Float(29.5));
        sink.append_rows("moves_x_2020-01", &[row]).unwrap();
        let rows = sink.read_rows("moves_x_2020-01").unwrap();
        assert_eq!(rows[0]["ply"], Value::Integer(3));
        assert_eq!(rows[0]["clock"], Value::Float(29.5));
        assert!(rows[0]["san"].is_null());
    }

    #[test]
    fn test_list_and_delete() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.ensure_table("games_a_2020-01_0002", &[Column::string("GameId")])
            .unwrap();
        sink.ensure_table("games_a_2020-01_0001", &[Column::string("GameId")])
            .unwrap();
        sink.ensure_table("moves_a_2020-01", &[Column::string("game_id")])
            .unwrap();
        assert_eq!(
            sink.list_tables("games_").unwrap(),
            vec!["games_a_2020-01_0001", "games_a_2020-01_0002"]
        );
        sink.delete_table("games_a_2020-01_0001").unwrap();
        sink.delete_table("games_a_2020-01_0001").unwrap();
        assert_eq!(sink.list_tables("games_").unwrap().len(), 1);
        assert!(matches!(
            sink.columns("games_a_2020-01_0001"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_rename_table() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.append_rows("games_a_2020-01__merge", &[text_row(&[("GameId", Some("a"))])])
            .unwrap();
        sink.rename_table("games_a_2020-01__merge", "games_a_2020-01").unwrap();
        assert_eq!(sink.list_tables("games_").unwrap(), vec!["games_a_2020-01"]);
        assert!(matches!(
            sink.rename_table("missing", "other"),
            Err(Error::TableNotFound(_))
        ));
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lichess.db");
        {
            let sink = SqliteSink::open(&path).unwrap();
            sink.append_rows("t", &[text_row(&[("A", Some("1"))])]).unwrap();
        }
        let sink = SqliteSink::open(&path).unwrap();
        assert_eq!(sink.read_rows("t").unwrap().len(), 1);
    }
}
