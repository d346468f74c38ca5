//! In-memory [`Sink`], for tests and embedding.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::record::{Row, Value};
use crate::schema::{Column, ColumnType};
use crate::sink::Sink;
use crate::{Error, Result};

#[derive(Debug, Default, Clone)]
struct Table {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    fn add_column(&mut self, column: Column) {
        if !self.columns.iter().any(|c| c.name == column.name) {
            self.columns.push(column);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySink {
    tables: Mutex<BTreeMap<String, Table>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Table>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of rows in `table`, or `None` if it does not exist.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.lock().get(table).map(|t| t.rows.len())
    }
}

fn inferred_type(value: &Value) -> ColumnType {
    match value {
        Value::Integer(_) => ColumnType::Integer,
        Value::Float(_) => ColumnType::Float,
        Value::Null | Value::Text(_) => ColumnType::String,
    }
}

impl Sink for MemorySink {
    fn ensure_table(&self, name: &str, schema: &[Column]) -> Result<()> {
        let mut tables = self.lock();
        let table = tables.entry(name.to_owned()).or_default();
        for column in schema {
            table.add_column(column.clone());
        }
        Ok(())
    }

    fn append_rows(&self, name: &str, rows: &[Row]) -> Result<()> {
        let mut tables = self.lock();
        let table = tables.entry(name.to_owned()).or_default();
        for row in rows {
            for (key, value) in row {
                table.add_column(Column::new(key.clone(), inferred_type(value)));
            }
        }
        table.rows.extend_from_slice(rows);
        Ok(())
    }

    fn list_tables(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn columns(&self, table: &str) -> Result<Vec<String>> {
        self.lock()
            .get(table)
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .ok_or_else(|| Error::TableNotFound(table.to_owned()))
    }

    fn delete_table(&self, name: &str) -> Result<()> {
        self.lock().remove(name);
        Ok(())
    }

    fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let mut tables = self.lock();
        let table = tables
            .remove(from)
            .ok_or_else(|| Error::TableNotFound(from.to_owned()))?;
        tables.insert(to.to_owned(), table);
        Ok(())
    }

    /// Rows come back padded with nulls for columns added after they were
    /// appended.
    fn read_rows(&self, table: &str) -> Result<Vec<Row>> {
        let tables = self.lock();
        let t = tables
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_owned()))?;
        Ok(t.rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for column in &t.columns {
                    row.entry(column.name.clone()).or_insert(Value::Null);
                }
                row
            })
            .collect())
    }
}
