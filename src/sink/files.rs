//! [`FileSink`]: staging files in a directory.
//!
//! Header tables are JSON-lines files, one object per game; moves tables are
//! CSV files with a header row. The file stem is the table name without its
//! kind prefix: `games_atomic_2020-01_0001` lives in
//! `atomic_2020-01_0001.jsonl`, `moves_atomic_2020-01` in
//! `atomic_2020-01.csv`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::record::{Row, Value};
use crate::schema::{column_type, Column, ColumnType, MOVE_COLUMNS};
use crate::sink::Sink;
use crate::{Error, Result};

const JSONL: &str = "jsonl";
const CSV: &str = "csv";
const GAMES_PREFIX: &str = "games_";
const MOVES_PREFIX: &str = "moves_";

#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    // Serialises writers; appends to one file must not interleave.
    lock: Mutex<()>,
}

impl FileSink {
    /// Use `dir` as the staging directory, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(FileSink {
            dir: dir.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn path(&self, table: &str) -> Result<PathBuf> {
        let file_name = if let Some(stem) = table.strip_prefix(MOVES_PREFIX) {
            format!("{stem}.{CSV}")
        } else if let Some(stem) = table.strip_prefix(GAMES_PREFIX) {
            format!("{stem}.{JSONL}")
        } else {
            return Err(Error::TableName(table.to_owned()));
        };
        Ok(self.dir.join(file_name))
    }
}

fn is_csv_table(table: &str) -> bool {
    table.starts_with(MOVES_PREFIX)
}

fn table_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    match path.extension()?.to_str()? {
        JSONL => Some(format!("{GAMES_PREFIX}{stem}")),
        CSV => Some(format!("{MOVES_PREFIX}{stem}")),
        _ => None,
    }
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::Integer(i)) => i.to_string(),
        Some(Value::Float(f)) => f.to_string(),
        Some(Value::Text(s)) => s.clone(),
    }
}

fn parse_cell(text: &str, ty: ColumnType) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    match ty {
        ColumnType::Integer => text
            .parse()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(text.to_owned())),
        ColumnType::Float => text
            .parse()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(text.to_owned())),
        ColumnType::String => Value::Text(text.to_owned()),
    }
}

fn csv_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader.headers()?.iter().map(str::to_owned).collect())
}

fn write_csv_header(path: &Path, columns: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns)?;
    writer.flush()?;
    Ok(())
}

/// Header for a CSV table created implicitly by an append: the fixed move
/// columns first, then any others in key order.
fn implicit_header(rows: &[Row]) -> Vec<String> {
    let mut header: Vec<String> = MOVE_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| rows.iter().any(|r| r.contains_key(*name)))
        .map(str::to_owned)
        .collect();
    for row in rows {
        for key in row.keys() {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }
    header
}

fn read_jsonl(path: &Path) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            rows.push(serde_json::from_str(&line)?);
        }
    }
    Ok(rows)
}

/// Rewrite a JSON-lines table in place through a sibling temporary file.
fn write_jsonl(path: &Path, rows: &[Row]) -> Result<()> {
    let tmp = path.with_extension(format!("{JSONL}.tmp"));
    let mut writer = BufWriter::new(File::create(&tmp)?);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Union of the rows' keys in order of first appearance.
fn row_columns(rows: &[Row]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn pad_rows(rows: &mut [Row], columns: &[String]) {
    for row in rows {
        for column in columns {
            row.entry(column.clone()).or_insert(Value::Null);
        }
    }
}

impl Sink for FileSink {
    fn ensure_table(&self, name: &str, schema: &[Column]) -> Result<()> {
        let _guard = self.lock();
        let path = self.path(name)?;
        if path.exists() {
            if is_csv_table(name) {
                let header = csv_header(&path)?;
                if let Some(missing) = schema.iter().find(|c| !header.contains(&c.name)) {
                    tracing::warn!(table = name, column = %missing.name, "cannot add column to existing csv table");
                }
                return Ok(());
            }
            let mut rows = read_jsonl(&path)?;
            let existing = row_columns(&rows);
            let added: Vec<String> = schema
                .iter()
                .map(|c| c.name.clone())
                .filter(|c| !existing.contains(c))
                .collect();
            if !rows.is_empty() && !added.is_empty() {
                pad_rows(&mut rows, &added);
                write_jsonl(&path, &rows)?;
                tracing::debug!(table = name, added = added.len(), rows = rows.len(), "padded jsonl table");
            }
            return Ok(());
        }
        if is_csv_table(name) {
            let header: Vec<String> = schema.iter().map(|c| c.name.clone()).collect();
            write_csv_header(&path, &header)
        } else {
            File::create(&path)?;
            Ok(())
        }
    }

    fn append_rows(&self, name: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let _guard = self.lock();
        let path = self.path(name)?;

        if !is_csv_table(name) {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = BufWriter::new(file);
            for row in rows {
                serde_json::to_writer(&mut writer, row)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            return Ok(());
        }

        if !path.exists() {
            write_csv_header(&path, &implicit_header(rows))?;
        }
        let header = csv_header(&path)?;
        let file = OpenOptions::new().append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in rows {
            if let Some(extra) = row.keys().find(|k| !header.contains(*k)) {
                tracing::warn!(table = name, column = %extra, "dropping column not in csv header");
            }
            writer.write_record(header.iter().map(|c| cell_text(row.get(c))))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn list_tables(&self, prefix: &str) -> Result<Vec<String>> {
        let _guard = self.lock();
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            if let Some(name) = table_name(&entry?.path()) {
                if name.starts_with(prefix) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn columns(&self, table: &str) -> Result<Vec<String>> {
        let _guard = self.lock();
        let path = self.path(table)?;
        if !path.exists() {
            return Err(Error::TableNotFound(table.to_owned()));
        }
        if is_csv_table(table) {
            csv_header(&path)
        } else {
            Ok(row_columns(&read_jsonl(&path)?))
        }
    }

    fn delete_table(&self, name: &str) -> Result<()> {
        let _guard = self.lock();
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        let _guard = self.lock();
        let source = self.path(from)?;
        if !source.exists() {
            return Err(Error::TableNotFound(from.to_owned()));
        }
        fs::rename(source, self.path(to)?)?;
        Ok(())
    }

    fn read_rows(&self, table: &str) -> Result<Vec<Row>> {
        let _guard = self.lock();
        let path = self.path(table)?;
        if !path.exists() {
            return Err(Error::TableNotFound(table.to_owned()));
        }

        if !is_csv_table(table) {
            let mut rows = read_jsonl(&path)?;
            let columns = row_columns(&rows);
            pad_rows(&mut rows, &columns);
            return Ok(rows);
        }

        let mut reader = csv::Reader::from_path(&path)?;
        let header: Vec<(String, ColumnType)> = reader
            .headers()?
            .iter()
            .map(|name| (name.to_owned(), column_type(name)))
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let row: Row = header
                .iter()
                .zip(record.iter())
                .map(|((name, ty), cell)| (name.clone(), parse_cell(cell, *ty)))
                .collect();
            rows.push(row);
        }
        Ok(rows)
    }
}
