//! Column schemas and the per-run header key registry.

use std::collections::BTreeSet;
use std::io::BufRead;

use crate::header::{parse_tag_line, GameHeader, GAME_ID};
use crate::Result;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
}

impl ColumnType {
    /// SQL type name used by SQL-backed sinks.
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::String => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Column::new(name, ColumnType::String)
    }
}

/// Fixed layout of every moves table.
pub const MOVE_COLUMNS: [(&str, ColumnType); 10] = [
    ("game_id", ColumnType::String),
    ("ply", ColumnType::Integer),
    ("move", ColumnType::Integer),
    ("color", ColumnType::String),
    ("san", ColumnType::String),
    ("uci", ColumnType::String),
    ("clock", ColumnType::Float),
    ("eval", ColumnType::String),
    ("fen", ColumnType::String),
    ("shredder_fen", ColumnType::String),
];

/// Type of a column by name: the fixed move columns keep their type,
/// everything else is a string.
pub fn column_type(name: &str) -> ColumnType {
    MOVE_COLUMNS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|&(_, ty)| ty)
        .unwrap_or(ColumnType::String)
}

pub fn move_schema() -> Vec<Column> {
    MOVE_COLUMNS
        .iter()
        .map(|&(name, ty)| Column::new(name, ty))
        .collect()
}

/// Seven Tag Roster, present in every header table even when a shard's games
/// never carry one of them.
pub const STANDARD_TAGS: [&str; 7] = ["Event", "Site", "Date", "Round", "White", "Black", "Result"];

/// Header keys observed so far for one variant/month run.
///
/// Grows monotonically; never shrinks. Owned by the run that feeds it, so
/// parallel shards each carry their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRegistry {
    keys: BTreeSet<String>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::new()
    }
}

impl SchemaRegistry {
    /// A registry seeded with `GameId` and the Seven Tag Roster.
    pub fn new() -> Self {
        let mut registry = SchemaRegistry::empty();
        registry.observe(GAME_ID);
        for tag in STANDARD_TAGS {
            registry.observe(tag);
        }
        registry
    }

    /// A registry with no keys at all.
    pub fn empty() -> Self {
        SchemaRegistry {
            keys: BTreeSet::new(),
        }
    }

    /// Record a key. Returns `true` if it was new.
    pub fn observe(&mut self, key: &str) -> bool {
        if self.keys.contains(key) {
            return false;
        }
        self.keys.insert(key.to_owned())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Header table schema: one string column per key.
    pub fn columns(&self) -> Vec<Column> {
        self.keys().map(Column::string).collect()
    }

    /// Pre-scan a source for every tag key before ingestion, so the header
    /// table can be created with its final schema up front.
    pub fn prescan<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let before = self.len();
        for line in reader.lines() {
            let line = line?;
            if let Some((key, _)) = parse_tag_line(&line) {
                self.observe(key);
            }
        }
        Ok(self.len() - before)
    }
}

/// Pad every header with a null for each registry key it lacks, so all
/// records flushed together expose the same key set.
pub fn reconcile(headers: &mut [GameHeader], registry: &SchemaRegistry) {
    for header in headers.iter_mut() {
        for key in registry.keys() {
            header.pad(key);
        }
    }
}
