//! Table and source-file naming conventions.
//!
//! Staging header tables are named `games_{variant}_{year-month}_{shard}`;
//! the canonical table of a group drops the shard suffix. Moves go straight
//! to `moves_{variant}_{year-month}`. Variant names never contain `_`.

use std::fmt;
use std::path::Path;

use crate::{Error, Result};

/// Shard suffix used when a source file carries none.
pub const DEFAULT_SHARD: &str = "0000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Games,
    Moves,
}

impl TableKind {
    pub fn prefix(self) -> &'static str {
        match self {
            TableKind::Games => "games",
            TableKind::Moves => "moves",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub kind: TableKind,
    pub variant: String,
    pub month: String,
    pub shard: Option<String>,
}

impl TableName {
    pub fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('_').collect();
        let kind = match parts.first() {
            Some(&"games") => TableKind::Games,
            Some(&"moves") => TableKind::Moves,
            _ => return Err(Error::TableName(name.to_owned())),
        };
        let (variant, month, shard) = match parts[1..] {
            [variant, month] => (variant, month, None),
            [variant, month, shard] => (variant, month, Some(shard.to_owned())),
            _ => return Err(Error::TableName(name.to_owned())),
        };
        if variant.is_empty() || month.is_empty() || shard.as_deref() == Some("") {
            return Err(Error::TableName(name.to_owned()));
        }
        Ok(TableName {
            kind,
            variant: variant.to_owned(),
            month: month.to_owned(),
            shard,
        })
    }

    /// Staging tables carry a shard suffix; canonical tables do not.
    pub fn is_staging(&self) -> bool {
        self.shard.is_some()
    }

    /// Name of the canonical table this shard merges into.
    pub fn canonical(&self) -> TableName {
        TableName {
            shard: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.kind.prefix(), self.variant, self.month)?;
        if let Some(shard) = &self.shard {
            write!(f, "_{shard}")?;
        }
        Ok(())
    }
}

/// Variant, month and shard one ingestion run writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardTarget {
    pub variant: String,
    pub month: String,
    pub shard: Option<String>,
}

impl ShardTarget {
    pub fn new(variant: impl Into<String>, month: impl Into<String>, shard: Option<String>) -> Self {
        ShardTarget {
            variant: variant.into(),
            month: month.into(),
            shard,
        }
    }

    /// Parse an archive file name such as
    /// `lichess_db_threeCheck_rated_2014-08_0001.pgn`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::SourceName(path.display().to_string()))?;
        let stem = file_name.split('.').next().unwrap_or(file_name);
        let parts: Vec<&str> = stem.split('_').collect();
        match parts[..] {
            ["lichess", "db", variant, "rated", month] => Ok(ShardTarget::new(variant, month, None)),
            ["lichess", "db", variant, "rated", month, shard] => {
                Ok(ShardTarget::new(variant, month, Some(shard.to_owned())))
            }
            _ => Err(Error::SourceName(file_name.to_owned())),
        }
    }

    pub fn games_table(&self) -> TableName {
        TableName {
            kind: TableKind::Games,
            variant: self.variant.clone(),
            month: self.month.clone(),
            shard: Some(self.shard.clone().unwrap_or_else(|| DEFAULT_SHARD.to_owned())),
        }
    }

    pub fn moves_table(&self) -> TableName {
        TableName {
            kind: TableKind::Moves,
            variant: self.variant.clone(),
            month: self.month.clone(),
            shard: None,
        }
    }
}

impl fmt::Display for ShardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.variant, self.month)?;
        if let Some(shard) = &self.shard {
            write!(f, "_{shard}")?;
        }
        Ok(())
    }
}
