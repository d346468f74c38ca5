//! Shard merge: consolidate the staging header tables of each variant/month
//! into one canonical table with a single row per `GameId`.
//!
//! Sources are ranked: an existing canonical table first, then the shard
//! tables in name order. Within a source rows keep insertion order, and the
//! first row seen for a key survives. Including the canonical table makes a
//! re-run after new shards land produce the same canonical content as a
//! single merge of everything.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::header::GAME_ID;
use crate::naming::{TableKind, TableName};
use crate::record::{Row, Value};
use crate::schema::{column_type, Column};
use crate::sink::Sink;
use crate::Result;

const SOURCE_RANK: &str = "__source_rank";
const ROW_ORDER: &str = "__row_order";
const ROW_NUMBER: &str = "__rn";

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One table feeding a merge, with the columns it actually has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
    pub table: String,
    pub columns: BTreeSet<String>,
}

impl MergeSource {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MergeSource {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Union of ranked sources projected onto the union of their columns, keeping
/// the first row per key.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub target: String,
    /// In rank order.
    pub sources: Vec<MergeSource>,
    pub columns: Vec<Column>,
    /// Dedup key. Empty keeps every row.
    pub key: Vec<String>,
}

impl MergePlan {
    pub fn new(target: impl Into<String>, sources: Vec<MergeSource>, key: &[&str]) -> Self {
        let names: BTreeSet<&str> = sources
            .iter()
            .flat_map(|s| s.columns.iter().map(String::as_str))
            .collect();
        let columns = names
            .into_iter()
            .map(|name| Column::new(name, column_type(name)))
            .collect();
        MergePlan {
            target: target.into(),
            sources,
            columns,
            key: key.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Table the merge result is built in before it replaces `target`.
    pub fn staging_table(&self) -> String {
        format!("{}__merge", self.target)
    }

    /// Render the plan as a single SQLite `SELECT`.
    ///
    /// Absent columns become typed nulls; `ROW_NUMBER()` over the key,
    /// ordered by source rank then rowid, picks the survivor.
    pub fn to_sql(&self) -> String {
        let projection = self
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let branches = self
            .sources
            .iter()
            .enumerate()
            .map(|(rank, source)| {
                let cells = self
                    .columns
                    .iter()
                    .map(|c| {
                        if source.columns.contains(&c.name) {
                            quote_ident(&c.name)
                        } else {
                            format!("CAST(NULL AS {}) AS {}", c.ty.sql(), quote_ident(&c.name))
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "SELECT {cells}, {rank} AS {SOURCE_RANK}, rowid AS {ROW_ORDER} FROM {}",
                    quote_ident(&source.table)
                )
            })
            .collect::<Vec<_>>()
            .join(" UNION ALL ");

        if self.key.is_empty() {
            return format!(
                "SELECT {projection} FROM ({branches}) ORDER BY {SOURCE_RANK}, {ROW_ORDER}"
            );
        }

        let partition = self
            .key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {projection} FROM (\
             SELECT *, ROW_NUMBER() OVER (PARTITION BY {partition} ORDER BY {SOURCE_RANK}, {ROW_ORDER}) AS {ROW_NUMBER} \
             FROM ({branches})\
             ) WHERE {ROW_NUMBER} = 1 ORDER BY {SOURCE_RANK}, {ROW_ORDER}"
        )
    }

    /// Run the plan in memory. `inputs` holds each source's rows, in the same
    /// order as [`MergePlan::sources`].
    pub fn apply(&self, inputs: Vec<Vec<Row>>) -> Vec<Row> {
        let keys: Vec<&str> = self.key.iter().map(String::as_str).collect();
        union_dedup(inputs, &self.columns, &keys)
    }
}

/// Concatenate `inputs`, pad every row to `columns` with nulls and keep the
/// first row for each distinct `key`. Null key values group together.
pub fn union_dedup(inputs: Vec<Vec<Row>>, columns: &[Column], key: &[&str]) -> Vec<Row> {
    let mut seen: HashSet<Vec<Option<String>>> = HashSet::new();
    let mut merged = Vec::new();
    for row in inputs.into_iter().flatten() {
        let padded: Row = columns
            .iter()
            .map(|c| {
                let value = row.get(&c.name).cloned().unwrap_or(Value::Null);
                (c.name.clone(), value)
            })
            .collect();
        if !key.is_empty() {
            let key_values = key
                .iter()
                .map(|k| padded.get(*k).and_then(Value::key_text))
                .collect();
            if !seen.insert(key_values) {
                continue;
            }
        }
        merged.push(padded);
    }
    merged
}

/// Staging tables of one variant/month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardGroup {
    pub canonical: TableName,
    /// Sorted by name.
    pub shards: Vec<String>,
    pub existing_canonical: bool,
}

impl ShardGroup {
    /// Tables feeding the merge, in rank order.
    pub fn source_tables(&self) -> Vec<String> {
        let mut tables = Vec::with_capacity(self.shards.len() + 1);
        if self.existing_canonical {
            tables.push(self.canonical.to_string());
        }
        tables.extend(self.shards.iter().cloned());
        tables
    }
}

/// Group the sink's `kind` tables by variant/month. Groups without staging
/// tables are left out; names outside the convention are skipped.
pub fn discover_groups<S: Sink + ?Sized>(sink: &S, kind: TableKind) -> Result<Vec<ShardGroup>> {
    let mut groups: BTreeMap<TableName, ShardGroup> = BTreeMap::new();
    for name in sink.list_tables(&format!("{}_", kind.prefix()))? {
        let parsed = match TableName::parse(&name) {
            Ok(parsed) if parsed.kind == kind => parsed,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(table = %name, "skipping table: {e}");
                continue;
            }
        };
        let canonical = parsed.canonical();
        let group = groups.entry(canonical.clone()).or_insert_with(|| ShardGroup {
            canonical,
            shards: Vec::new(),
            existing_canonical: false,
        });
        if parsed.is_staging() {
            group.shards.push(name);
        } else {
            group.existing_canonical = true;
        }
    }

    Ok(groups
        .into_values()
        .filter(|g| !g.shards.is_empty())
        .map(|mut g| {
            g.shards.sort();
            g
        })
        .collect())
}

/// Build the merge plan for `group`, reading each source's columns.
pub fn plan_group<S: Sink + ?Sized>(sink: &S, group: &ShardGroup, key: &[&str]) -> Result<MergePlan> {
    let mut sources = Vec::new();
    for table in group.source_tables() {
        let columns = sink.columns(&table)?;
        sources.push(MergeSource::new(table, columns));
    }
    Ok(MergePlan::new(group.canonical.to_string(), sources, key))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub canonical: String,
    pub shards_merged: usize,
    pub rows: usize,
}

/// Merge one group into its canonical table, then drop the shards.
pub fn merge_group<S: Sink + ?Sized>(sink: &S, group: &ShardGroup) -> Result<MergeOutcome> {
    let plan = plan_group(sink, group, &[GAME_ID])?;
    let rows = sink.materialize(&plan)?;
    for shard in &group.shards {
        sink.delete_table(shard)?;
    }
    tracing::info!(
        canonical = %group.canonical,
        shards = group.shards.len(),
        rows,
        "merged shard group"
    );
    Ok(MergeOutcome {
        canonical: group.canonical.to_string(),
        shards_merged: group.shards.len(),
        rows,
    })
}

/// Merge every header shard group in the sink. Moves tables are reported and
/// left as they are.
pub fn merge_all<S: Sink + ?Sized>(sink: &S) -> Result<Vec<MergeOutcome>> {
    let moves = sink.list_tables(&format!("{}_", TableKind::Moves.prefix()))?;
    if !moves.is_empty() {
        tracing::info!(tables = moves.len(), "moves tables are not merged");
    }

    let groups = discover_groups(sink, TableKind::Games)?;
    let mut outcomes = Vec::with_capacity(groups.len());
    for group in &groups {
        outcomes.push(merge_group(sink, group)?);
    }
    Ok(outcomes)
}
