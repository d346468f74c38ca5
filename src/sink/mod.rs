//! Destination store abstraction.
//!
//! A [`Sink`] accepts batches of homogeneous rows for named tables and can
//! introspect and drop them. Implementations must tolerate concurrent calls
//! for different tables; calls for the same table may be serialised.

mod files;
mod memory;
mod sqlite;

pub use files::FileSink;
pub use memory::MemorySink;
pub use sqlite::SqliteSink;

use crate::merge::MergePlan;
use crate::record::Row;
use crate::schema::Column;
use crate::Result;

pub trait Sink: Send + Sync {
    /// Create `name` if absent and add any column of `schema` it lacks.
    fn ensure_table(&self, name: &str, schema: &[Column]) -> Result<()>;

    /// Append rows, creating the table from the rows' keys if needed.
    fn append_rows(&self, name: &str, rows: &[Row]) -> Result<()>;

    /// Names of all tables starting with `prefix`, sorted.
    fn list_tables(&self, prefix: &str) -> Result<Vec<String>>;

    /// Column names of `table`.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Drop `name`; dropping a missing table is not an error.
    fn delete_table(&self, name: &str) -> Result<()>;

    /// Rename `from` to `to`. `to` must not exist.
    fn rename_table(&self, from: &str, to: &str) -> Result<()>;

    /// All rows of `table` in insertion order, each carrying every column
    /// of the table.
    fn read_rows(&self, table: &str) -> Result<Vec<Row>>;

    /// Replace `plan.target` with the union/dedup of the plan's sources.
    /// Returns the number of rows written.
    ///
    /// The default reads every source, runs the plan in memory and writes
    /// the result to [`MergePlan::staging_table`]; the target is only
    /// replaced once that table is complete. Stores that can evaluate the
    /// plan natively should override this.
    fn materialize(&self, plan: &MergePlan) -> Result<usize> {
        let mut inputs = Vec::with_capacity(plan.sources.len());
        for source in &plan.sources {
            inputs.push(self.read_rows(&source.table)?);
        }
        let rows = plan.apply(inputs);

        let staging = plan.staging_table();
        self.delete_table(&staging)?;
        self.ensure_table(&staging, &plan.columns)?;
        self.append_rows(&staging, &rows)?;
        self.delete_table(&plan.target)?;
        self.rename_table(&staging, &plan.target)?;
        Ok(rows.len())
    }
}
