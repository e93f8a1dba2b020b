use super::store::Store;
use crate::constants;
use crate::error::{PipelineError, Result};
use crate::layout::{self, ColumnDef};
use tracing::{debug, info};

/// Owns the DDL for the three destination tables.
pub struct SchemaManager;

impl SchemaManager {
    pub fn create_table_sql(table: &str, columns: &[ColumnDef]) -> String {
        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| {
                if c.name == layout::VIN.name {
                    format!("    {} {} PRIMARY KEY NOT NULL", c.name, c.sql_type)
                } else {
                    format!("    {} {}", c.name, c.sql_type)
                }
            })
            .collect();
        defs.push(format!("    {} TEXT", constants::CATEGORY_COLUMN));
        format!("CREATE TABLE IF NOT EXISTS {table} (\n{}\n);", defs.join(",\n"))
    }

    /// Create any missing destination table, then check that existing tables
    /// still carry every expected column.
    pub fn ensure_schema(store: &Store) -> Result<()> {
        for table in layout::destination_tables() {
            let columns = layout::columns_for(table)
                .ok_or_else(|| PipelineError::Schema(format!("no layout for {table}")))?;
            let sql = Self::create_table_sql(table, columns);
            debug!(table, "ensuring table");
            store
                .connection()
                .execute_batch(&sql)
                .map_err(|e| PipelineError::Schema(format!("{table}: {e}")))?;

            let existing = Self::table_columns(store, table)?;
            let missing: Vec<&str> = columns
                .iter()
                .map(|c| c.name)
                .chain(std::iter::once(constants::CATEGORY_COLUMN))
                .filter(|name| !existing.iter().any(|e| e.eq_ignore_ascii_case(name)))
                .collect();
            if !missing.is_empty() {
                return Err(PipelineError::Schema(format!(
                    "{table} exists without columns {}",
                    missing.join(", ")
                )));
            }
        }
        info!(path = %store.path().display(), "destination schema ready");
        Ok(())
    }

    pub fn table_columns(store: &Store, table: &str) -> Result<Vec<String>> {
        let mut stmt = store
            .connection()
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| PipelineError::Schema(format!("{table}: {e}")))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .map_err(|e| PipelineError::Schema(format!("{table}: {e}")))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Schema(format!("{table}: {e}")))?;
        Ok(names)
    }
}
