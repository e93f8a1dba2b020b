use super::store::Store;
use crate::constants;
use crate::error::{PipelineError, Result, ValidationError};
use crate::layout::{self, ColumnDef};
use crate::metrics;
use crate::types::{FieldValue, FlatRecord, VehicleView};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Outcome of loading one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub table: String,
    pub seen: usize,
    pub written: usize,
    /// Records whose VIN was already present; the first-loaded row is kept.
    pub conflicts: usize,
    pub rejected: Vec<ValidationError>,
    /// Upstream columns with no destination column.
    pub dropped_columns: Vec<String>,
}

impl LoadReport {
    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }
}

/// How one record shape maps onto a destination table.
struct InsertPlan {
    columns: Arc<[String]>,
    /// (index into the record, destination column)
    targets: Vec<(usize, &'static ColumnDef)>,
    vin_index: Option<usize>,
    dropped: Vec<String>,
    sql: String,
}

impl InsertPlan {
    fn build(table: &str, layout: &'static [ColumnDef], record: &FlatRecord) -> Self {
        let mut targets: Vec<(usize, &'static ColumnDef)> = Vec::new();
        let mut dropped = Vec::new();
        for (idx, name) in record.columns().iter().enumerate() {
            match layout::resolve(layout, name) {
                Some(def) if !targets.iter().any(|(_, d)| d.name == def.name) => {
                    targets.push((idx, def))
                }
                _ => dropped.push(name.clone()),
            }
        }
        let vin_index = targets
            .iter()
            .find(|(_, def)| def.name == layout::VIN.name)
            .map(|(idx, _)| *idx);

        let names: Vec<&str> = targets
            .iter()
            .map(|(_, def)| def.name)
            .chain(std::iter::once(constants::CATEGORY_COLUMN))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT({}) DO NOTHING",
            names.join(", "),
            placeholders.join(", "),
            layout::VIN.name
        );

        Self {
            columns: Arc::clone(record.shared_columns()),
            targets,
            vin_index,
            dropped,
            sql,
        }
    }

    fn fits(&self, record: &FlatRecord) -> bool {
        Arc::ptr_eq(&self.columns, record.shared_columns()) || *self.columns == *record.columns()
    }

    fn vin<'a>(&self, record: &'a FlatRecord) -> Option<&'a FieldValue> {
        self.vin_index
            .map(|idx| &record.values()[idx])
            .filter(|v| !v.is_blank())
    }

    fn row(&self, record: &FlatRecord, category: &'static str) -> Vec<FieldValue> {
        let values = record.values();
        self.targets
            .iter()
            .map(|(idx, def)| coerce(&values[*idx], def))
            .chain(std::iter::once(FieldValue::Text(category.to_string())))
            .collect()
    }
}

/// INTEGER columns take integers or NULL; unparseable text becomes NULL.
fn coerce(value: &FieldValue, def: &ColumnDef) -> FieldValue {
    if def.sql_type == "INTEGER" {
        value.as_i64().map_or(FieldValue::Null, FieldValue::Integer)
    } else {
        value.clone()
    }
}

/// Appends views to their destination tables in fixed-size batches.
pub struct Loader {
    batch_size: usize,
}

impl Loader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Insert every valid record of `view`. VIN conflicts are skipped, records
    /// without a VIN are rejected and reported, any other write failure aborts
    /// the load.
    #[instrument(skip(self, store, view), fields(table = view.table, records = view.len()))]
    pub fn load(&self, store: &mut Store, view: &VehicleView) -> Result<LoadReport> {
        let table = view.table;
        let layout = layout::columns_for(table)
            .ok_or_else(|| PipelineError::load(table, "unknown destination table"))?;

        let mut report = LoadReport {
            table: table.to_string(),
            seen: view.len(),
            ..LoadReport::default()
        };
        let mut plan: Option<InsertPlan> = None;

        for (batch_no, batch) in view.records.chunks(self.batch_size).enumerate() {
            let offset = batch_no * self.batch_size;
            let tx = store
                .connection_mut()
                .transaction()
                .map_err(|e| PipelineError::load(table, e))?;
            let mut accepted = 0usize;
            let mut written = 0usize;

            for (i, classified) in batch.iter().enumerate() {
                let record = &classified.record;
                if !plan.as_ref().map_or(false, |p| p.fits(record)) {
                    let fresh = InsertPlan::build(table, layout, record);
                    for name in &fresh.dropped {
                        if !report.dropped_columns.contains(name) {
                            warn!(table, column = %name, "column has no destination, dropping");
                            report.dropped_columns.push(name.clone());
                        }
                    }
                    plan = Some(fresh);
                }
                let Some(p) = plan.as_ref() else { continue };

                if p.vin(record).is_none() {
                    let rejection = ValidationError::MissingKey {
                        table: table.to_string(),
                        index: offset + i,
                    };
                    debug!("{rejection}");
                    report.rejected.push(rejection);
                    continue;
                }

                let row = p.row(record, classified.category.label());
                let mut stmt = tx
                    .prepare_cached(&p.sql)
                    .map_err(|e| PipelineError::load(table, e))?;
                written += stmt
                    .execute(rusqlite::params_from_iter(row.iter()))
                    .map_err(|e| PipelineError::load(table, e))?;
                accepted += 1;
            }

            tx.commit().map_err(|e| PipelineError::load(table, e))?;
            report.written += written;
            report.conflicts += accepted - written;
            debug!(batch = batch_no, accepted, written, "batch committed");
        }

        if report.rejected_count() > 0 {
            warn!(
                table,
                rejected = report.rejected_count(),
                "records without VIN were not loaded"
            );
        }
        metrics::record_load(table, report.written, report.conflicts, report.rejected_count());
        info!(
            table,
            seen = report.seen,
            written = report.written,
            conflicts = report.conflicts,
            rejected = report.rejected_count(),
            "loaded view"
        );
        Ok(report)
    }
}
