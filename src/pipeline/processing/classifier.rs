use crate::constants;
use crate::layout::{self, ColumnDef};
use crate::metrics;
use crate::types::{
    Classification, ClassifiedRecord, FieldValue, FlatRecord, ProductionCategory, VehicleView,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Category for a model year relative to `reference_year`.
pub fn categorize(model_year: Option<&FieldValue>, reference_year: i32) -> ProductionCategory {
    let first_recent = i64::from(reference_year.saturating_sub(constants::RECENT_WINDOW_YEARS));
    match model_year.and_then(FieldValue::as_i64) {
        Some(year) if year >= first_recent => ProductionCategory::RecentProduction,
        Some(_) => ProductionCategory::OldProduction,
        None => ProductionCategory::UnknownProduction,
    }
}

/// Classify every record and split them into the three destination views.
///
/// Input order is preserved in each view. Unknown model years stay in `all` only.
#[instrument(skip(records), fields(records = records.len()))]
pub fn classify(records: &[FlatRecord], reference_year: i32) -> Classification {
    let projection = Projection::new(layout::PROJECTED_COLUMNS);

    let mut all = VehicleView::new(constants::ALL_VEHICLES_TABLE);
    let mut recent = VehicleView::new(constants::RECENT_VEHICLES_TABLE);
    let mut old = VehicleView::new(constants::OLD_VEHICLES_TABLE);

    for record in records {
        let category = categorize(layout::MODEL_YEAR.find(record), reference_year);
        let target = match category {
            ProductionCategory::RecentProduction => Some(&mut recent),
            ProductionCategory::OldProduction => Some(&mut old),
            ProductionCategory::UnknownProduction => None,
        };
        if let Some(view) = target {
            view.records.push(ClassifiedRecord {
                record: projection.apply(record),
                category,
            });
        }
        all.records.push(ClassifiedRecord {
            record: record.clone(),
            category,
        });
    }

    let classification = Classification { all, recent, old };
    let unknown = classification.unknown_count();
    metrics::record_classified(ProductionCategory::RecentProduction.label(), classification.recent.len());
    metrics::record_classified(ProductionCategory::OldProduction.label(), classification.old.len());
    metrics::record_classified(ProductionCategory::UnknownProduction.label(), unknown);
    info!(
        reference_year,
        all = classification.all.len(),
        recent = classification.recent.len(),
        old = classification.old.len(),
        unknown,
        "classified records"
    );
    classification
}

/// Fixed column subset keyed by destination names.
struct Projection {
    defs: &'static [ColumnDef],
    columns: Arc<[String]>,
}

impl Projection {
    fn new(defs: &'static [ColumnDef]) -> Self {
        let columns = defs.iter().map(|d| d.name.to_string()).collect();
        Self { defs, columns }
    }

    fn apply(&self, record: &FlatRecord) -> FlatRecord {
        let values = self
            .defs
            .iter()
            .map(|def| def.find(record).cloned().unwrap_or(FieldValue::Null))
            .collect();
        FlatRecord::new(Arc::clone(&self.columns), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(vin: &str, year: FieldValue) -> FlatRecord {
        let columns: Arc<[String]> = ["VIN (1-10)", "County", "City", "Model Year", "Make", "Electric Range"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        FlatRecord::new(
            columns,
            vec![
                FieldValue::Text(vin.into()),
                FieldValue::Text("King".into()),
                FieldValue::Text("Seattle".into()),
                year,
                FieldValue::Text("TESLA".into()),
                FieldValue::Text("220".into()),
            ],
        )
    }

    #[test]
    fn test_categorize_boundaries() {
        let year = |y: i64| FieldValue::Integer(y);
        assert_eq!(categorize(Some(&year(2021)), 2025), ProductionCategory::RecentProduction);
        assert_eq!(categorize(Some(&year(2025)), 2025), ProductionCategory::RecentProduction);
        assert_eq!(categorize(Some(&year(2020)), 2025), ProductionCategory::OldProduction);
        assert_eq!(
            categorize(Some(&FieldValue::Text("2023".into())), 2025),
            ProductionCategory::RecentProduction
        );
        assert_eq!(
            categorize(Some(&FieldValue::Text("2023.0".into())), 2025),
            ProductionCategory::RecentProduction
        );
        assert_eq!(
            categorize(Some(&FieldValue::from_json(&json!(2023.0))), 2025),
            ProductionCategory::RecentProduction
        );
        assert_eq!(
            categorize(Some(&FieldValue::Text("2020.0".into())), 2025),
            ProductionCategory::OldProduction
        );
        assert_eq!(
            categorize(Some(&FieldValue::Text("2021.5".into())), 2025),
            ProductionCategory::UnknownProduction
        );
        assert_eq!(
            categorize(Some(&FieldValue::Text("unknown".into())), 2025),
            ProductionCategory::UnknownProduction
        );
        assert_eq!(categorize(Some(&FieldValue::Null), 2025), ProductionCategory::UnknownProduction);
        assert_eq!(categorize(None, 2025), ProductionCategory::UnknownProduction);
    }

    #[test]
    fn test_extreme_reference_years_do_not_overflow() {
        assert_eq!(categorize(Some(&FieldValue::Integer(0)), i32::MIN), ProductionCategory::RecentProduction);
        assert_eq!(
            categorize(Some(&FieldValue::Integer(i64::MIN)), i32::MIN),
            ProductionCategory::OldProduction
        );
        assert_eq!(categorize(Some(&FieldValue::Integer(2025)), i32::MAX), ProductionCategory::OldProduction);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let records = vec![
            record("A1", FieldValue::Text("2023".into())),
            record("B2", FieldValue::Text("2012".into())),
            record("C3", FieldValue::Null),
            record("D4", FieldValue::Integer(2021)),
            record("E5", FieldValue::Text("20x1".into())),
        ];
        let c = classify(&records, 2025);

        assert_eq!(c.all.len(), 5);
        assert_eq!(c.all.len(), c.recent.len() + c.old.len() + c.unknown_count());
        assert_eq!(c.unknown_count(), 2);

        let vins = |view: &VehicleView| -> Vec<String> {
            view.records
                .iter()
                .map(|r| layout::VIN.find(&r.record).unwrap().to_string())
                .collect()
        };
        assert_eq!(vins(&c.recent), vec!["A1", "D4"]);
        assert_eq!(vins(&c.old), vec!["B2"]);
        assert_eq!(vins(&c.all), vec!["A1", "B2", "C3", "D4", "E5"]);
        for vin in vins(&c.recent) {
            assert!(!vins(&c.old).contains(&vin));
        }
    }

    #[test]
    fn test_partitions_carry_projected_columns_only() {
        let c = classify(&[record("A1", FieldValue::Text("2023".into()))], 2025);
        let projected = &c.recent.records[0].record;
        let names: Vec<&str> = layout::PROJECTED_COLUMNS.iter().map(|d| d.name).collect();
        assert_eq!(projected.columns(), names.as_slice());
        assert_eq!(projected.get("VIN"), Some(&FieldValue::Text("A1".into())));
        assert_eq!(projected.get("State"), Some(&FieldValue::Null));
        assert!(!projected.contains("Electric Range"));

        let full = &c.all.records[0];
        assert!(full.record.contains("Electric Range"));
        assert_eq!(full.category, ProductionCategory::RecentProduction);
    }
}
