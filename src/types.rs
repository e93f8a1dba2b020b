use crate::constants;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Scalar cell value carried through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
}

impl FieldValue {
    /// Socrata cells are mostly strings; anything that is not a scalar is kept
    /// as its JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            serde_json::Value::Number(n) => {
                match n.as_i64().or_else(|| n.as_f64().and_then(whole_number)) {
                    Some(i) => FieldValue::Integer(i),
                    None => FieldValue::Text(n.to_string()),
                }
            }
            other => FieldValue::Text(other.to_string()),
        }
    }

    /// Null and whitespace-only text both count as blank.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Integer(_) => false,
        }
    }

    /// Integer view of the value. Text is accepted when it trims to a number
    /// with no fractional part, so `"2023"` and `"2023.0"` both read as 2023.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Text(s) => {
                let s = s.trim();
                s.parse()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
            }
            FieldValue::Null => None,
        }
    }
}

fn whole_number(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
        .then(|| f as i64)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One vehicle row keyed by visible column name.
///
/// Every record produced by one fetch shares the same `columns` allocation, so
/// the key set and its order are identical across the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    columns: Arc<[String]>,
    values: Vec<FieldValue>,
}

impl FlatRecord {
    pub fn new(columns: Arc<[String]>, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn shared_columns(&self) -> &Arc<[String]> {
        &self.columns
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.values[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Age bucket derived from a vehicle's model year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductionCategory {
    RecentProduction,
    OldProduction,
    UnknownProduction,
}

impl ProductionCategory {
    /// Label stored in the `category` column.
    pub fn label(&self) -> &'static str {
        match self {
            ProductionCategory::RecentProduction => "Last 5 Years",
            ProductionCategory::OldProduction => "More Than 5 Years",
            ProductionCategory::UnknownProduction => "Unknown",
        }
    }
}

impl fmt::Display for ProductionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for ProductionCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub record: FlatRecord,
    pub category: ProductionCategory,
}

impl Serialize for ClassifiedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.record.values().len() + 1))?;
        for (name, value) in self.record.iter() {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(constants::CATEGORY_COLUMN, &self.category)?;
        map.end()
    }
}

/// Records bound for one destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleView {
    pub table: &'static str,
    pub records: Vec<ClassifiedRecord>,
}

impl VehicleView {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Output of the classifier: the full set plus the two age partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub all: VehicleView,
    pub recent: VehicleView,
    pub old: VehicleView,
}

impl Classification {
    pub fn unknown_count(&self) -> usize {
        self.all
            .records
            .iter()
            .filter(|r| r.category == ProductionCategory::UnknownProduction)
            .count()
    }
}
