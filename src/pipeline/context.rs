use crate::constants;
use crate::error::{PipelineError, Result};
use crate::pipeline::ingestion::FetchedDataset;
use crate::pipeline::storage::LoadReport;
use crate::types::VehicleView;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Named slots a stage can publish into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandoffSlot {
    ExtractedData,
    AllVehicles,
    RecentVehicles,
    OldVehicles,
}

impl HandoffSlot {
    pub fn name(&self) -> &'static str {
        match self {
            HandoffSlot::ExtractedData => constants::EXTRACTED_DATA_SLOT,
            HandoffSlot::AllVehicles => constants::ALL_VEHICLES_TABLE,
            HandoffSlot::RecentVehicles => constants::RECENT_VEHICLES_TABLE,
            HandoffSlot::OldVehicles => constants::OLD_VEHICLES_TABLE,
        }
    }

    pub fn views() -> [HandoffSlot; 3] {
        [
            HandoffSlot::AllVehicles,
            HandoffSlot::RecentVehicles,
            HandoffSlot::OldVehicles,
        ]
    }
}

#[derive(Debug, Clone)]
pub enum StageMessage {
    Extracted(FetchedDataset),
    View(VehicleView),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandoffKey {
    pub producer: &'static str,
    pub slot: HandoffSlot,
}

/// Messages passed between the stages of one run, keyed by producing stage and slot.
#[derive(Debug, Default)]
pub struct Handoff {
    entries: HashMap<HandoffKey, StageMessage>,
}

impl Handoff {
    pub fn push(&mut self, producer: &'static str, slot: HandoffSlot, message: StageMessage) {
        self.entries.insert(HandoffKey { producer, slot }, message);
    }

    pub fn pull_extracted(&self, producer: &'static str) -> Result<&FetchedDataset> {
        match self.entries.get(&HandoffKey {
            producer,
            slot: HandoffSlot::ExtractedData,
        }) {
            Some(StageMessage::Extracted(dataset)) => Ok(dataset),
            _ => Err(missing(producer, HandoffSlot::ExtractedData)),
        }
    }

    pub fn pull_view(&self, producer: &'static str, slot: HandoffSlot) -> Result<&VehicleView> {
        match self.entries.get(&HandoffKey { producer, slot }) {
            Some(StageMessage::View(view)) => Ok(view),
            _ => Err(missing(producer, slot)),
        }
    }

    /// Write every slot as `<dir>/<slot>.json` for inspection.
    pub fn write_snapshot(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.entries.len());
        for (key, message) in &self.entries {
            let path = dir.join(format!("{}.json", key.slot.name()));
            let mut writer = BufWriter::new(File::create(&path)?);
            match message {
                StageMessage::Extracted(dataset) => {
                    serde_json::to_writer(&mut writer, &dataset.records)?
                }
                StageMessage::View(view) => serde_json::to_writer(&mut writer, &view.records)?,
            }
            writer.flush()?;
            written.push(path);
        }
        written.sort();
        Ok(written)
    }
}

fn missing(producer: &str, slot: HandoffSlot) -> PipelineError {
    PipelineError::Handoff(format!("{producer}/{}", slot.name()))
}

/// State owned by a single pipeline attempt.
#[derive(Debug)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// "Current year" used for the recent/old boundary.
    pub reference_year: i32,
    pub handoff: Handoff,
    pub load_reports: Vec<LoadReport>,
}

impl RunContext {
    pub fn new(reference_year: i32) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            reference_year,
            handoff: Handoff::default(),
            load_reports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassifiedRecord, FieldValue, FlatRecord, ProductionCategory};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn one_row_view() -> VehicleView {
        let columns: Arc<[String]> = vec!["VIN".to_string()].into();
        let mut view = VehicleView::new(constants::RECENT_VEHICLES_TABLE);
        view.records.push(ClassifiedRecord {
            record: FlatRecord::new(columns, vec![FieldValue::Text("1A2B3C".into())]),
            category: ProductionCategory::RecentProduction,
        });
        view
    }

    #[test]
    fn test_pull_is_keyed_by_producer_and_slot() {
        let mut handoff = Handoff::default();
        handoff.push("transform_data", HandoffSlot::RecentVehicles, StageMessage::View(one_row_view()));

        assert_eq!(
            handoff
                .pull_view("transform_data", HandoffSlot::RecentVehicles)
                .unwrap()
                .len(),
            1
        );
        assert!(matches!(
            handoff.pull_view("extract_data", HandoffSlot::RecentVehicles),
            Err(PipelineError::Handoff(_))
        ));
        assert!(handoff.pull_view("transform_data", HandoffSlot::OldVehicles).is_err());
        assert!(handoff.pull_extracted("transform_data").is_err());
    }

    #[test]
    fn test_snapshot_writes_one_file_per_slot() {
        let dir = tempdir().unwrap();
        let mut handoff = Handoff::default();
        handoff.push("transform_data", HandoffSlot::RecentVehicles, StageMessage::View(one_row_view()));

        let files = handoff.write_snapshot(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("recent_vehicles.json")]);
        let text = fs::read_to_string(&files[0]).unwrap();
        assert_eq!(text, r#"[{"VIN":"1A2B3C","category":"Last 5 Years"}]"#);
    }
}
