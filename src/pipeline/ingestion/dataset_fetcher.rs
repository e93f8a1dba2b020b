use crate::app::ports::HttpClientPort;
use crate::constants;
use crate::error::{PipelineError, Result};
use crate::layout;
use crate::metrics;
use crate::types::{FieldValue, FlatRecord};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// `rows.json` document: column metadata plus positional rows.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDatasetPayload {
    pub meta: PayloadMeta,
    pub data: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadMeta {
    pub view: PayloadView,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadView {
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub flags: Option<Vec<String>>,
}

impl ColumnDescriptor {
    /// Only an explicit "hidden" flag hides a column; absent flags mean visible.
    pub fn is_hidden(&self) -> bool {
        self.flags
            .as_deref()
            .map_or(false, |flags| flags.iter().any(|f| f == constants::HIDDEN_FLAG))
    }
}

/// Flattened fetch result.
#[derive(Debug, Clone)]
pub struct FetchedDataset {
    pub columns: Arc<[String]>,
    pub hidden_columns: Vec<String>,
    pub records: Vec<FlatRecord>,
    pub payload_sha256: String,
    pub payload_bytes: usize,
}

pub struct DatasetFetcher {
    http: Arc<dyn HttpClientPort>,
}

impl DatasetFetcher {
    pub fn new(http: Arc<dyn HttpClientPort>) -> Self {
        Self { http }
    }

    /// Download and flatten the dataset. Nothing is returned unless every row
    /// flattens cleanly.
    #[instrument(skip(self))]
    pub async fn fetch(&self, source_url: &str) -> Result<FetchedDataset> {
        let t_fetch = std::time::Instant::now();
        let dataset = self
            .download(source_url)
            .await
            .inspect_err(|_| metrics::record_fetch_error())?;

        metrics::record_fetch(
            t_fetch.elapsed().as_secs_f64(),
            dataset.payload_bytes,
            dataset.records.len(),
        );
        info!(
            rows = dataset.records.len(),
            visible_columns = dataset.columns.len(),
            hidden_columns = dataset.hidden_columns.len(),
            sha256 = %dataset.payload_sha256,
            "fetched dataset"
        );
        Ok(dataset)
    }

    async fn download(&self, source_url: &str) -> Result<FetchedDataset> {
        let resp = self
            .http
            .get(source_url)
            .await
            .map_err(|e| PipelineError::fetch(format!("GET {source_url}: {e}")))?;
        if !resp.is_success() {
            return Err(PipelineError::fetch(format!(
                "GET {source_url} returned status {}",
                resp.status
            )));
        }
        debug!(content_type = %resp.content_type, bytes = resp.bytes.len(), "payload received");

        let payload: RawDatasetPayload = serde_json::from_slice(&resp.bytes)
            .map_err(|e| PipelineError::fetch(format!("malformed dataset payload: {e}")))?;
        let (columns, hidden_columns, records) = flatten(&payload)?;
        check_required_columns(&columns)?;

        Ok(FetchedDataset {
            columns,
            hidden_columns,
            records,
            payload_sha256: hex::encode(Sha256::digest(&resp.bytes)),
            payload_bytes: resp.bytes.len(),
        })
    }
}

/// Drop hidden columns and key every row by the remaining column names.
pub fn flatten(
    payload: &RawDatasetPayload,
) -> Result<(Arc<[String]>, Vec<String>, Vec<FlatRecord>)> {
    let descriptors = &payload.meta.view.columns;
    let visible: Vec<usize> = descriptors
        .iter()
        .enumerate()
        .filter(|(_, col)| !col.is_hidden())
        .map(|(i, _)| i)
        .collect();
    let hidden: Vec<String> = descriptors
        .iter()
        .filter(|col| col.is_hidden())
        .map(|col| col.name.clone())
        .collect();
    let columns: Arc<[String]> = visible
        .iter()
        .map(|&i| descriptors[i].name.clone())
        .collect();

    let mut records = Vec::with_capacity(payload.data.len());
    for (row_idx, row) in payload.data.iter().enumerate() {
        if row.len() != descriptors.len() {
            return Err(PipelineError::fetch(format!(
                "row {row_idx} has {} values but {} columns are declared",
                row.len(),
                descriptors.len()
            )));
        }
        let values = visible
            .iter()
            .map(|&i| FieldValue::from_json(&row[i]))
            .collect();
        records.push(FlatRecord::new(Arc::clone(&columns), values));
    }
    Ok((columns, hidden, records))
}

fn check_required_columns(columns: &[String]) -> Result<()> {
    for def in layout::REQUIRED_COLUMNS {
        if !columns.iter().any(|c| def.matches(c)) {
            warn!(column = def.name, "required column missing from dataset");
            return Err(PipelineError::fetch(format!(
                "dataset has no visible {} column",
                def.name
            )));
        }
    }
    Ok(())
}
