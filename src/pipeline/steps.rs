use crate::error::{PipelineError, Result};
use crate::pipeline::context::{HandoffSlot, RunContext, StageMessage};
use crate::pipeline::ingestion::DatasetFetcher;
use crate::pipeline::processing::classify;
use crate::pipeline::storage::{Loader, SchemaManager, Store};
use async_trait::async_trait;

/// Common trait for all pipeline steps
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Execute this step against the run's context
    async fn execute(&self, ctx: &mut RunContext) -> Result<StepResult>;

    /// Get the name of this pipeline step
    fn step_name(&self) -> &'static str;
}

/// Result of executing a pipeline step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub processed_count: usize,
    pub rejected_count: usize,
    pub message: String,
}

impl StepResult {
    pub fn success(processed: usize, message: String) -> Self {
        Self {
            processed_count: processed,
            rejected_count: 0,
            message,
        }
    }

    pub fn with_rejections(processed: usize, rejected: usize, message: String) -> Self {
        Self {
            processed_count: processed,
            rejected_count: rejected,
            message,
        }
    }
}

pub struct EnsureSchemaStep {
    database_url: String,
}

impl EnsureSchemaStep {
    pub const NAME: &'static str = "create_tables";

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl PipelineStep for EnsureSchemaStep {
    async fn execute(&self, _ctx: &mut RunContext) -> Result<StepResult> {
        let store = Store::open(&self.database_url)
            .map_err(|e| PipelineError::Schema(format!("cannot open destination: {e}")))?;
        SchemaManager::ensure_schema(&store)?;
        Ok(StepResult::success(0, "destination tables ready".into()))
    }

    fn step_name(&self) -> &'static str {
        Self::NAME
    }
}

pub struct ExtractStep {
    fetcher: DatasetFetcher,
    source_url: String,
}

impl ExtractStep {
    pub const NAME: &'static str = "extract_data";

    pub fn new(fetcher: DatasetFetcher, source_url: impl Into<String>) -> Self {
        Self {
            fetcher,
            source_url: source_url.into(),
        }
    }
}

#[async_trait]
impl PipelineStep for ExtractStep {
    async fn execute(&self, ctx: &mut RunContext) -> Result<StepResult> {
        let dataset = self.fetcher.fetch(&self.source_url).await?;
        let rows = dataset.records.len();
        ctx.handoff.push(
            Self::NAME,
            HandoffSlot::ExtractedData,
            StageMessage::Extracted(dataset),
        );
        Ok(StepResult::success(rows, format!("fetched {rows} records")))
    }

    fn step_name(&self) -> &'static str {
        Self::NAME
    }
}

pub struct TransformStep;

impl TransformStep {
    pub const NAME: &'static str = "transform_data";
}

#[async_trait]
impl PipelineStep for TransformStep {
    async fn execute(&self, ctx: &mut RunContext) -> Result<StepResult> {
        let dataset = ctx.handoff.pull_extracted(ExtractStep::NAME)?;
        let classification = classify(&dataset.records, ctx.reference_year);
        let processed = classification.all.len();
        let message = format!(
            "{} recent, {} old, {} unknown",
            classification.recent.len(),
            classification.old.len(),
            classification.unknown_count()
        );

        let views = [
            (HandoffSlot::AllVehicles, classification.all),
            (HandoffSlot::RecentVehicles, classification.recent),
            (HandoffSlot::OldVehicles, classification.old),
        ];
        for (slot, view) in views {
            ctx.handoff.push(Self::NAME, slot, StageMessage::View(view));
        }
        Ok(StepResult::success(processed, message))
    }

    fn step_name(&self) -> &'static str {
        Self::NAME
    }
}

pub struct LoadStep {
    database_url: String,
    loader: Loader,
}

impl LoadStep {
    pub const NAME: &'static str = "load_data";

    pub fn new(database_url: impl Into<String>, batch_size: usize) -> Self {
        Self {
            database_url: database_url.into(),
            loader: Loader::new(batch_size),
        }
    }
}

#[async_trait]
impl PipelineStep for LoadStep {
    async fn execute(&self, ctx: &mut RunContext) -> Result<StepResult> {
        let mut store = Store::open(&self.database_url)
            .map_err(|e| PipelineError::load("destination", e))?;
        let mut reports = Vec::with_capacity(3);
        for slot in HandoffSlot::views() {
            let view = ctx.handoff.pull_view(TransformStep::NAME, slot)?;
            reports.push(self.loader.load(&mut store, view)?);
        }

        let written: usize = reports.iter().map(|r| r.written).sum();
        let rejected: usize = reports.iter().map(|r| r.rejected_count()).sum();
        ctx.load_reports = reports;
        Ok(StepResult::with_rejections(
            written,
            rejected,
            format!("wrote {written} rows, rejected {rejected} records"),
        ))
    }

    fn step_name(&self) -> &'static str {
        Self::NAME
    }
}
