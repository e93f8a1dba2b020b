// Batch pipeline: fetch, classify, and load, sequenced by the runner

pub mod context;
pub mod ingestion;
pub mod processing;
pub mod runner;
pub mod schedule;
pub mod steps;
pub mod storage;

pub use context::{HandoffSlot, RunContext};
pub use runner::{Pipeline, RetryPolicy, RunSummary};
pub use steps::{PipelineStep, StepResult};
