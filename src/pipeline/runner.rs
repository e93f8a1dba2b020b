use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{self, StageTimer};
use crate::pipeline::context::RunContext;
use crate::pipeline::ingestion::DatasetFetcher;
use crate::pipeline::steps::{EnsureSchemaStep, ExtractStep, LoadStep, PipelineStep, TransformStep};
use crate::pipeline::storage::LoadReport;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Start of the successful attempt.
    pub started_at: DateTime<Utc>,
    pub attempts: u32,
    pub reference_year: i32,
    pub load_reports: Vec<LoadReport>,
}

impl RunSummary {
    pub fn report(&self, table: &str) -> Option<&LoadReport> {
        self.load_reports.iter().find(|r| r.table == table)
    }
}

/// Linear chain of steps, restarted from the top when any step fails.
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
    retry: RetryPolicy,
    snapshot_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn PipelineStep>>, retry: RetryPolicy) -> Self {
        Self {
            steps,
            retry,
            snapshot_dir: None,
        }
    }

    /// create_tables → extract_data → transform_data → load_data
    pub fn from_config(config: &Config, http: Arc<dyn HttpClientPort>) -> Self {
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(EnsureSchemaStep::new(config.database.url.clone())),
            Box::new(ExtractStep::new(
                DatasetFetcher::new(http),
                config.source.url.clone(),
            )),
            Box::new(TransformStep),
            Box::new(LoadStep::new(
                config.database.url.clone(),
                config.database.batch_size,
            )),
        ];
        let retry = RetryPolicy {
            retries: config.schedule.retries,
            delay: config.schedule.retry_delay(),
        };
        let mut pipeline = Self::new(steps, retry);
        pipeline.snapshot_dir = config.output.snapshot_dir.clone();
        pipeline
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.step_name()).collect()
    }

    /// Execute every step once, in order, stopping at the first failure.
    pub async fn run_once(&self, ctx: &mut RunContext) -> Result<()> {
        for step in &self.steps {
            let name = step.step_name();
            let _timer = StageTimer::start(name);
            info!(step = name, "starting step");
            let result = step.execute(ctx).await?;
            info!(
                step = name,
                processed = result.processed_count,
                rejected = result.rejected_count,
                "{}",
                result.message
            );
        }
        Ok(())
    }

    /// Run with a fresh context per attempt until one succeeds or the retry
    /// budget is spent.
    pub async fn run(&self, reference_year: i32) -> Result<RunSummary> {
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut ctx = RunContext::new(reference_year);
            let span = info_span!("run", run_id = %ctx.run_id, attempt);
            match self.run_once(&mut ctx).instrument(span).await {
                Ok(()) => {
                    self.snapshot(&ctx);
                    metrics::record_run("success", attempt);
                    info!(
                        run_id = %ctx.run_id,
                        attempt,
                        started_at = %ctx.started_at,
                        elapsed_ms = (Utc::now() - ctx.started_at).num_milliseconds(),
                        "run completed"
                    );
                    return Ok(RunSummary {
                        run_id: ctx.run_id,
                        started_at: ctx.started_at,
                        attempts: attempt,
                        reference_year,
                        load_reports: ctx.load_reports,
                    });
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        run_id = %ctx.run_id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "run failed, retrying in {:?}",
                        self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(e) => {
                    metrics::record_run("failed", attempt);
                    error!(run_id = %ctx.run_id, attempt, error = %e, "run failed permanently");
                    return Err(e);
                }
            }
        }
    }

    fn snapshot(&self, ctx: &RunContext) {
        let Some(dir) = &self.snapshot_dir else {
            return;
        };
        let dir = dir.join(ctx.run_id.to_string());
        match ctx.handoff.write_snapshot(&dir) {
            Ok(files) => info!(dir = %dir.display(), files = files.len(), "wrote handoff snapshot"),
            Err(e) => warn!(dir = %dir.display(), error = %e, "could not write handoff snapshot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::steps::StepResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Fails until it has been called `fail_times` times.
    struct FlakyStep {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl PipelineStep for FlakyStep {
        async fn execute(&self, _ctx: &mut RunContext) -> Result<StepResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                return Err(PipelineError::fetch("upstream unavailable"));
            }
            Ok(StepResult::success(1, "ok".into()))
        }

        fn step_name(&self) -> &'static str {
            "flaky"
        }
    }

    struct RecordingStep {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl PipelineStep for RecordingStep {
        async fn execute(&self, _ctx: &mut RunContext) -> Result<StepResult> {
            self.log.lock().unwrap().push(self.name);
            Ok(StepResult::success(0, String::new()))
        }

        fn step_name(&self) -> &'static str {
            self.name
        }
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_failed_run_restarts_from_first_step() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicU32::new(0));
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(RecordingStep { name: "first", log: log.clone() }),
            Box::new(FlakyStep { calls: calls.clone(), fail_times: 1 }),
            Box::new(RecordingStep { name: "last", log: log.clone() }),
        ];
        let pipeline = Pipeline::new(steps, policy(2));

        let before = Utc::now();
        let summary = pipeline.run(2025).await.unwrap();
        assert_eq!(summary.attempts, 2);
        assert!(summary.started_at >= before);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "first", "last"]);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let steps: Vec<Box<dyn PipelineStep>> =
            vec![Box::new(FlakyStep { calls: calls.clone(), fail_times: u32::MAX })];
        let pipeline = Pipeline::new(steps, policy(1));

        let err = pipeline.run(2025).await.unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_default_chain_order() {
        struct NoHttp;
        #[async_trait]
        impl HttpClientPort for NoHttp {
            async fn get(&self, _url: &str) -> std::result::Result<crate::app::ports::HttpGetResult, String> {
                Err("offline".into())
            }
        }
        let pipeline = Pipeline::from_config(&Config::default(), Arc::new(NoHttp));
        assert_eq!(
            pipeline.step_names(),
            vec!["create_tables", "extract_data", "transform_data", "load_data"]
        );
    }
}
