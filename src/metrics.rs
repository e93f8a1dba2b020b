//! Pipeline metrics.
//!
//! Recording goes through the `metrics` facade; the binary installs a
//! Prometheus recorder, tests run with the no-op default.

use ::metrics::{counter, histogram};
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder, serving `/metrics` on `listen_addr` when given.
pub fn init(listen_addr: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    match listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr.parse()?;
            builder = builder.with_http_listener(addr);
            builder
                .install()
                .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;
        }
        None => {
            builder
                .install_recorder()
                .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))?;
        }
    }
    Ok(())
}

pub fn record_fetch(duration_secs: f64, payload_bytes: usize, rows: usize) {
    histogram!("vehicle_etl_fetch_duration_seconds").record(duration_secs);
    histogram!("vehicle_etl_payload_bytes").record(payload_bytes as f64);
    counter!("vehicle_etl_rows_fetched_total").increment(rows as u64);
}

pub fn record_fetch_error() {
    counter!("vehicle_etl_fetch_errors_total").increment(1);
}

pub fn record_classified(category: &'static str, count: usize) {
    counter!("vehicle_etl_rows_classified_total", "category" => category).increment(count as u64);
}

pub fn record_load(table: &'static str, written: usize, conflicts: usize, rejected: usize) {
    counter!("vehicle_etl_rows_written_total", "table" => table).increment(written as u64);
    counter!("vehicle_etl_rows_conflict_skipped_total", "table" => table)
        .increment(conflicts as u64);
    counter!("vehicle_etl_rows_rejected_total", "table" => table).increment(rejected as u64);
}

pub fn record_run(outcome: &'static str, attempts: u32) {
    counter!("vehicle_etl_runs_total", "outcome" => outcome).increment(1);
    histogram!("vehicle_etl_run_attempts").record(attempts as f64);
}

/// Records the elapsed time of a stage into a histogram when dropped.
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        histogram!("vehicle_etl_stage_duration_seconds", "stage" => self.stage)
            .record(self.start.elapsed().as_secs_f64());
    }
}
