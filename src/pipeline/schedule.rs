use super::runner::Pipeline;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Datelike, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::{error, info, warn};

/// Parse a six or seven field cron expression (seconds first).
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr.trim())
        .map_err(|e| PipelineError::Config(format!("invalid cron expression '{expr}': {e}")))
}

/// First slot strictly after `now`.
///
/// Missed slots are never replayed; the schedule always moves forward from `now`.
pub fn next_run_after(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&now).next()
}

/// Run the pipeline at every slot of `schedule`. A failed interval is logged
/// and the loop waits for the next slot.
pub async fn run_scheduled_loop(pipeline: &Pipeline, schedule: &Schedule, run_now: bool) {
    if run_now {
        run_scheduled(pipeline).await;
    }
    loop {
        let now = Utc::now();
        let Some(next) = next_run_after(schedule, now) else {
            warn!("schedule has no upcoming slots, stopping");
            return;
        };
        info!(next_run = %next, "waiting for next scheduled run");
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        run_scheduled(pipeline).await;
    }
}

async fn run_scheduled(pipeline: &Pipeline) {
    match pipeline.run(Utc::now().year()).await {
        Ok(summary) => info!(run_id = %summary.run_id, attempts = summary.attempts, "scheduled run finished"),
        Err(e) => error!(error = %e, "scheduled run failed for this interval"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_daily_midnight_rolls_to_tomorrow() {
        let daily = parse_cron("0 0 0 * * *").unwrap();
        assert_eq!(next_run_after(&daily, at(2025, 3, 10, 0, 0)), Some(at(2025, 3, 11, 0, 0)));
        assert_eq!(next_run_after(&daily, at(2025, 3, 10, 4, 30)), Some(at(2025, 3, 11, 0, 0)));
        assert_eq!(next_run_after(&daily, at(2025, 12, 31, 23, 59)), Some(at(2026, 1, 1, 0, 0)));
    }

    #[test]
    fn test_later_slot_today() {
        let six_am = parse_cron("0 0 6 * * *").unwrap();
        assert_eq!(next_run_after(&six_am, at(2025, 3, 10, 4, 30)), Some(at(2025, 3, 10, 6, 0)));
    }

    #[test]
    fn test_long_outage_is_not_caught_up() {
        let daily = parse_cron("0 0 0 * * *").unwrap();
        let back_online = at(2025, 3, 20, 9, 15);
        assert_eq!(next_run_after(&daily, back_online), Some(at(2025, 3, 21, 0, 0)));
    }

    #[test]
    fn test_invalid_expression_is_config_error() {
        assert!(matches!(parse_cron("every day"), Err(PipelineError::Config(_))));
    }
}
