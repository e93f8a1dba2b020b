use crate::constants;
use crate::error::{PipelineError, Result};
use crate::pipeline::schedule;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub schedule: ScheduleConfig,
    pub output: OutputConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_SOURCE_URL.to_string(),
            timeout_secs: 300,
            user_agent: format!("vehicle_etl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub batch_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: constants::DEFAULT_DATABASE_URL.to_string(),
            batch_size: constants::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub retries: u32,
    pub retry_delay_secs: u64,
    /// Cron expression with a leading seconds field, evaluated in UTC.
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            retries: 1,
            retry_delay_secs: 600,
            cron: constants::DEFAULT_SCHEDULE_CRON.to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_dir: PathBuf,
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub listen_addr: Option<String>,
}

impl Config {
    /// Load from `path` if it exists, fall back to defaults otherwise, then
    /// apply `VEHICLE_ETL_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PipelineError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VEHICLE_ETL_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(url) = lookup("VEHICLE_ETL_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(v) = lookup("VEHICLE_ETL_BATCH_SIZE") {
            self.database.batch_size = parse_env("VEHICLE_ETL_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("VEHICLE_ETL_RETRIES") {
            self.schedule.retries = parse_env("VEHICLE_ETL_RETRIES", &v)?;
        }
        if let Some(v) = lookup("VEHICLE_ETL_RETRY_DELAY_SECS") {
            self.schedule.retry_delay_secs = parse_env("VEHICLE_ETL_RETRY_DELAY_SECS", &v)?;
        }
        if let Some(expr) = lookup("VEHICLE_ETL_SCHEDULE_CRON") {
            self.schedule.cron = expr;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(PipelineError::Config("source.url is empty".into()));
        }
        if self.database.url.trim().is_empty() {
            return Err(PipelineError::Config("database.url is empty".into()));
        }
        if self.database.batch_size == 0 {
            return Err(PipelineError::Config("database.batch_size must be > 0".into()));
        }
        schedule::parse_cron(&self.schedule.cron)?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{key} has invalid value '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_daily_job() {
        let config = Config::default();
        assert_eq!(config.database.batch_size, 1000);
        assert_eq!(config.schedule.retries, 1);
        assert_eq!(config.schedule.retry_delay(), Duration::from_secs(600));
        assert_eq!(config.schedule.cron, "0 0 0 * * *");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [database]
            url = "sqlite:///tmp/v.db"

            [schedule]
            retries = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.database.url, "sqlite:///tmp/v.db");
        assert_eq!(config.database.batch_size, 1000);
        assert_eq!(config.schedule.retries, 3);
        assert_eq!(config.source.url, constants::DEFAULT_SOURCE_URL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(|key| match key {
                "VEHICLE_ETL_BATCH_SIZE" => Some("250".to_string()),
                "VEHICLE_ETL_SOURCE_URL" => Some("http://localhost/rows.json".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database.batch_size, 250);
        assert_eq!(config.source.url, "http://localhost/rows.json");
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == "VEHICLE_ETL_RETRIES").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_bad_cron_rejected() {
        let config = Config::from_toml(
            r#"
            [schedule]
            cron = "at midnight"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = Config::default();
        config.database.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
