use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use vehicle_etl::config::Config;
use vehicle_etl::infra::http_client::ReqwestHttp;
use vehicle_etl::pipeline::schedule;
use vehicle_etl::pipeline::storage::{SchemaManager, Store};
use vehicle_etl::pipeline::Pipeline;
use vehicle_etl::{logging, metrics};

#[derive(Parser)]
#[command(name = "vehicle_etl")]
#[command(about = "Load the Washington EV registration dataset into SQLite")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once, retrying per the schedule settings
    Run {
        /// Override the reference year used for classification
        #[arg(long)]
        reference_year: Option<i32>,
    },
    /// Run the pipeline on the configured cron schedule
    Schedule {
        /// Also run immediately on startup
        #[arg(long)]
        run_now: bool,
    },
    /// Create the destination tables and exit
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let _log_guard = logging::init_logging(&config.output.log_dir);

    if let Err(e) = metrics::init(config.metrics.listen_addr.as_deref()) {
        warn!("metrics disabled: {e}");
    }

    match cli.command {
        Commands::Run { reference_year } => {
            let pipeline = build_pipeline(&config)?;
            let year = reference_year.unwrap_or_else(|| Utc::now().year());
            match pipeline.run(year).await {
                Ok(summary) => {
                    for report in &summary.load_reports {
                        println!(
                            "{:<16} seen {:>8}  written {:>8}  conflicts {:>8}  rejected {:>6}",
                            report.table,
                            report.seen,
                            report.written,
                            report.conflicts,
                            report.rejected_count()
                        );
                    }
                    info!(
                        run_id = %summary.run_id,
                        started_at = %summary.started_at,
                        attempts = summary.attempts,
                        "done"
                    );
                }
                Err(e) => {
                    error!("Pipeline failed: {e}");
                    return Err(e.into());
                }
            }
        }
        Commands::Schedule { run_now } => {
            let pipeline = build_pipeline(&config)?;
            let cron = schedule::parse_cron(&config.schedule.cron)?;
            info!(
                cron = %config.schedule.cron,
                retries = config.schedule.retries,
                "starting schedule"
            );
            schedule::run_scheduled_loop(&pipeline, &cron, run_now).await;
        }
        Commands::InitDb => {
            let store = Store::open(&config.database.url)?;
            SchemaManager::ensure_schema(&store)?;
            println!("Destination tables ready at {}", store.path().display());
        }
    }
    Ok(())
}

fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let http = ReqwestHttp::new(&config.source).context("building HTTP client")?;
    Ok(Pipeline::from_config(config, Arc::new(http)))
}
