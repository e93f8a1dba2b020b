pub mod app;
pub mod config;
pub mod constants;
pub mod error;
pub mod infra;
pub mod layout;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod types;
