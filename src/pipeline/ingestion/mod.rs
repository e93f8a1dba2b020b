// Pipeline ingestion: dataset download and flattening

pub mod dataset_fetcher;

pub use dataset_fetcher::{DatasetFetcher, FetchedDataset};
