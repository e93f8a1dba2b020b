// Pipeline processing: age classification and partitioning

pub mod classifier;

pub use classifier::{categorize, classify};
