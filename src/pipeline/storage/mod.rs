// Destination store: connection handling, DDL and batched loads

pub mod loader;
pub mod schema;
pub mod store;

pub use loader::{LoadReport, Loader};
pub use schema::SchemaManager;
pub use store::Store;
