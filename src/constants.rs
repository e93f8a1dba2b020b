/// Washington State electric vehicle population, Socrata export.
pub const DEFAULT_SOURCE_URL: &str =
    "https://data.wa.gov/api/views/f6w7-q2d2/rows.json?accessType=DOWNLOAD";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/vehicles.db";

// Destination tables
pub const ALL_VEHICLES_TABLE: &str = "all_vehicles";
pub const RECENT_VEHICLES_TABLE: &str = "recent_vehicles";
pub const OLD_VEHICLES_TABLE: &str = "old_vehicles";

// Handoff slots
pub const EXTRACTED_DATA_SLOT: &str = "extracted_data";

/// Upstream flag marking a column as internal.
pub const HIDDEN_FLAG: &str = "hidden";

/// Name of the derived column appended by the classifier.
pub const CATEGORY_COLUMN: &str = "category";

/// Vehicles at most this many years older than the reference year count as recent.
pub const RECENT_WINDOW_YEARS: i32 = 4;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Daily at 00:00:00 UTC.
pub const DEFAULT_SCHEDULE_CRON: &str = "0 0 0 * * *";
