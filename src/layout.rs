//! Fixed destination column layout and the upstream names that feed it.

use crate::constants;
use crate::types::{FieldValue, FlatRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub aliases: &'static [&'static str],
}

impl ColumnDef {
    const fn text(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            name,
            sql_type: "TEXT",
            aliases,
        }
    }

    /// Case-insensitive match against the destination name or any upstream alias.
    pub fn matches(&self, column: &str) -> bool {
        let column = column.trim();
        self.name.eq_ignore_ascii_case(column)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(column))
    }

    /// First value in `record` whose column feeds this destination column.
    pub fn find<'a>(&self, record: &'a FlatRecord) -> Option<&'a FieldValue> {
        record
            .iter()
            .find(|(name, _)| self.matches(name))
            .map(|(_, value)| value)
    }
}

pub const VIN: ColumnDef = ColumnDef::text("VIN", &["VIN (1-10)"]);
pub const COUNTY: ColumnDef = ColumnDef::text("County", &[]);
pub const CITY: ColumnDef = ColumnDef::text("City", &[]);
pub const STATE: ColumnDef = ColumnDef::text("State", &[]);
pub const POSTAL_CODE: ColumnDef = ColumnDef::text("PostalCode", &["Postal Code"]);
pub const MODEL_YEAR: ColumnDef = ColumnDef {
    name: "ModelYear",
    sql_type: "INTEGER",
    aliases: &["Model Year"],
};
pub const MAKE: ColumnDef = ColumnDef::text("Make", &[]);
pub const MODEL: ColumnDef = ColumnDef::text("Model", &[]);

pub const ALL_VEHICLE_COLUMNS: &[ColumnDef] = &[
    VIN,
    COUNTY,
    CITY,
    STATE,
    POSTAL_CODE,
    MODEL_YEAR,
    MAKE,
    MODEL,
    ColumnDef::text("ElectricVehicleType", &["Electric Vehicle Type"]),
    ColumnDef::text(
        "CafvEligibility",
        &["Clean Alternative Fuel Vehicle (CAFV) Eligibility"],
    ),
    ColumnDef::text("ElectricRange", &["Electric Range"]),
    ColumnDef::text("BaseMsrp", &["Base MSRP"]),
    ColumnDef::text("LegislativeDistrict", &["Legislative District"]),
    ColumnDef::text("DolVehicleId", &["DOL Vehicle ID"]),
    ColumnDef::text("VehicleLocation", &["Vehicle Location"]),
    ColumnDef::text("ElectricUtility", &["Electric Utility"]),
    ColumnDef::text("CensusTract", &["2020 Census Tract", "Census Tract"]),
    ColumnDef::text("Counties", &[]),
    ColumnDef::text("CongressionalDistricts", &["Congressional Districts"]),
    ColumnDef::text(
        "LegislativeDistrictBoundary",
        &["Legislative District Boundary"],
    ),
];

/// Columns kept by the recent/old partitions, in table order.
pub const PROJECTED_COLUMNS: &[ColumnDef] = &[VIN, COUNTY, CITY, STATE, MODEL_YEAR, MAKE, MODEL];

/// Columns every fetched dataset must expose for its records to be loadable.
pub const REQUIRED_COLUMNS: &[ColumnDef] = &[VIN, MODEL_YEAR];

/// Column layout (without `category`) for a destination table.
pub fn columns_for(table: &str) -> Option<&'static [ColumnDef]> {
    match table {
        constants::ALL_VEHICLES_TABLE => Some(ALL_VEHICLE_COLUMNS),
        constants::RECENT_VEHICLES_TABLE | constants::OLD_VEHICLES_TABLE => Some(PROJECTED_COLUMNS),
        _ => None,
    }
}

pub fn destination_tables() -> [&'static str; 3] {
    [
        constants::ALL_VEHICLES_TABLE,
        constants::RECENT_VEHICLES_TABLE,
        constants::OLD_VEHICLES_TABLE,
    ]
}

/// Destination column fed by upstream column `column`, if any.
pub fn resolve<'a>(layout: &'a [ColumnDef], column: &str) -> Option<&'a ColumnDef> {
    layout.iter().find(|def| def.matches(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_resolve_case_insensitively() {
        assert_eq!(resolve(ALL_VEHICLE_COLUMNS, "VIN (1-10)"), Some(&VIN));
        assert_eq!(resolve(ALL_VEHICLE_COLUMNS, "model year"), Some(&MODEL_YEAR));
        assert_eq!(resolve(ALL_VEHICLE_COLUMNS, "ModelYear"), Some(&MODEL_YEAR));
        assert_eq!(
            resolve(ALL_VEHICLE_COLUMNS, "2020 Census Tract").map(|c| c.name),
            Some("CensusTract")
        );
        assert!(resolve(ALL_VEHICLE_COLUMNS, "internal_id").is_none());
    }

    #[test]
    fn test_upstream_names_feed_exactly_one_column() {
        for def in ALL_VEHICLE_COLUMNS {
            for alias in def.aliases {
                let feeding: Vec<&str> = ALL_VEHICLE_COLUMNS
                    .iter()
                    .filter(|d| d.matches(alias))
                    .map(|d| d.name)
                    .collect();
                assert_eq!(feeding, vec![def.name], "alias {alias:?}");
            }
        }
        assert_eq!(
            resolve(ALL_VEHICLE_COLUMNS, "Legislative District Boundary").map(|c| c.name),
            Some("LegislativeDistrictBoundary")
        );
        assert!(resolve(ALL_VEHICLE_COLUMNS, "WAA Regions").is_none());
    }

    #[test]
    fn test_projected_layout_is_subset_of_full_layout() {
        for def in PROJECTED_COLUMNS {
            assert!(ALL_VEHICLE_COLUMNS.contains(def), "{} missing", def.name);
        }
        assert_eq!(columns_for(constants::OLD_VEHICLES_TABLE), Some(PROJECTED_COLUMNS));
        assert!(columns_for("vehicles").is_none());
    }
}
