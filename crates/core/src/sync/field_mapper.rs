//! Translation of database change rows into sheet field assignments.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use super::cell_value::CellValue;
use super::retrosync_model::{
    ChangeRow, FieldAssignment, ADDRESS_NORMALIZED_FIELD, NATURAL_KEY_FIELD, SYNCED_AT_FIELD,
};

/// Database column -> sheet column for building rows.
pub const BUILDING_FIELD_MAP: [(&str, &str); 22] = [
    (NATURAL_KEY_FIELD, NATURAL_KEY_FIELD),
    (ADDRESS_NORMALIZED_FIELD, ADDRESS_NORMALIZED_FIELD),
    ("bld_number", "Bld#"),
    ("owner_occupied", "Owner Occupied"),
    ("street_address", "Street Address"),
    ("city", "City"),
    ("state", "State"),
    ("zip_code", "Zip"),
    ("county", "County"),
    ("units", "Units"),
    ("construction_code", "construction_code"),
    ("year_built", "Year Built"),
    ("stories", "Stories"),
    ("square_feet", "Square Feet"),
    ("desired_building_coverage", "Desired Building Coverage"),
    ("fire_alarm", "Fire Alarm"),
    ("sprinkler_system", "Sprinkler System"),
    ("roof_year_updated", "roof_year_updated"),
    ("plumbing_year_updated", "plumbing_year_updated"),
    ("electrical_year_updated", "electrical_year_updated"),
    ("hvac_year_updated", "hvac_year_updated"),
    ("entity_id", "entity_id"),
];

/// Result of mapping one change row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedRow {
    pub fields: FieldAssignment,
    /// Targets that had a value but no sheet column.
    pub unknown_targets: BTreeSet<String>,
}

/// Maps change rows through a fixed source -> target table.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    mappings: Vec<(String, String)>,
    synced_at_field: String,
}

impl Default for FieldMapper {
    fn default() -> Self {
        Self::buildings()
    }
}

impl FieldMapper {
    pub fn new<I, S, T>(mappings: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            mappings: mappings
                .into_iter()
                .map(|(source, target)| (source.into(), target.into()))
                .collect(),
            synced_at_field: SYNCED_AT_FIELD.to_string(),
        }
    }

    pub fn buildings() -> Self {
        Self::new(BUILDING_FIELD_MAP)
    }

    pub fn synced_at_field(&self) -> &str {
        &self.synced_at_field
    }

    /// Maps a row into the assignments the sheet can accept.
    ///
    /// Values are copied verbatim. Absent source keys are skipped; explicit
    /// nulls are kept. The sync timestamp is always stamped when the sheet
    /// has that column.
    pub fn map(
        &self,
        row: &ChangeRow,
        known_targets: &HashSet<String>,
        synced_at: DateTime<Utc>,
    ) -> MappedRow {
        let mut mapped = MappedRow::default();

        for (source, target) in &self.mappings {
            let Some(value) = row.get(source) else {
                continue;
            };
            if known_targets.contains(target) {
                mapped.fields.insert(target.clone(), value.clone());
            } else {
                mapped.unknown_targets.insert(target.clone());
            }
        }

        if known_targets.contains(&self.synced_at_field) {
            mapped
                .fields
                .insert(self.synced_at_field.clone(), CellValue::Timestamp(synced_at));
        }

        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn known(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 24, 12, 0, 0).unwrap()
    }

    #[test]
    fn renames_sources_and_stamps_sync_time() {
        let row = ChangeRow::new()
            .with("building_id", 200)
            .with("city", "Y")
            .with("zip_code", "60601");
        let mapped = FieldMapper::buildings().map(
            &row,
            &known(&["building_id", "City", "Zip", SYNCED_AT_FIELD]),
            ts(),
        );

        assert_eq!(mapped.fields.get("building_id"), Some(&CellValue::Integer(200)));
        assert_eq!(mapped.fields.get("City"), Some(&CellValue::from("Y")));
        assert_eq!(mapped.fields.get("Zip"), Some(&CellValue::from("60601")));
        assert_eq!(
            mapped.fields.get(SYNCED_AT_FIELD),
            Some(&CellValue::Timestamp(ts()))
        );
        assert!(mapped.unknown_targets.is_empty());
    }

    #[test]
    fn unknown_targets_are_reported_not_assigned() {
        let row = ChangeRow::new().with("building_id", 1).with("county", "Cook");
        let mapped = FieldMapper::buildings().map(&row, &known(&["building_id"]), ts());

        assert!(!mapped.fields.contains_key("County"));
        assert!(mapped.unknown_targets.contains("County"));
        assert!(mapped.fields.keys().all(|key| key == "building_id"));
    }

    #[test]
    fn explicit_null_is_applied_but_absent_key_is_not() {
        let row = ChangeRow::new()
            .with("building_id", 1)
            .with("stories", CellValue::Null);
        let mapped =
            FieldMapper::buildings().map(&row, &known(&["building_id", "Stories", "Units"]), ts());

        assert_eq!(mapped.fields.get("Stories"), Some(&CellValue::Null));
        assert!(!mapped.fields.contains_key("Units"));
    }

    #[test]
    fn sync_stamp_skipped_without_column() {
        let row = ChangeRow::new().with("building_id", 1);
        let mapped = FieldMapper::buildings().map(&row, &known(&["building_id"]), ts());
        assert!(!mapped.fields.contains_key(SYNCED_AT_FIELD));
        assert!(!mapped.unknown_targets.contains(SYNCED_AT_FIELD));
    }

    #[test]
    fn unmapped_source_keys_are_ignored() {
        let row = ChangeRow::new()
            .with("building_id", 1)
            .with("internal_note", "x");
        let mapped = FieldMapper::buildings().map(&row, &known(&["building_id"]), ts());
        assert_eq!(mapped.fields.len(), 1);
        assert!(mapped.unknown_targets.is_empty());
    }
}
