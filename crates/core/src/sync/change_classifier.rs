//! Splits a change window into create, update and soft-delete operations.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use super::cell_value::CellValue;
use super::field_mapper::FieldMapper;
use super::key_index::KeyIndex;
use super::retrosync_model::{
    ChangeRow, FieldAssignment, RecordCreate, RecordUpdate, DELETED_STATUS, DELETE_INTENT_FIELD,
    NATURAL_KEY_FIELD, STATUS_FIELD,
};

/// Operations derived from one change window, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub to_create: Vec<RecordCreate>,
    pub to_update: Vec<RecordUpdate>,
    pub to_delete: Vec<RecordUpdate>,
    pub unknown_targets: BTreeSet<String>,
    /// Rows dropped for lacking a natural key.
    pub rows_without_key: usize,
    /// Delete rows whose key has no local record.
    pub deletes_not_found: usize,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

pub struct ChangeClassifier<'a> {
    mapper: &'a FieldMapper,
    index: &'a KeyIndex,
    known_targets: &'a HashSet<String>,
    synced_at: DateTime<Utc>,
}

impl<'a> ChangeClassifier<'a> {
    pub fn new(
        mapper: &'a FieldMapper,
        index: &'a KeyIndex,
        known_targets: &'a HashSet<String>,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            mapper,
            index,
            known_targets,
            synced_at,
        }
    }

    /// Classifies upserts against the index and resolves deletes to local records.
    ///
    /// A key present in both lists yields both an update and a soft delete.
    pub fn classify(&self, upserts: &[ChangeRow], deletes: &[ChangeRow]) -> Classification {
        let mut out = Classification::default();

        for row in upserts {
            let Some(key) = row.natural_key() else {
                out.rows_without_key += 1;
                continue;
            };

            let mapped = self.mapper.map(row, self.known_targets, self.synced_at);
            out.unknown_targets.extend(mapped.unknown_targets);

            match self.index.get(&key) {
                Some(existing) => {
                    let mut fields = mapped.fields;
                    fields.remove(NATURAL_KEY_FIELD);
                    out.to_update.push(RecordUpdate {
                        id: existing.id.clone(),
                        fields,
                    });
                }
                None => out.to_create.push(RecordCreate {
                    fields: mapped.fields,
                }),
            }
        }

        for row in deletes {
            let Some(key) = row.natural_key() else {
                out.rows_without_key += 1;
                continue;
            };
            let Some(existing) = self.index.get(&key) else {
                out.deletes_not_found += 1;
                continue;
            };

            let fields = self.soft_delete_fields();
            if fields.is_empty() {
                continue;
            }
            out.to_delete.push(RecordUpdate {
                id: existing.id.clone(),
                fields,
            });
        }

        out
    }

    fn soft_delete_fields(&self) -> FieldAssignment {
        let mut fields = FieldAssignment::new();
        if self.known_targets.contains(STATUS_FIELD) {
            fields.insert(STATUS_FIELD.to_string(), CellValue::from(DELETED_STATUS));
        }
        if self.known_targets.contains(DELETE_INTENT_FIELD) {
            fields.insert(DELETE_INTENT_FIELD.to_string(), CellValue::Bool(true));
        }
        let synced_at_field = self.mapper.synced_at_field();
        if self.known_targets.contains(synced_at_field) {
            fields.insert(
                synced_at_field.to_string(),
                CellValue::Timestamp(self.synced_at),
            );
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::retrosync_model::{LocalRecord, SYNCED_AT_FIELD};
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 24, 12, 0, 0).unwrap()
    }

    fn known(names: &[&str]) -> HashSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn index_with_100() -> KeyIndex {
        KeyIndex::build(vec![
            LocalRecord::new("recLocal100").with(NATURAL_KEY_FIELD, 100)
        ])
    }

    #[test]
    fn existing_keys_update_and_new_keys_create() {
        let mapper = FieldMapper::buildings();
        let index = index_with_100();
        let targets = known(&["building_id", "City", SYNCED_AT_FIELD]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let upserts = vec![
            ChangeRow::new().with("building_id", 100).with("city", "X"),
            ChangeRow::new().with("building_id", 200).with("city", "Y"),
        ];
        let result = classifier.classify(&upserts, &[]);

        let mut update_fields = FieldAssignment::new();
        update_fields.insert("City".to_string(), CellValue::from("X"));
        update_fields.insert(SYNCED_AT_FIELD.to_string(), CellValue::Timestamp(ts()));
        assert_eq!(
            result.to_update,
            vec![RecordUpdate {
                id: "recLocal100".to_string(),
                fields: update_fields,
            }]
        );

        let mut create_fields = FieldAssignment::new();
        create_fields.insert("building_id".to_string(), CellValue::Integer(200));
        create_fields.insert("City".to_string(), CellValue::from("Y"));
        create_fields.insert(SYNCED_AT_FIELD.to_string(), CellValue::Timestamp(ts()));
        assert_eq!(
            result.to_create,
            vec![RecordCreate {
                fields: create_fields
            }]
        );
    }

    #[test]
    fn delete_marks_existing_record() {
        let mapper = FieldMapper::buildings();
        let index = index_with_100();
        let targets = known(&[STATUS_FIELD, DELETE_INTENT_FIELD, SYNCED_AT_FIELD]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let result = classifier.classify(&[], &[ChangeRow::new().with("building_id", 100)]);

        assert_eq!(result.to_delete.len(), 1);
        let op = &result.to_delete[0];
        assert_eq!(op.id, "recLocal100");
        assert_eq!(op.fields.get(STATUS_FIELD), Some(&CellValue::from("Deleted")));
        assert_eq!(op.fields.get(DELETE_INTENT_FIELD), Some(&CellValue::Bool(true)));
        assert_eq!(
            op.fields.get(SYNCED_AT_FIELD),
            Some(&CellValue::Timestamp(ts()))
        );
    }

    #[test]
    fn delete_for_unknown_key_is_skipped() {
        let mapper = FieldMapper::buildings();
        let index = index_with_100();
        let targets = known(&[STATUS_FIELD]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let result = classifier.classify(&[], &[ChangeRow::new().with("building_id", 999)]);
        assert!(result.to_delete.is_empty());
        assert_eq!(result.deletes_not_found, 1);
    }

    #[test]
    fn delete_without_any_known_column_produces_nothing() {
        let mapper = FieldMapper::buildings();
        let index = index_with_100();
        let targets = known(&["building_id"]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let result = classifier.classify(&[], &[ChangeRow::new().with("building_id", 100)]);
        assert!(result.is_empty());
    }

    #[test]
    fn rows_without_key_are_skipped_silently() {
        let mapper = FieldMapper::buildings();
        let index = index_with_100();
        let targets = known(&["building_id", "City"]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let upserts = vec![
            ChangeRow::new().with("city", "nowhere"),
            ChangeRow::new().with("building_id", "").with("city", "blank"),
            ChangeRow::new()
                .with("building_id", CellValue::Null)
                .with("city", "null"),
        ];
        let deletes = vec![ChangeRow::new()];
        let result = classifier.classify(&upserts, &deletes);

        assert!(result.is_empty());
        assert_eq!(result.rows_without_key, 4);
    }

    #[test]
    fn every_keyed_upsert_lands_in_exactly_one_list() {
        let mapper = FieldMapper::buildings();
        let index = KeyIndex::build(vec![
            LocalRecord::new("r1").with(NATURAL_KEY_FIELD, 1),
            LocalRecord::new("r3").with(NATURAL_KEY_FIELD, 3),
        ]);
        let targets = known(&["building_id"]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let upserts: Vec<ChangeRow> = (1..=5)
            .map(|id| ChangeRow::new().with("building_id", id as i64))
            .collect();
        let result = classifier.classify(&upserts, &[]);

        assert_eq!(result.to_update.len() + result.to_create.len(), upserts.len());
        let updated: Vec<&str> = result.to_update.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(updated, vec!["r1", "r3"]);
        assert_eq!(result.to_create.len(), 3);
    }

    #[test]
    fn unknown_targets_are_unioned_across_rows() {
        let mapper = FieldMapper::buildings();
        let index = KeyIndex::default();
        let targets = known(&["building_id"]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let upserts = vec![
            ChangeRow::new().with("building_id", 1).with("city", "A"),
            ChangeRow::new().with("building_id", 2).with("state", "IL"),
            ChangeRow::new().with("building_id", 3).with("city", "B"),
        ];
        let result = classifier.classify(&upserts, &[]);

        let unknown: Vec<&str> = result.unknown_targets.iter().map(String::as_str).collect();
        assert_eq!(unknown, vec!["City", "State"]);
        for op in &result.to_create {
            assert!(op.fields.keys().all(|key| targets.contains(key)));
        }
    }

    #[test]
    fn key_in_both_lists_is_updated_and_soft_deleted() {
        let mapper = FieldMapper::buildings();
        let index = index_with_100();
        let targets = known(&["building_id", "City", STATUS_FIELD]);
        let classifier = ChangeClassifier::new(&mapper, &index, &targets, ts());

        let row = ChangeRow::new().with("building_id", 100).with("city", "Z");
        let result = classifier.classify(std::slice::from_ref(&row), &[row.clone()]);

        assert_eq!(result.to_update.len(), 1);
        assert_eq!(result.to_delete.len(), 1);
        assert_eq!(result.to_update[0].id, result.to_delete[0].id);
    }
}
