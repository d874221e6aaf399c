//! Natural-key lookup over the local sheet.

use std::collections::HashMap;

use log::warn;

use super::retrosync_model::LocalRecord;

/// Stringified natural key -> local record, built once per run.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    by_key: HashMap<String, LocalRecord>,
    duplicate_keys: Vec<String>,
    orphans: usize,
}

impl KeyIndex {
    /// Indexes `records` in iteration order.
    ///
    /// Records without a natural key are counted as orphans and left out.
    /// When two records share a key the later one wins; the key is remembered
    /// in [`KeyIndex::duplicate_keys`].
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = LocalRecord>,
    {
        let mut index = Self::default();
        for record in records {
            let Some(key) = record.natural_key() else {
                index.orphans += 1;
                continue;
            };
            if let Some(previous) = index.by_key.insert(key.clone(), record) {
                warn!(
                    "Duplicate building_id {} in sheet (record {} replaced in index)",
                    key, previous.id
                );
                if !index.duplicate_keys.contains(&key) {
                    index.duplicate_keys.push(key);
                }
            }
        }
        index
    }

    pub fn get(&self, key: &str) -> Option<&LocalRecord> {
        self.by_key.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn duplicate_keys(&self) -> &[String] {
        &self.duplicate_keys
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::cell_value::CellValue;
    use crate::sync::retrosync_model::NATURAL_KEY_FIELD;

    #[test]
    fn indexes_by_stringified_key() {
        let index = KeyIndex::build(vec![
            LocalRecord::new("recA").with(NATURAL_KEY_FIELD, 100),
            LocalRecord::new("recB").with(NATURAL_KEY_FIELD, CellValue::Float(200.0)),
        ]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("100").map(|r| r.id.as_str()), Some("recA"));
        assert_eq!(index.get("200").map(|r| r.id.as_str()), Some("recB"));
    }

    #[test]
    fn records_without_key_are_orphans() {
        let index = KeyIndex::build(vec![
            LocalRecord::new("recA"),
            LocalRecord::new("recB").with(NATURAL_KEY_FIELD, ""),
            LocalRecord::new("recC").with(NATURAL_KEY_FIELD, CellValue::Null),
        ]);
        assert!(index.is_empty());
        assert_eq!(index.orphan_count(), 3);
    }

    #[test]
    fn last_duplicate_wins_and_is_reported() {
        let index = KeyIndex::build(vec![
            LocalRecord::new("first").with(NATURAL_KEY_FIELD, 7),
            LocalRecord::new("second").with(NATURAL_KEY_FIELD, 7),
            LocalRecord::new("third").with(NATURAL_KEY_FIELD, 7),
        ]);
        assert_eq!(index.get("7").map(|r| r.id.as_str()), Some("third"));
        assert_eq!(index.duplicate_keys(), ["7".to_string()]);
    }
}
