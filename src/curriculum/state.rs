use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CurriculumCatalog, LevelId, LevelRecord};
use crate::error::StoreError;
use crate::models::{Grade, Subject};
use crate::store::KeyValueStore;

pub const CURRENT_KEY: &str = "curriculum.progress.v2";
pub const LEGACY_KEY: &str = "curriculum.progress.v1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurriculumState {
    pub highest_unlocked: BTreeMap<Subject, usize>,
    pub placement_grade: Option<Grade>,
    pub records: BTreeMap<Subject, BTreeMap<LevelId, LevelRecord>>,
}

impl CurriculumState {
    /// Every catalog subject at cursor 0, no placement, no records.
    pub fn fresh(catalog: &CurriculumCatalog) -> Self {
        Self {
            highest_unlocked: catalog.subjects().map(|subject| (subject, 0)).collect(),
            placement_grade: None,
            records: BTreeMap::new(),
        }
    }

    pub fn cursor(&self, subject: Subject) -> usize {
        self.highest_unlocked.get(&subject).copied().unwrap_or(0)
    }

    pub fn record(&self, subject: Subject, level: &LevelId) -> Option<&LevelRecord> {
        self.records.get(&subject).and_then(|records| records.get(level))
    }
}

// Entries stay untyped until `normalize` so one bad entry never fails the blob.
#[derive(Serialize, Deserialize)]
struct StoredV2 {
    #[serde(default)]
    highest_unlocked: BTreeMap<String, Value>,
    #[serde(default)]
    placement_grade: Option<Value>,
    #[serde(default)]
    level_records: BTreeMap<String, Value>,
}

#[derive(Deserialize)]
struct StoredV1 {
    #[serde(default)]
    highest_unlocked: BTreeMap<String, Value>,
    #[serde(default)]
    placement_grade: Option<Value>,
}

/// Reads the current blob, then the legacy blob, then falls back to a fresh
/// state. Only backend failures are errors.
pub fn load(store: &dyn KeyValueStore, catalog: &CurriculumCatalog) -> Result<CurriculumState, StoreError> {
    if let Some(raw) = store.get(CURRENT_KEY)? {
        match serde_json::from_str::<StoredV2>(&raw) {
            Ok(stored) => {
                debug!("curriculum state loaded");
                return Ok(normalize(
                    catalog,
                    stored.highest_unlocked,
                    stored.placement_grade,
                    stored.level_records,
                ));
            }
            Err(err) => warn!(error = %err, key = CURRENT_KEY, "ignoring unreadable curriculum state"),
        }
    }

    if let Some(raw) = store.get(LEGACY_KEY)? {
        match serde_json::from_str::<StoredV1>(&raw) {
            Ok(stored) => {
                info!("upgrading legacy curriculum state");
                return Ok(normalize(
                    catalog,
                    stored.highest_unlocked,
                    stored.placement_grade,
                    BTreeMap::new(),
                ));
            }
            Err(err) => warn!(error = %err, key = LEGACY_KEY, "ignoring unreadable legacy curriculum state"),
        }
    }

    Ok(CurriculumState::fresh(catalog))
}

/// Always writes the current version.
pub fn save(store: &dyn KeyValueStore, state: &CurriculumState) -> Result<(), StoreError> {
    let mut level_records = BTreeMap::new();
    for (subject, records) in &state.records {
        let mut encoded = serde_json::Map::new();
        for (id, record) in records {
            encoded.insert(id.as_str().to_string(), serde_json::to_value(record)?);
        }
        level_records.insert(subject.as_str().to_string(), Value::Object(encoded));
    }

    let stored = StoredV2 {
        highest_unlocked: state
            .highest_unlocked
            .iter()
            .map(|(subject, cursor)| (subject.as_str().to_string(), Value::from(*cursor)))
            .collect(),
        placement_grade: state
            .placement_grade
            .map(|grade| Value::from(grade.as_str())),
        level_records,
    };
    store.put(CURRENT_KEY, &serde_json::to_string(&stored)?)
}

fn normalize(
    catalog: &CurriculumCatalog,
    cursors: BTreeMap<String, Value>,
    placement_grade: Option<Value>,
    level_records: BTreeMap<String, Value>,
) -> CurriculumState {
    let mut state = CurriculumState::fresh(catalog);

    for (key, raw) in cursors {
        let subject = match key.parse::<Subject>() {
            Ok(subject) if state.highest_unlocked.contains_key(&subject) => subject,
            _ => {
                debug!(subject = %key, "ignoring cursor for unknown subject");
                continue;
            }
        };
        match raw.as_u64() {
            Some(cursor) => {
                let limit = catalog.levels(subject).len();
                let cursor = usize::try_from(cursor).unwrap_or(limit);
                state.highest_unlocked.insert(subject, cursor.min(limit));
            }
            None => warn!(subject = %subject, cursor = %raw, "ignoring malformed cursor"),
        }
    }

    state.placement_grade = match placement_grade {
        None | Some(Value::Null) => None,
        Some(raw) => match raw.as_str().map(str::parse::<Grade>) {
            Some(Ok(grade)) => Some(grade),
            _ => {
                warn!(grade = %raw, "ignoring unknown placement grade");
                None
            }
        },
    };

    for (key, records) in level_records {
        let Ok(subject) = key.parse::<Subject>() else {
            debug!(subject = %key, "ignoring records for unknown subject");
            continue;
        };
        let Value::Object(records) = records else {
            warn!(subject = %subject, "ignoring malformed level records");
            continue;
        };
        let mut parsed = BTreeMap::new();
        for (raw_id, value) in records {
            let Some(id) = LevelId::parse(&raw_id) else {
                warn!(subject = %subject, level = %raw_id, "dropping record with malformed level id");
                continue;
            };
            match serde_json::from_value::<LevelRecord>(value) {
                Ok(record) => {
                    parsed.insert(id, record);
                }
                Err(err) => warn!(subject = %subject, level = %id, error = %err, "dropping unreadable level record"),
            }
        }
        if !parsed.is_empty() {
            state.records.insert(subject, parsed);
        }
    }

    state
}
