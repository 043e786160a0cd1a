use std::sync::Arc;

use tracing::{info, warn};

use super::state::{self, CurriculumState, CURRENT_KEY};
use super::{CurriculumCatalog, Level, LevelId, LevelRecord, LevelStatus};
use crate::error::{EngineError, Result};
use crate::events::{ChangeListener, Listeners, StateChange};
use crate::models::{Grade, Subject};
use crate::store::KeyValueStore;

/// Attempts, counting the pending one, before an assisted unlock can be offered.
pub const ASSISTED_UNLOCK_MIN_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverallProgress {
    pub level_number: usize,
    pub progress_to_next: f64,
    pub completed_levels: usize,
    pub total_levels: usize,
}

/// A level together with its derived status and record, for rendering a path.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelSnapshot<'a> {
    pub level: &'a Level,
    pub status: LevelStatus,
    pub record: LevelRecord,
}

/// Per-subject unlock cursor over the catalog's level paths.
///
/// Levels before the cursor are completed, the level at the cursor is
/// current, everything after is locked. The cursor only moves backwards
/// through placement or reset.
pub struct CurriculumEngine {
    catalog: CurriculumCatalog,
    store: Arc<dyn KeyValueStore>,
    state: CurriculumState,
    listeners: Listeners,
}

impl CurriculumEngine {
    pub fn open(catalog: CurriculumCatalog, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let state = state::load(store.as_ref(), &catalog).map_err(|source| EngineError::Load {
            key: CURRENT_KEY,
            source,
        })?;
        Ok(Self {
            catalog,
            store,
            state,
            listeners: Listeners::default(),
        })
    }

    pub fn subscribe(&mut self, listener: impl ChangeListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn catalog(&self) -> &CurriculumCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &CurriculumState {
        &self.state
    }

    pub fn highest_unlocked_index(&self, subject: Subject) -> usize {
        self.state.cursor(subject)
    }

    pub fn placement_grade(&self) -> Option<Grade> {
        self.state.placement_grade
    }

    /// Unknown levels report as locked.
    pub fn status(&self, level: &LevelId, subject: Subject) -> LevelStatus {
        match self.catalog.index_of(subject, level) {
            Some(index) => status_at(index, self.state.cursor(subject)),
            None => LevelStatus::Locked,
        }
    }

    pub fn record(&self, level: &LevelId, subject: Subject) -> LevelRecord {
        self.state
            .record(subject, level)
            .copied()
            .unwrap_or_default()
    }

    pub fn level_snapshots(&self, subject: Subject) -> Vec<LevelSnapshot<'_>> {
        let cursor = self.state.cursor(subject);
        self.catalog
            .levels(subject)
            .iter()
            .enumerate()
            .map(|(index, level)| LevelSnapshot {
                level,
                status: status_at(index, cursor),
                record: self.record(&level.id, subject),
            })
            .collect()
    }

    /// Records the attempt and unlocks the next level unless the cursor has
    /// already moved past this one.
    pub fn mark_level_completed(
        &mut self,
        level: &LevelId,
        subject: Subject,
        completed_quests: u32,
        assisted: bool,
    ) -> Result<()> {
        let Some(index) = self.catalog.index_of(subject, level) else {
            warn!(subject = %subject, level = %level, "completion for unknown level ignored");
            return Ok(());
        };

        let mut next = self.state.clone();
        register_attempt(&mut next, subject, level, completed_quests, assisted);
        let cursor = next.cursor(subject);
        if cursor <= index {
            let limit = self.catalog.levels(subject).len();
            next.highest_unlocked.insert(subject, (index + 1).min(limit));
        }
        let highest_unlocked_index = next.cursor(subject);

        self.commit(next)?;
        info!(
            subject = %subject,
            level = %level,
            assisted,
            highest_unlocked_index,
            "level completed"
        );
        self.listeners.notify(&StateChange::LevelCompleted {
            subject,
            level: level.clone(),
            highest_unlocked_index,
        });
        Ok(())
    }

    /// Records an attempt that ended before the level was passed.
    pub fn record_incomplete_attempt(
        &mut self,
        level: &LevelId,
        subject: Subject,
        completed_quests: u32,
    ) -> Result<()> {
        if self.catalog.index_of(subject, level).is_none() {
            warn!(subject = %subject, level = %level, "attempt for unknown level ignored");
            return Ok(());
        }

        let mut next = self.state.clone();
        register_attempt(&mut next, subject, level, completed_quests, false);
        self.commit(next)?;
        self.listeners.notify(&StateChange::LevelAttempted {
            subject,
            level: level.clone(),
        });
        Ok(())
    }

    /// True for a current level that keeps being narrowly missed: at least
    /// three attempts including this one, a best result one quest short of
    /// mastery (never below one), and a pending attempt that does not pass.
    pub fn should_offer_assisted_unlock(
        &self,
        level: &LevelId,
        subject: Subject,
        pending_completed_quests: u32,
    ) -> bool {
        if self.status(level, subject) != LevelStatus::Current {
            return false;
        }
        let Some(definition) = self.catalog.level(subject, level) else {
            return false;
        };
        let record = self.record(level, subject);
        if record.assisted_unlock {
            return false;
        }

        let required = definition.quests_required_for_mastery;
        let attempts = record.attempts + 1;
        let best = record.best_completed_quest_count.max(pending_completed_quests);
        let near_miss = required.saturating_sub(1).max(1);

        attempts >= ASSISTED_UNLOCK_MIN_ATTEMPTS
            && best >= near_miss
            && pending_completed_quests < required
    }

    /// Moves every subject to its first level for `grade` (or the start of
    /// the path) and clears level records.
    pub fn apply_placement(&mut self, grade: Grade) -> Result<()> {
        let mut next = self.state.clone();
        for subject in self.catalog.subjects() {
            let levels = self.catalog.levels(subject);
            let index = levels
                .iter()
                .position(|level| level.grade == grade)
                .unwrap_or(0)
                .min(levels.len());
            next.highest_unlocked.insert(subject, index);
            next.records.remove(&subject);
        }
        next.placement_grade = Some(grade);

        self.commit(next)?;
        info!(grade = %grade, "curriculum placement applied");
        self.listeners
            .notify(&StateChange::CurriculumPlaced { grade });
        Ok(())
    }

    pub fn reset_progress(&mut self) -> Result<()> {
        let next = CurriculumState::fresh(&self.catalog);
        self.commit(next)?;
        info!("curriculum progress reset");
        self.listeners.notify(&StateChange::CurriculumReset);
        Ok(())
    }

    /// Placement grade is kept; only the subject's cursor and records clear.
    pub fn reset_subject(&mut self, subject: Subject) -> Result<()> {
        let mut next = self.state.clone();
        next.highest_unlocked.insert(subject, 0);
        next.records.remove(&subject);
        self.commit(next)?;
        info!(subject = %subject, "subject progress reset");
        self.listeners
            .notify(&StateChange::SubjectReset { subject });
        Ok(())
    }

    /// One cross-subject "level" for the overview screen.
    pub fn overall_progress(&self) -> OverallProgress {
        let mut completed_levels = 0;
        let mut total_levels = 0;
        let mut best_fraction: Option<f64> = None;

        for subject in self.catalog.subjects() {
            let levels = self.catalog.levels(subject);
            let cursor = self.state.cursor(subject).min(levels.len());
            completed_levels += cursor;
            total_levels += levels.len();

            if let Some(level) = levels.get(cursor) {
                let record = self.record(&level.id, subject);
                let fraction = f64::from(record.best_completed_quest_count)
                    / f64::from(level.quests_required_for_mastery.max(1));
                best_fraction = Some(best_fraction.map_or(fraction, |best| best.max(fraction)));
            }
        }

        let progress_to_next = match best_fraction {
            Some(fraction) => fraction,
            None if total_levels > 0 => 1.0,
            None => 0.0,
        };

        OverallProgress {
            level_number: (completed_levels + 1).min(total_levels.max(1)),
            progress_to_next,
            completed_levels,
            total_levels,
        }
    }

    fn commit(&mut self, next: CurriculumState) -> Result<()> {
        state::save(self.store.as_ref(), &next).map_err(|source| EngineError::Persist {
            key: CURRENT_KEY,
            source,
        })?;
        self.state = next;
        Ok(())
    }
}

fn status_at(index: usize, cursor: usize) -> LevelStatus {
    if index < cursor {
        LevelStatus::Completed
    } else if index == cursor {
        LevelStatus::Current
    } else {
        LevelStatus::Locked
    }
}

fn register_attempt(
    state: &mut CurriculumState,
    subject: Subject,
    level: &LevelId,
    completed_quests: u32,
    assisted: bool,
) {
    state
        .records
        .entry(subject)
        .or_default()
        .entry(level.clone())
        .or_default()
        .register_attempt(completed_quests, assisted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::fixtures::{level, small_catalog};
    use crate::error::StoreError;
    use crate::store::MemoryStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn id(slug: &str) -> LevelId {
        LevelId::parse(slug).unwrap()
    }

    fn engine_with(store: &MemoryStore) -> CurriculumEngine {
        CurriculumEngine::open(small_catalog(), Arc::new(store.clone())).unwrap()
    }

    struct ReadOnlyStore(MemoryStore);

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn put(&self, _key: &str, _value: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("read-only".to_string()))
        }

        fn remove(&self, _key: &str) -> std::result::Result<(), StoreError> {
            Err(StoreError::Backend("read-only".to_string()))
        }

        fn keys(&self) -> std::result::Result<Vec<String>, StoreError> {
            self.0.keys()
        }
    }

    #[test]
    fn statuses_derive_from_the_cursor() {
        let mut engine = engine_with(&MemoryStore::new());
        assert_eq!(engine.status(&id("math-0"), Subject::Math), LevelStatus::Current);
        assert_eq!(engine.status(&id("math-1"), Subject::Math), LevelStatus::Locked);

        engine
            .mark_level_completed(&id("math-0"), Subject::Math, 2, false)
            .unwrap();
        assert_eq!(engine.status(&id("math-0"), Subject::Math), LevelStatus::Completed);
        assert_eq!(engine.status(&id("math-1"), Subject::Math), LevelStatus::Current);
        assert_eq!(engine.status(&id("reading-0"), Subject::Reading), LevelStatus::Current);
        assert_eq!(engine.record(&id("math-0"), Subject::Math).attempts, 1);
    }

    #[test]
    fn unknown_levels_are_locked_and_ignored() {
        let mut engine = engine_with(&MemoryStore::new());
        assert_eq!(engine.status(&id("math-9"), Subject::Math), LevelStatus::Locked);
        assert_eq!(engine.status(&id("math-0"), Subject::Reading), LevelStatus::Locked);

        engine
            .mark_level_completed(&id("math-9"), Subject::Math, 3, false)
            .unwrap();
        engine
            .record_incomplete_attempt(&id("math-9"), Subject::Math, 1)
            .unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 0);
        assert!(engine.state().records.is_empty());
    }

    #[test]
    fn completing_a_passed_level_never_regresses_the_cursor() {
        let mut engine = engine_with(&MemoryStore::new());
        for slug in ["math-0", "math-1", "math-2", "math-3"] {
            engine.mark_level_completed(&id(slug), Subject::Math, 2, false).unwrap();
        }
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 4);

        engine
            .mark_level_completed(&id("math-2"), Subject::Math, 2, false)
            .unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 4);
        assert_eq!(engine.record(&id("math-2"), Subject::Math).attempts, 2);
    }

    #[test]
    fn completing_a_level_twice_does_not_double_advance() {
        let mut engine = engine_with(&MemoryStore::new());
        engine.mark_level_completed(&id("math-0"), Subject::Math, 2, false).unwrap();
        engine.mark_level_completed(&id("math-0"), Subject::Math, 2, false).unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 1);
    }

    #[test]
    fn incomplete_attempts_track_best_without_advancing() {
        let mut engine = engine_with(&MemoryStore::new());
        engine.record_incomplete_attempt(&id("math-0"), Subject::Math, 1).unwrap();
        engine.record_incomplete_attempt(&id("math-0"), Subject::Math, 0).unwrap();

        let record = engine.record(&id("math-0"), Subject::Math);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.best_completed_quest_count, 1);
        assert!(!record.assisted_unlock);
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 0);
    }

    #[test]
    fn assisted_unlock_after_repeated_near_misses() {
        let mut engine = engine_with(&MemoryStore::new());
        let math0 = id("math-0");
        engine.record_incomplete_attempt(&math0, Subject::Math, 1).unwrap();
        engine.record_incomplete_attempt(&math0, Subject::Math, 1).unwrap();

        assert!(engine.should_offer_assisted_unlock(&math0, Subject::Math, 1));
        // A passing attempt never needs help.
        assert!(!engine.should_offer_assisted_unlock(&math0, Subject::Math, 2));
    }

    #[test]
    fn assisted_unlock_needs_three_attempts_and_a_near_miss() {
        let mut engine = engine_with(&MemoryStore::new());
        let math0 = id("math-0");
        engine.record_incomplete_attempt(&math0, Subject::Math, 0).unwrap();
        assert!(!engine.should_offer_assisted_unlock(&math0, Subject::Math, 1));

        engine.record_incomplete_attempt(&math0, Subject::Math, 0).unwrap();
        assert!(!engine.should_offer_assisted_unlock(&math0, Subject::Math, 0));
        assert!(engine.should_offer_assisted_unlock(&math0, Subject::Math, 1));
    }

    #[test]
    fn assisted_unlock_is_only_offered_for_the_current_level() {
        let mut engine = engine_with(&MemoryStore::new());
        let math0 = id("math-0");
        let math1 = id("math-1");
        for _ in 0..3 {
            engine.record_incomplete_attempt(&math1, Subject::Math, 1).unwrap();
        }
        assert!(!engine.should_offer_assisted_unlock(&math1, Subject::Math, 1));

        engine.record_incomplete_attempt(&math0, Subject::Math, 1).unwrap();
        engine.record_incomplete_attempt(&math0, Subject::Math, 1).unwrap();
        engine.mark_level_completed(&math0, Subject::Math, 1, true).unwrap();
        assert!(engine.record(&math0, Subject::Math).assisted_unlock);
        assert_eq!(engine.status(&math1, Subject::Math), LevelStatus::Current);
        assert!(engine.should_offer_assisted_unlock(&math1, Subject::Math, 1));
    }

    #[test]
    fn assisted_flag_blocks_a_second_offer() {
        let store = MemoryStore::new();
        store
            .put(
                CURRENT_KEY,
                r#"{"highest_unlocked":{"math":0},"level_records":{"math":{"math-0":
                    {"attempts":5,"best_completed_quest_count":1,"assisted_unlock":true}}}}"#,
            )
            .unwrap();
        let engine = engine_with(&store);
        assert!(!engine.should_offer_assisted_unlock(&id("math-0"), Subject::Math, 1));
    }

    #[test]
    fn single_quest_levels_never_offer_assistance() {
        let catalog = CurriculumCatalog::new(vec![level(Subject::Science, "sci-0", Grade::PreK, 1)]);
        let mut engine = CurriculumEngine::open(catalog, Arc::new(MemoryStore::new())).unwrap();
        let sci0 = id("sci-0");
        for _ in 0..5 {
            engine.record_incomplete_attempt(&sci0, Subject::Science, 0).unwrap();
        }
        assert!(!engine.should_offer_assisted_unlock(&sci0, Subject::Science, 0));
        assert!(!engine.should_offer_assisted_unlock(&sci0, Subject::Science, 1));
    }

    #[test]
    fn placement_jumps_to_the_matching_grade_and_clears_records() {
        let store = MemoryStore::new();
        let mut engine = engine_with(&store);
        engine.record_incomplete_attempt(&id("math-0"), Subject::Math, 1).unwrap();

        engine.apply_placement(Grade::First).unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 2);
        assert_eq!(engine.highest_unlocked_index(Subject::Reading), 2);
        assert_eq!(engine.highest_unlocked_index(Subject::Science), 0);
        assert_eq!(engine.placement_grade(), Some(Grade::First));
        assert!(engine.state().records.is_empty());
        assert_eq!(engine.status(&id("math-1"), Subject::Math), LevelStatus::Completed);

        engine.apply_placement(Grade::Sixth).unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 0);
    }

    #[test]
    fn resets_clear_cursors_records_and_placement() {
        let mut engine = engine_with(&MemoryStore::new());
        engine.apply_placement(Grade::Kindergarten).unwrap();
        engine.mark_level_completed(&id("reading-1"), Subject::Reading, 2, false).unwrap();
        engine.mark_level_completed(&id("math-1"), Subject::Math, 2, false).unwrap();

        engine.reset_subject(Subject::Math).unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 0);
        assert_eq!(engine.record(&id("math-1"), Subject::Math), LevelRecord::default());
        assert_eq!(engine.highest_unlocked_index(Subject::Reading), 2);
        assert_eq!(engine.placement_grade(), Some(Grade::Kindergarten));

        engine.reset_progress().unwrap();
        assert_eq!(engine.highest_unlocked_index(Subject::Reading), 0);
        assert_eq!(engine.placement_grade(), None);
        assert!(engine.state().records.is_empty());
    }

    #[test]
    fn overall_progress_combines_subjects() {
        let mut engine = engine_with(&MemoryStore::new());
        let fresh = engine.overall_progress();
        assert_eq!(
            fresh,
            OverallProgress {
                level_number: 1,
                progress_to_next: 0.0,
                completed_levels: 0,
                total_levels: 8,
            }
        );

        engine.mark_level_completed(&id("math-0"), Subject::Math, 2, false).unwrap();
        engine.mark_level_completed(&id("math-1"), Subject::Math, 2, false).unwrap();
        engine.record_incomplete_attempt(&id("math-2"), Subject::Math, 1).unwrap();
        engine.mark_level_completed(&id("reading-0"), Subject::Reading, 2, false).unwrap();

        let progress = engine.overall_progress();
        assert_eq!(progress.completed_levels, 3);
        assert_eq!(progress.level_number, 4);
        assert!((progress.progress_to_next - 0.5).abs() < 1e-12);
    }

    #[test]
    fn overall_progress_is_full_when_every_path_is_done() {
        let mut engine = engine_with(&MemoryStore::new());
        for subject in [Subject::Math, Subject::Reading] {
            for i in 0..4 {
                engine
                    .mark_level_completed(&id(&format!("{subject}-{i}")), subject, 2, false)
                    .unwrap();
            }
        }
        let progress = engine.overall_progress();
        assert_eq!(progress.completed_levels, 8);
        assert_eq!(progress.level_number, 8);
        assert_eq!(progress.progress_to_next, 1.0);
    }

    #[test]
    fn state_round_trips_through_the_store() {
        let store = MemoryStore::new();
        let mut engine = engine_with(&store);
        engine.apply_placement(Grade::Kindergarten).unwrap();
        engine.mark_level_completed(&id("math-1"), Subject::Math, 2, false).unwrap();
        engine.record_incomplete_attempt(&id("math-2"), Subject::Math, 1).unwrap();
        engine.record_incomplete_attempt(&id("reading-1"), Subject::Reading, 0).unwrap();

        let reloaded = engine_with(&store);
        assert_eq!(reloaded.state(), engine.state());
        for subject in Subject::ALL {
            assert_eq!(reloaded.level_snapshots(subject), engine.level_snapshots(subject));
        }
    }

    #[test]
    fn failed_write_keeps_previous_state_and_stays_silent() {
        let seeded = MemoryStore::new();
        {
            let mut engine = engine_with(&seeded);
            engine.mark_level_completed(&id("math-0"), Subject::Math, 2, false).unwrap();
        }

        let mut engine =
            CurriculumEngine::open(small_catalog(), Arc::new(ReadOnlyStore(seeded))).unwrap();
        let seen = Rc::new(RefCell::new(0));
        let counter = seen.clone();
        engine.subscribe(move |_: &StateChange| *counter.borrow_mut() += 1);

        let err = engine
            .mark_level_completed(&id("math-1"), Subject::Math, 2, false)
            .unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(engine.highest_unlocked_index(Subject::Math), 1);
        assert_eq!(engine.record(&id("math-1"), Subject::Math), LevelRecord::default());
        assert!(engine.reset_progress().is_err());
        assert_eq!(*seen.borrow(), 0);
    }

    #[test]
    fn listeners_receive_level_transitions() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut engine = engine_with(&MemoryStore::new());
        engine.subscribe(move |change: &StateChange| sink.borrow_mut().push(change.clone()));

        engine.mark_level_completed(&id("math-0"), Subject::Math, 2, false).unwrap();
        engine.apply_placement(Grade::PreK).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                StateChange::LevelCompleted {
                    subject: Subject::Math,
                    level: id("math-0"),
                    highest_unlocked_index: 1,
                },
                StateChange::CurriculumPlaced { grade: Grade::PreK },
            ]
        );
    }
}
