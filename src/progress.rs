use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result, StoreError};
use crate::events::{AchievementReporter, ChangeListener, Listeners, StateChange};
use crate::generator::ProblemResult;
use crate::mastery::MasteryEngine;
use crate::models::{SessionReport, SkillProgress, Subject, SubjectProgress};
use crate::placement::{self, PlacementProfile};
use crate::skill::{Skill, LEARNING_PATH};
use crate::store::KeyValueStore;

pub const PROGRESS_KEY: &str = "progress.v1";
pub const DEFAULT_FREE_SESSIONS_PER_DAY: u32 = 1;
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
struct ProgressState {
    subjects: BTreeMap<Subject, SubjectProgress>,
    skills: BTreeMap<(Subject, Skill), SkillProgress>,
}

#[derive(Serialize, Deserialize)]
struct ProgressSnapshot {
    version: u32,
    #[serde(default)]
    subjects: Vec<SubjectProgress>,
    #[serde(default)]
    skills: Vec<SkillProgress>,
}

impl ProgressState {
    fn decode(raw: &str) -> serde_json::Result<Self> {
        let snapshot: ProgressSnapshot = serde_json::from_str(raw)?;
        Ok(Self {
            subjects: snapshot
                .subjects
                .into_iter()
                .map(|record| (record.subject, record))
                .collect(),
            skills: snapshot
                .skills
                .into_iter()
                .map(|record| ((record.subject, record.skill), record))
                .collect(),
        })
    }

    fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(&ProgressSnapshot {
            version: SNAPSHOT_VERSION,
            subjects: self.subjects.values().cloned().collect(),
            skills: self.skills.values().cloned().collect(),
        })
    }
}

/// Owns subject and skill progress and writes the whole snapshot back after
/// every mutation.
///
/// Not internally synchronized: a multi-threaded host must serialize calls.
pub struct ProgressStore {
    store: Arc<dyn KeyValueStore>,
    mastery: MasteryEngine,
    reporter: Box<dyn AchievementReporter>,
    free_sessions_per_day: u32,
    state: ProgressState,
    recent_prompts: HashMap<Skill, HashSet<String>>,
    listeners: Listeners,
}

impl ProgressStore {
    /// Reads the persisted snapshot. A snapshot that cannot be decoded is
    /// replaced by fresh defaults; a failing backend is an error.
    pub fn open(
        store: Arc<dyn KeyValueStore>,
        mastery: MasteryEngine,
        reporter: Box<dyn AchievementReporter>,
    ) -> Result<Self> {
        let raw = store.get(PROGRESS_KEY).map_err(|source| EngineError::Load {
            key: PROGRESS_KEY,
            source,
        })?;

        let state = match raw {
            Some(raw) => ProgressState::decode(&raw).unwrap_or_else(|err| {
                warn!(error = %err, "discarding unreadable progress snapshot");
                ProgressState::default()
            }),
            None => ProgressState::default(),
        };
        debug!(
            subjects = state.subjects.len(),
            skills = state.skills.len(),
            "progress loaded"
        );

        Ok(Self {
            store,
            mastery,
            reporter,
            free_sessions_per_day: DEFAULT_FREE_SESSIONS_PER_DAY,
            state,
            recent_prompts: HashMap::new(),
            listeners: Listeners::default(),
        })
    }

    pub fn with_free_sessions_per_day(mut self, sessions: u32) -> Self {
        self.free_sessions_per_day = sessions;
        self
    }

    pub fn subscribe(&mut self, listener: impl ChangeListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn mastery(&self) -> &MasteryEngine {
        &self.mastery
    }

    /// Subject counters as seen at `now`, with the daily reset applied.
    pub fn subject_progress(&self, subject: Subject, now: NaiveDateTime) -> SubjectProgress {
        self.state
            .subjects
            .get(&subject)
            .map(|record| record.as_of(now))
            .unwrap_or_else(|| SubjectProgress::new(subject))
    }

    pub fn skill_progress(&self, skill: Skill, subject: Subject) -> SkillProgress {
        self.state
            .skills
            .get(&(subject, skill))
            .cloned()
            .unwrap_or_else(|| SkillProgress::new(skill, subject))
    }

    pub fn proficiency(&self, skill: Skill, subject: Subject) -> f64 {
        self.state
            .skills
            .get(&(subject, skill))
            .map(|record| record.proficiency)
            .unwrap_or(0.0)
    }

    /// Every skill's progress for `subject`, in learning-path order.
    pub fn skills(&self, subject: Subject) -> Vec<SkillProgress> {
        LEARNING_PATH
            .into_iter()
            .map(|skill| self.skill_progress(skill, subject))
            .collect()
    }

    pub fn focus_skill(&self, subject: Subject) -> Skill {
        self.mastery
            .next_focus_skill(|skill| self.proficiency(skill, subject))
    }

    pub fn focus_skill_proficiency(&self, subject: Subject) -> f64 {
        self.proficiency(self.focus_skill(subject), subject)
    }

    pub fn can_start_exercise(&self, subject: Subject, now: NaiveDateTime) -> bool {
        self.subject_progress(subject, now).daily_exercise_count < self.free_sessions_per_day
    }

    /// Prompts already shown for `skill` since the process started.
    pub fn recent_prompts(&self, skill: Skill) -> HashSet<String> {
        self.recent_prompts.get(&skill).cloned().unwrap_or_default()
    }

    /// Applies a finished session. Counters and every skill update are
    /// written in one snapshot; on failure nothing changes.
    pub fn record_session(
        &mut self,
        subject: Subject,
        results: &[ProblemResult],
        now: NaiveDateTime,
    ) -> Result<SessionReport> {
        let mut next = self.state.clone();

        let correct = results.iter().filter(|result| result.correct).count() as u32;
        let counters = next
            .subjects
            .entry(subject)
            .or_insert_with(|| SubjectProgress::new(subject));
        *counters = counters.as_of(now);
        counters.daily_exercise_count += 1;
        counters.total_sessions += 1;
        counters.total_correct_answers += correct;
        counters.last_exercise_date = Some(now);
        let (total_sessions, total_correct_answers) =
            (counters.total_sessions, counters.total_correct_answers);

        // A skill counts once, on the first update that crosses the threshold.
        let mut newly_mastered_skills: Vec<Skill> = Vec::new();
        for result in results {
            let skill = result.problem.skill;
            let record = next
                .skills
                .entry((subject, skill))
                .or_insert_with(|| SkillProgress::new(skill, subject));
            let before = record.proficiency;

            record.proficiency = self.mastery.updated_proficiency(
                before,
                result.correct,
                result.problem.difficulty,
            );
            record.streak = if result.correct { record.streak + 1 } else { 0 };
            record.last_reviewed = Some(now);

            if !self.mastery.is_mastered(before)
                && self.mastery.is_mastered(record.proficiency)
                && !newly_mastered_skills.contains(&skill)
            {
                newly_mastered_skills.push(skill);
            }
        }

        self.commit(next)?;

        for result in results {
            self.recent_prompts
                .entry(result.problem.skill)
                .or_default()
                .insert(result.problem.prompt.clone());
        }

        let report = SessionReport {
            subject,
            total_sessions,
            total_correct_answers,
            newly_mastered_skills,
        };
        if !report.newly_mastered_skills.is_empty() {
            info!(subject = %subject, skills = ?report.newly_mastered_skills, "skills mastered");
        }
        self.listeners
            .notify(&StateChange::SessionRecorded { subject });
        self.reporter.record_session(&report);
        Ok(report)
    }

    /// Overwrites every skill's proficiency for `subject` with its placement seed.
    pub fn apply_placement(&mut self, profile: &PlacementProfile, subject: Subject) -> Result<()> {
        let mut next = self.state.clone();
        for (skill, seed) in placement::seed_proficiencies(profile, self.mastery.mastery_threshold()) {
            next.skills
                .entry((subject, skill))
                .or_insert_with(|| SkillProgress::new(skill, subject))
                .proficiency = seed;
        }

        self.commit(next)?;
        info!(subject = %subject, grade = %profile.grade, "placement seeded");
        self.listeners.notify(&StateChange::PlacementSeeded {
            subject,
            grade: profile.grade,
        });
        Ok(())
    }

    fn commit(&mut self, next: ProgressState) -> Result<()> {
        let persist = |source: StoreError| EngineError::Persist {
            key: PROGRESS_KEY,
            source,
        };
        let encoded = next.encode().map_err(|err| persist(err.into()))?;
        self.store.put(PROGRESS_KEY, &encoded).map_err(persist)?;
        self.state = next;
        Ok(())
    }
}
