pub mod catalog;
pub mod engine;
pub mod state;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Grade, Subject};

/// Lowercase slug identifying a level, e.g. `math-first-grade`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LevelId(String);

impl LevelId {
    pub fn parse(value: &str) -> Option<Self> {
        let valid = !value.is_empty()
            && value
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LevelId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LevelId::parse(&value).ok_or_else(|| format!("malformed level id '{value}'"))
    }
}

impl From<LevelId> for String {
    fn from(id: LevelId) -> Self {
        id.0
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quest {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub id: LevelId,
    pub subject: Subject,
    pub title: String,
    pub grade: Grade,
    pub focus: String,
    pub overview: String,
    /// Always at least 1.
    pub quests_required_for_mastery: u32,
    pub quests: Vec<Quest>,
    pub reward: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelStatus {
    Locked,
    Current,
    Completed,
}

impl fmt::Display for LevelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LevelStatus::Locked => "locked",
            LevelStatus::Current => "current",
            LevelStatus::Completed => "completed",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub attempts: u32,
    pub best_completed_quest_count: u32,
    /// Once set it stays set; marks the level for review with a grown-up.
    pub assisted_unlock: bool,
}

impl LevelRecord {
    pub fn register_attempt(&mut self, completed_quests: u32, assisted: bool) {
        self.attempts += 1;
        self.best_completed_quest_count = self.best_completed_quest_count.max(completed_quests);
        self.assisted_unlock |= assisted;
    }
}

/// Ordered level paths, one per subject. Subjects without levels have an
/// empty path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurriculumCatalog {
    paths: BTreeMap<Subject, Vec<Level>>,
}

impl CurriculumCatalog {
    /// Groups levels by subject, keeping their relative order.
    pub fn new(levels: Vec<Level>) -> Self {
        let mut paths: BTreeMap<Subject, Vec<Level>> =
            Subject::ALL.into_iter().map(|s| (s, Vec::new())).collect();
        for level in levels {
            paths.entry(level.subject).or_default().push(level);
        }
        Self { paths }
    }

    pub fn subjects(&self) -> impl Iterator<Item = Subject> + '_ {
        self.paths.keys().copied()
    }

    pub fn levels(&self, subject: Subject) -> &[Level] {
        self.paths.get(&subject).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn index_of(&self, subject: Subject, id: &LevelId) -> Option<usize> {
        self.levels(subject).iter().position(|level| &level.id == id)
    }

    pub fn level(&self, subject: Subject, id: &LevelId) -> Option<&Level> {
        self.levels(subject).iter().find(|level| &level.id == id)
    }

    pub fn total_levels(&self) -> usize {
        self.paths.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn level(subject: Subject, slug: &str, grade: Grade, required: u32) -> Level {
        Level {
            id: LevelId::parse(slug).unwrap(),
            subject,
            title: slug.to_string(),
            grade,
            focus: String::new(),
            overview: String::new(),
            quests_required_for_mastery: required,
            quests: (0..required.max(1) + 1)
                .map(|i| Quest {
                    title: format!("quest {i}"),
                })
                .collect(),
            reward: "sticker".to_string(),
        }
    }

    /// Two subjects with four levels each; the others stay empty.
    pub fn small_catalog() -> CurriculumCatalog {
        let grades = [Grade::PreK, Grade::Kindergarten, Grade::First, Grade::Second];
        let mut levels = Vec::new();
        for subject in [Subject::Math, Subject::Reading] {
            for (i, grade) in grades.into_iter().enumerate() {
                levels.push(level(subject, &format!("{subject}-{i}"), grade, 2));
            }
        }
        CurriculumCatalog::new(levels)
    }
}
