use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::skill::Skill;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Math,
    Reading,
    Science,
    Writing,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Math,
        Subject::Reading,
        Subject::Science,
        Subject::Writing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Reading => "reading",
            Subject::Science => "science",
            Subject::Writing => "writing",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Subject::ALL
            .into_iter()
            .find(|subject| subject.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown subject '{value}'"))
    }
}

/// Grade bands, ordered from youngest to oldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    PreK,
    Kindergarten,
    First,
    Second,
    Third,
    Fourth,
    Fifth,
    Sixth,
}

impl Grade {
    pub const ALL: [Grade; 8] = [
        Grade::PreK,
        Grade::Kindergarten,
        Grade::First,
        Grade::Second,
        Grade::Third,
        Grade::Fourth,
        Grade::Fifth,
        Grade::Sixth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::PreK => "pre_k",
            Grade::Kindergarten => "kindergarten",
            Grade::First => "first",
            Grade::Second => "second",
            Grade::Third => "third",
            Grade::Fourth => "fourth",
            Grade::Fifth => "fifth",
            Grade::Sixth => "sixth",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::PreK => "Pre-K",
            Grade::Kindergarten => "Kindergarten",
            Grade::First => "Grade 1",
            Grade::Second => "Grade 2",
            Grade::Third => "Grade 3",
            Grade::Fourth => "Grade 4",
            Grade::Fifth => "Grade 5",
            Grade::Sixth => "Grade 6",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Grade {
    type Err = String;

    /// Accepts the storage form (`pre_k`), a short alias (`k`, `1`..`6`) or the label.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        let grade = match normalized.as_str() {
            "prek" | "pre-k" | "pre_k" => Grade::PreK,
            "k" | "kindergarten" => Grade::Kindergarten,
            "1" | "first" | "grade 1" => Grade::First,
            "2" | "second" | "grade 2" => Grade::Second,
            "3" | "third" | "grade 3" => Grade::Third,
            "4" | "fourth" | "grade 4" => Grade::Fourth,
            "5" | "fifth" | "grade 5" => Grade::Fifth,
            "6" | "sixth" | "grade 6" => Grade::Sixth,
            _ => return Err(format!("unknown grade '{value}'")),
        };
        Ok(grade)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillProgress {
    pub skill: Skill,
    pub subject: Subject,
    pub proficiency: f64,
    /// Consecutive correct answers; any miss resets it.
    pub streak: u32,
    pub last_reviewed: Option<NaiveDateTime>,
}

impl SkillProgress {
    pub fn new(skill: Skill, subject: Subject) -> Self {
        Self {
            skill,
            subject,
            proficiency: 0.0,
            streak: 0,
            last_reviewed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProgress {
    pub subject: Subject,
    pub daily_exercise_count: u32,
    pub total_sessions: u32,
    pub total_correct_answers: u32,
    pub last_exercise_date: Option<NaiveDateTime>,
}

impl SubjectProgress {
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            daily_exercise_count: 0,
            total_sessions: 0,
            total_correct_answers: 0,
            last_exercise_date: None,
        }
    }

    /// Returns a copy with the daily counter cleared when `now` falls on a
    /// different calendar day than the last exercise.
    pub fn as_of(&self, now: NaiveDateTime) -> Self {
        let mut view = self.clone();
        match self.last_exercise_date {
            Some(last) if last.date() == now.date() => {}
            _ => view.daily_exercise_count = 0,
        }
        view
    }
}

/// Emitted once per recorded session for achievement reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub subject: Subject,
    pub total_sessions: u32,
    pub total_correct_answers: u32,
    pub newly_mastered_skills: Vec<Skill>,
}
