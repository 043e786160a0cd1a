use crate::mastery::{PROFICIENCY_MAX, PROFICIENCY_MIN};
use crate::models::Grade;
use crate::skill::{Skill, LEARNING_PATH};

/// Margin above the mastery threshold for skills below the learner's grade.
pub const BELOW_GRADE_MARGIN: f64 = 0.4;
pub const AT_GRADE_SEED: f64 = 0.0;
pub const ABOVE_GRADE_SEED: f64 = -0.6;
/// Minimum seed for skills the learner asked to focus on.
pub const FOCUS_FLOOR: f64 = AT_GRADE_SEED + 0.3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementProfile {
    pub grade: Grade,
    pub focus_skills: Vec<Skill>,
}

impl PlacementProfile {
    pub fn new(grade: Grade) -> Self {
        Self {
            grade,
            focus_skills: Vec::new(),
        }
    }

    pub fn with_focus(mut self, skills: impl IntoIterator<Item = Skill>) -> Self {
        self.focus_skills.extend(skills);
        self
    }
}

/// Seed proficiency for every skill on the learning path, in path order.
/// Seeds stay within the proficiency range whatever the threshold.
pub fn seed_proficiencies(profile: &PlacementProfile, mastery_threshold: f64) -> Vec<(Skill, f64)> {
    LEARNING_PATH
        .into_iter()
        .map(|skill| {
            let seed = match skill.grade().cmp(&profile.grade) {
                std::cmp::Ordering::Less => mastery_threshold + BELOW_GRADE_MARGIN,
                std::cmp::Ordering::Equal => AT_GRADE_SEED,
                std::cmp::Ordering::Greater => ABOVE_GRADE_SEED,
            };
            let seed = if profile.focus_skills.contains(&skill) {
                seed.max(FOCUS_FLOOR)
            } else {
                seed
            };
            (skill, seed.clamp(PROFICIENCY_MIN, PROFICIENCY_MAX))
        })
        .collect()
}
