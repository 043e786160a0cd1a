use crate::skill::{Skill, LEARNING_PATH};

pub const PROFICIENCY_MIN: f64 = -2.5;
pub const PROFICIENCY_MAX: f64 = 2.5;
pub const MIN_DIFFICULTY: f64 = 0.0;
pub const MAX_DIFFICULTY: f64 = 1.5;
pub const DEFAULT_MASTERY_THRESHOLD: f64 = 1.0;
/// Step size of the rating update; small so one bad session never erases progress.
pub const DEFAULT_K_FACTOR: f64 = 0.2;

/// Elo-style proficiency model over the fixed learning path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasteryEngine {
    mastery_threshold: f64,
    k_factor: f64,
}

impl Default for MasteryEngine {
    fn default() -> Self {
        Self {
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            k_factor: DEFAULT_K_FACTOR,
        }
    }
}

impl MasteryEngine {
    pub fn new(mastery_threshold: f64, k_factor: f64) -> Self {
        Self {
            mastery_threshold,
            k_factor,
        }
    }

    pub fn mastery_threshold(&self) -> f64 {
        self.mastery_threshold
    }

    pub fn k_factor(&self) -> f64 {
        self.k_factor
    }

    pub fn is_mastered(&self, proficiency: f64) -> bool {
        proficiency >= self.mastery_threshold
    }

    /// First skill on the path still below the mastery threshold, or the
    /// last skill once everything is mastered.
    pub fn next_focus_skill<F>(&self, proficiency: F) -> Skill
    where
        F: Fn(Skill) -> f64,
    {
        LEARNING_PATH
            .into_iter()
            .find(|skill| !self.is_mastered(proficiency(*skill)))
            .unwrap_or(LEARNING_PATH[LEARNING_PATH.len() - 1])
    }

    pub fn updated_proficiency(&self, current: f64, correct: bool, difficulty: f64) -> f64 {
        let expected = expected_score(current, difficulty);
        let actual = if correct { 1.0 } else { 0.0 };
        (current + self.k_factor * (actual - expected)).clamp(PROFICIENCY_MIN, PROFICIENCY_MAX)
    }
}

/// Probability that a learner at `proficiency` answers a problem of `difficulty` correctly.
pub fn expected_score(proficiency: f64, difficulty: f64) -> f64 {
    1.0 / (1.0 + (-(proficiency - difficulty)).exp())
}

/// Maps the proficiency scale onto the problem difficulty scale.
pub fn target_difficulty(proficiency: f64) -> f64 {
    let proficiency = proficiency.clamp(PROFICIENCY_MIN, PROFICIENCY_MAX);
    (proficiency - PROFICIENCY_MIN) / (PROFICIENCY_MAX - PROFICIENCY_MIN) * MAX_DIFFICULTY
}
