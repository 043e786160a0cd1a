use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::Grade;

/// Math skills, each a step on a single prerequisite chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Skill {
    Counting,
    AdditionWithin10,
    AdditionWithin20,
    SubtractionWithin20,
    Multiplication,
}

/// Fixed practice order. Every skill appears exactly once and always after
/// its prerequisite.
pub const LEARNING_PATH: [Skill; 5] = [
    Skill::Counting,
    Skill::AdditionWithin10,
    Skill::AdditionWithin20,
    Skill::SubtractionWithin20,
    Skill::Multiplication,
];

impl Skill {
    pub fn id(self) -> &'static str {
        match self {
            Skill::Counting => "counting",
            Skill::AdditionWithin10 => "additionWithin10",
            Skill::AdditionWithin20 => "additionWithin20",
            Skill::SubtractionWithin20 => "subtractionWithin20",
            Skill::Multiplication => "multiplication",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Skill::Counting => "Counting",
            Skill::AdditionWithin10 => "Addition within 10",
            Skill::AdditionWithin20 => "Addition within 20",
            Skill::SubtractionWithin20 => "Subtraction within 20",
            Skill::Multiplication => "Multiplication",
        }
    }

    pub fn prerequisite(self) -> Option<Skill> {
        match self {
            Skill::Counting => None,
            Skill::AdditionWithin10 => Some(Skill::Counting),
            Skill::AdditionWithin20 => Some(Skill::AdditionWithin10),
            Skill::SubtractionWithin20 => Some(Skill::AdditionWithin20),
            Skill::Multiplication => Some(Skill::SubtractionWithin20),
        }
    }

    /// Grade band the skill is usually taught in.
    pub fn grade(self) -> Grade {
        match self {
            Skill::Counting => Grade::PreK,
            Skill::AdditionWithin10 => Grade::Kindergarten,
            Skill::AdditionWithin20 => Grade::First,
            Skill::SubtractionWithin20 => Grade::Second,
            Skill::Multiplication => Grade::Third,
        }
    }

    pub fn path_index(self) -> usize {
        LEARNING_PATH
            .iter()
            .position(|skill| *skill == self)
            .unwrap_or(LEARNING_PATH.len())
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Skill {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        LEARNING_PATH
            .into_iter()
            .find(|skill| skill.id().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown skill '{value}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn learning_path_lists_each_skill_once() {
        let unique: HashSet<Skill> = LEARNING_PATH.into_iter().collect();
        assert_eq!(unique.len(), LEARNING_PATH.len());
    }

    #[test]
    fn prerequisites_precede_their_skill() {
        for skill in LEARNING_PATH {
            if let Some(prerequisite) = skill.prerequisite() {
                assert!(prerequisite.path_index() < skill.path_index());
            }
        }
        assert_eq!(LEARNING_PATH[0].prerequisite(), None);
    }

    #[test]
    fn grade_bands_never_decrease_along_the_path() {
        for pair in LEARNING_PATH.windows(2) {
            assert!(pair[0].grade() <= pair[1].grade());
        }
    }

    #[test]
    fn ids_round_trip_through_parse() {
        for skill in LEARNING_PATH {
            assert_eq!(skill.id().parse::<Skill>(), Ok(skill));
        }
        assert_eq!(
            serde_json::to_string(&Skill::AdditionWithin10).unwrap(),
            "\"additionWithin10\""
        );
    }
}
