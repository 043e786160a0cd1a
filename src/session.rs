use std::collections::HashSet;

use rand::Rng;

use crate::generator::{self, Problem};
use crate::models::Subject;
use crate::progress::ProgressStore;
use crate::skill::Skill;

pub const MAX_PROMPT_ATTEMPTS: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub subject: Subject,
    pub skill: Skill,
    pub proficiency: f64,
    pub problems: Vec<Problem>,
}

/// Problems for the subject's focus skill, avoiding prompts seen recently.
pub fn plan_session<R>(progress: &ProgressStore, subject: Subject, count: usize, rng: &mut R) -> SessionPlan
where
    R: Rng + ?Sized,
{
    let skill = progress.focus_skill(subject);
    let proficiency = progress.proficiency(skill, subject);
    let recent = progress.recent_prompts(skill);
    let problems = pick_unique(skill, proficiency, count, &recent, rng);

    SessionPlan {
        subject,
        skill,
        proficiency,
        problems,
    }
}

/// Draws `count` problems, retrying each slot up to [`MAX_PROMPT_ATTEMPTS`]
/// times while the prompt is disallowed or already chosen. A slot that runs
/// out of attempts keeps its last candidate.
pub fn pick_unique<R>(
    skill: Skill,
    proficiency: f64,
    count: usize,
    disallowed: &HashSet<String>,
    rng: &mut R,
) -> Vec<Problem>
where
    R: Rng + ?Sized,
{
    let mut chosen: Vec<Problem> = Vec::with_capacity(count);
    let mut used: HashSet<String> = HashSet::new();

    for _ in 0..count {
        let mut candidate = generator::generate_problem(skill, proficiency, rng);
        for _ in 1..MAX_PROMPT_ATTEMPTS {
            if !disallowed.contains(&candidate.prompt) && !used.contains(&candidate.prompt) {
                break;
            }
            candidate = generator::generate_problem(skill, proficiency, rng);
        }
        used.insert(candidate.prompt.clone());
        chosen.push(candidate);
    }

    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TracingReporter;
    use crate::generator::ProblemResult;
    use crate::mastery::{MasteryEngine, PROFICIENCY_MIN};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn prompts_are_unique_when_the_range_allows_it() {
        let mut rng = StdRng::seed_from_u64(9);
        let problems = pick_unique(Skill::AdditionWithin20, 0.0, 8, &HashSet::new(), &mut rng);
        let prompts: HashSet<&str> = problems.iter().map(|p| p.prompt.as_str()).collect();
        assert_eq!(prompts.len(), 8);
    }

    #[test]
    fn exhausted_attempts_still_fill_every_slot() {
        // At minimum difficulty counting only has five distinct prompts.
        let mut rng = StdRng::seed_from_u64(1);
        let problems = pick_unique(Skill::Counting, PROFICIENCY_MIN, 8, &HashSet::new(), &mut rng);
        assert_eq!(problems.len(), 8);
    }

    #[test]
    fn disallowed_prompts_are_avoided() {
        let mut rng = StdRng::seed_from_u64(21);
        let blocked: HashSet<String> = (0..=4).map(|b| format!("5 + {b} = ?")).collect();
        let problems = pick_unique(Skill::AdditionWithin10, 0.0, 4, &blocked, &mut rng);
        assert!(problems.iter().all(|p| !blocked.contains(&p.prompt)));
    }

    #[test]
    fn plan_targets_the_focus_skill_and_skips_recent_prompts() {
        let mut progress = ProgressStore::open(
            Arc::new(MemoryStore::new()),
            MasteryEngine::default(),
            Box::new(TracingReporter),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let first = plan_session(&progress, Subject::Math, 3, &mut rng);
        assert_eq!(first.skill, Skill::Counting);
        assert_eq!(first.problems.len(), 3);

        let now = NaiveDate::from_ymd_opt(2026, 5, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .unwrap();
        let results: Vec<ProblemResult> = first
            .problems
            .iter()
            .cloned()
            .map(|problem| {
                let answer = problem.correct_answer;
                ProblemResult::grade(problem, answer)
            })
            .collect();
        progress.record_session(Subject::Math, &results, now).unwrap();

        let recent = progress.recent_prompts(Skill::Counting);
        let second = plan_session(&progress, Subject::Math, 3, &mut rng);
        assert!(second.problems.iter().all(|p| !recent.contains(&p.prompt)));
    }
}
