use rand::Rng;
use uuid::Uuid;

use crate::mastery::{self, MAX_DIFFICULTY, MIN_DIFFICULTY};
use crate::skill::Skill;

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub id: Uuid,
    pub prompt: String,
    pub correct_answer: i64,
    pub skill: Skill,
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProblemResult {
    pub problem: Problem,
    pub correct: bool,
}

impl ProblemResult {
    pub fn grade(problem: Problem, answer: i64) -> Self {
        let correct = problem.correct_answer == answer;
        Self { problem, correct }
    }
}

/// Operand bound that grows linearly from `easy` to `hard` with difficulty.
#[derive(Debug, Clone, Copy)]
struct OperandRange {
    easy: i64,
    hard: i64,
}

impl OperandRange {
    const fn new(easy: i64, hard: i64) -> Self {
        Self { easy, hard }
    }

    fn bound(self, difficulty: f64) -> i64 {
        let t = ((difficulty - MIN_DIFFICULTY) / (MAX_DIFFICULTY - MIN_DIFFICULTY)).clamp(0.0, 1.0);
        self.easy + ((self.hard - self.easy) as f64 * t).round() as i64
    }
}

const COUNTING_RANGE: OperandRange = OperandRange::new(5, 20);
const ADDITION_10_RANGE: OperandRange = OperandRange::new(5, 10);
const ADDITION_20_RANGE: OperandRange = OperandRange::new(12, 20);
const SUBTRACTION_20_RANGE: OperandRange = OperandRange::new(10, 20);
const MULTIPLICAND_RANGE: OperandRange = OperandRange::new(5, 10);
const MIN_FACTOR: i64 = 2;
const MAX_FACTOR: i64 = 5;

/// Builds one problem for `skill` at the difficulty matching `proficiency`.
pub fn generate_problem<R>(skill: Skill, proficiency: f64, rng: &mut R) -> Problem
where
    R: Rng + ?Sized,
{
    let difficulty = mastery::target_difficulty(proficiency);
    let (prompt, correct_answer) = match skill {
        Skill::Counting => counting(difficulty, rng),
        Skill::AdditionWithin10 => addition(ADDITION_10_RANGE, difficulty, rng),
        Skill::AdditionWithin20 => addition(ADDITION_20_RANGE, difficulty, rng),
        Skill::SubtractionWithin20 => subtraction(difficulty, rng),
        Skill::Multiplication => multiplication(difficulty, rng),
    };

    Problem {
        id: Uuid::from_bytes(rng.gen()),
        prompt,
        correct_answer,
        skill,
        difficulty,
    }
}

/// Independent draws; duplicate prompts are the caller's concern.
pub fn generate_problems<R>(skill: Skill, proficiency: f64, count: usize, rng: &mut R) -> Vec<Problem>
where
    R: Rng + ?Sized,
{
    (0..count)
        .map(|_| generate_problem(skill, proficiency, rng))
        .collect()
}

fn counting<R: Rng + ?Sized>(difficulty: f64, rng: &mut R) -> (String, i64) {
    let upper = COUNTING_RANGE.bound(difficulty);
    let count = rng.gen_range(1..=upper);
    let stars = vec!["★"; count as usize].join(" ");
    (format!("How many stars? {stars}"), count)
}

fn addition<R: Rng + ?Sized>(range: OperandRange, difficulty: f64, rng: &mut R) -> (String, i64) {
    let max_sum = range.bound(difficulty);
    let a = rng.gen_range(0..=max_sum);
    let b = rng.gen_range(0..=max_sum - a);
    (format!("{a} + {b} = ?"), a + b)
}

fn subtraction<R: Rng + ?Sized>(difficulty: f64, rng: &mut R) -> (String, i64) {
    let top = SUBTRACTION_20_RANGE.bound(difficulty);
    let a = rng.gen_range(1..=top);
    let b = rng.gen_range(0..=a);
    (format!("{a} - {b} = ?"), a - b)
}

fn multiplication<R: Rng + ?Sized>(difficulty: f64, rng: &mut R) -> (String, i64) {
    let factor = rng.gen_range(MIN_FACTOR..=MAX_FACTOR);
    let other = rng.gen_range(1..=MULTIPLICAND_RANGE.bound(difficulty));
    (format!("{factor} × {other} = ?"), factor * other)
}
