use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::mastery::{
    MasteryEngine, DEFAULT_K_FACTOR, DEFAULT_MASTERY_THRESHOLD, PROFICIENCY_MAX, PROFICIENCY_MIN,
};
use crate::progress::DEFAULT_FREE_SESSIONS_PER_DAY;

pub const DEFAULT_DATA_DIR: &str = "./learning-data";
pub const DEFAULT_PROBLEMS_PER_SESSION: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    /// When set, state lives in Postgres instead of `data_dir`.
    pub database_url: Option<String>,
    pub catalog_csv: Option<PathBuf>,
    pub mastery_threshold: f64,
    pub k_factor: f64,
    pub free_sessions_per_day: u32,
    pub problems_per_session: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            database_url: None,
            catalog_csv: None,
            mastery_threshold: DEFAULT_MASTERY_THRESHOLD,
            k_factor: DEFAULT_K_FACTOR,
            free_sessions_per_day: DEFAULT_FREE_SESSIONS_PER_DAY,
            problems_per_session: DEFAULT_PROBLEMS_PER_SESSION,
        }
    }
}

impl AppConfig {
    /// Reads `LEARNING_*` variables and `DATABASE_URL`, loading `.env` first
    /// when present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(dir) = lookup("LEARNING_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        cfg.database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        cfg.catalog_csv = lookup("LEARNING_CATALOG_CSV").map(PathBuf::from);

        parse_checked(&lookup, "LEARNING_MASTERY_THRESHOLD", &mut cfg.mastery_threshold, |value| {
            value.is_finite() && value > PROFICIENCY_MIN && value <= PROFICIENCY_MAX
        });
        parse_checked(&lookup, "LEARNING_K_FACTOR", &mut cfg.k_factor, |value| {
            value.is_finite() && value > 0.0
        });
        parse_into(&lookup, "LEARNING_FREE_SESSIONS_PER_DAY", &mut cfg.free_sessions_per_day);
        parse_into(&lookup, "LEARNING_PROBLEMS_PER_SESSION", &mut cfg.problems_per_session);

        cfg
    }

    pub fn mastery_engine(&self) -> MasteryEngine {
        MasteryEngine::new(self.mastery_threshold, self.k_factor)
    }
}

fn parse_into<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}

/// Like `parse_into`, but also rejects values failing `valid`.
fn parse_checked<F, V>(lookup: &F, key: &str, target: &mut f64, valid: V)
where
    F: Fn(&str) -> Option<String>,
    V: Fn(f64) -> bool,
{
    let mut value = *target;
    parse_into(lookup, key, &mut value);
    if valid(value) {
        *target = value;
    } else {
        warn!(key, value, "ignoring out-of-range setting");
    }
}
