use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{CurriculumCatalog, Level, LevelId, Quest};
use crate::error::{EngineError, Result};
use crate::models::{Grade, Subject};

const REFERENCE_CATALOG: &str = include_str!("../../data/curriculum.csv");
const QUEST_SEPARATOR: char = '|';

#[derive(Debug, Deserialize)]
struct CsvRow {
    subject: String,
    level_id: String,
    grade: String,
    title: String,
    focus: String,
    overview: String,
    quests_required: u32,
    quests: String,
    reward: String,
}

impl CurriculumCatalog {
    /// The built-in four-subject, eight-grade path.
    pub fn reference() -> Result<Self> {
        Self::from_csv_reader(REFERENCE_CATALOG.as_bytes())
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|err| EngineError::Catalog(format!("{}: {err}", path.display())))?;
        Self::from_csv_reader(file)
    }

    /// Row order is path order within each subject.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut levels = Vec::new();
        let mut seen: HashSet<(Subject, LevelId)> = HashSet::new();

        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            // Header is line 1.
            let line = index + 2;
            let row = result.map_err(|err| EngineError::Catalog(format!("line {line}: {err}")))?;
            let level = parse_row(row).map_err(|msg| EngineError::Catalog(format!("line {line}: {msg}")))?;

            if !seen.insert((level.subject, level.id.clone())) {
                return Err(EngineError::Catalog(format!(
                    "line {line}: duplicate level id '{}'",
                    level.id
                )));
            }
            levels.push(level);
        }

        debug!(levels = levels.len(), "curriculum catalog loaded");
        Ok(Self::new(levels))
    }
}

fn parse_row(row: CsvRow) -> std::result::Result<Level, String> {
    let subject: Subject = row.subject.parse()?;
    let grade: Grade = row.grade.parse()?;
    let id = LevelId::parse(row.level_id.trim())
        .ok_or_else(|| format!("malformed level id '{}'", row.level_id))?;
    if row.quests_required < 1 {
        return Err(format!("level '{id}' must require at least one quest"));
    }

    let quests = row
        .quests
        .split(QUEST_SEPARATOR)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(|title| Quest {
            title: title.to_string(),
        })
        .collect();

    Ok(Level {
        id,
        subject,
        title: row.title,
        grade,
        focus: row.focus,
        overview: row.overview,
        quests_required_for_mastery: row.quests_required,
        quests,
        reward: row.reward,
    })
}
