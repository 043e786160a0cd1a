pub mod config;
pub mod curriculum;
pub mod db;
pub mod error;
pub mod events;
pub mod generator;
pub mod mastery;
pub mod models;
pub mod placement;
pub mod progress;
pub mod report;
pub mod session;
pub mod skill;
pub mod store;

pub use curriculum::engine::{CurriculumEngine, OverallProgress};
pub use curriculum::{CurriculumCatalog, Level, LevelId, LevelRecord, LevelStatus};
pub use error::{EngineError, StoreError};
pub use events::{AchievementReporter, ChangeListener, StateChange};
pub use generator::{Problem, ProblemResult};
pub use mastery::MasteryEngine;
pub use models::{Grade, SessionReport, SkillProgress, Subject, SubjectProgress};
pub use placement::PlacementProfile;
pub use progress::ProgressStore;
pub use skill::Skill;
pub use store::{FileStore, KeyValueStore, MemoryStore};
