use tracing::info;

use crate::curriculum::LevelId;
use crate::models::{Grade, SessionReport, Subject};

/// Emitted after a mutation has been persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    SessionRecorded {
        subject: Subject,
    },
    PlacementSeeded {
        subject: Subject,
        grade: Grade,
    },
    LevelAttempted {
        subject: Subject,
        level: LevelId,
    },
    LevelCompleted {
        subject: Subject,
        level: LevelId,
        highest_unlocked_index: usize,
    },
    CurriculumPlaced {
        grade: Grade,
    },
    SubjectReset {
        subject: Subject,
    },
    CurriculumReset,
}

pub trait ChangeListener {
    fn state_changed(&self, change: &StateChange);
}

impl<F> ChangeListener for F
where
    F: Fn(&StateChange),
{
    fn state_changed(&self, change: &StateChange) {
        self(change)
    }
}

/// Receives one report per recorded session. Implementations must not block.
pub trait AchievementReporter {
    fn record_session(&self, report: &SessionReport);
}

/// Writes session reports to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl AchievementReporter for TracingReporter {
    fn record_session(&self, report: &SessionReport) {
        let mastered: Vec<&str> = report
            .newly_mastered_skills
            .iter()
            .map(|skill| skill.id())
            .collect();
        info!(
            subject = %report.subject,
            total_sessions = report.total_sessions,
            total_correct = report.total_correct_answers,
            newly_mastered = ?mastered,
            "session recorded"
        );
    }
}

#[derive(Default)]
pub(crate) struct Listeners {
    listeners: Vec<Box<dyn ChangeListener>>,
}

impl Listeners {
    pub(crate) fn push(&mut self, listener: Box<dyn ChangeListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn notify(&self, change: &StateChange) {
        for listener in &self.listeners {
            listener.state_changed(change);
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}
