use std::fmt::Write;

use chrono::NaiveDateTime;

use crate::curriculum::engine::CurriculumEngine;
use crate::models::Subject;
use crate::progress::ProgressStore;

/// Markdown summary of practice and curriculum progress.
pub fn build_report(
    subject: Subject,
    progress: &ProgressStore,
    curriculum: &CurriculumEngine,
    now: NaiveDateTime,
) -> String {
    let mastery = progress.mastery();
    let counters = progress.subject_progress(subject, now);
    let focus = progress.focus_skill(subject);

    let mut output = String::new();

    let _ = writeln!(output, "# Learning Progress Report");
    let _ = writeln!(output, "Generated for {} on {}", subject, now.date());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Practice");
    let _ = writeln!(
        output,
        "- {} sessions, {} correct answers",
        counters.total_sessions, counters.total_correct_answers
    );
    match counters.last_exercise_date {
        Some(last) => {
            let _ = writeln!(output, "- Last practiced {}", last.date());
        }
        None => {
            let _ = writeln!(output, "- No practice recorded yet.");
        }
    }
    let _ = writeln!(
        output,
        "- Next focus: {} (proficiency {:.2})",
        focus,
        progress.proficiency(focus, subject)
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Skills");
    for skill in progress.skills(subject) {
        let marker = if mastery.is_mastered(skill.proficiency) {
            "mastered"
        } else {
            "learning"
        };
        let _ = writeln!(
            output,
            "- {}: {:.2} ({}, streak {})",
            skill.skill, skill.proficiency, marker, skill.streak
        );
    }

    let overall = curriculum.overall_progress();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Curriculum");
    let _ = writeln!(
        output,
        "Level {} of {} ({} completed, {:.0}% toward the next)",
        overall.level_number,
        overall.total_levels,
        overall.completed_levels,
        overall.progress_to_next * 100.0
    );
    if let Some(grade) = curriculum.placement_grade() {
        let _ = writeln!(output, "Placed at {grade}");
    }

    let snapshots = curriculum.level_snapshots(subject);
    if snapshots.is_empty() {
        let _ = writeln!(output, "No levels defined for {subject}.");
    } else {
        for snapshot in snapshots {
            let _ = write!(
                output,
                "- {} ({}): {}",
                snapshot.level.title, snapshot.level.grade, snapshot.status
            );
            if snapshot.record.attempts > 0 {
                let _ = write!(
                    output,
                    ", {} attempts, best {}/{}",
                    snapshot.record.attempts,
                    snapshot.record.best_completed_quest_count,
                    snapshot.level.quests_required_for_mastery
                );
            }
            if snapshot.record.assisted_unlock {
                let _ = write!(output, ", review together");
            }
            let _ = writeln!(output);
        }
    }

    output
}
