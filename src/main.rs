use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use learning_path_engine::config::AppConfig;
use learning_path_engine::curriculum::engine::LevelSnapshot;
use learning_path_engine::events::TracingReporter;
use learning_path_engine::{
    db, report, session, CurriculumCatalog, CurriculumEngine, FileStore, Grade, KeyValueStore,
    LevelId, MemoryStore, PlacementProfile, ProblemResult, ProgressStore, Skill, Subject,
};

#[derive(Parser)]
#[command(name = "learning-path")]
#[command(about = "Adaptive practice and curriculum progression for young learners", long_about = None)]
struct Cli {
    /// Directory for file-backed state (overrides LEARNING_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Curriculum catalog CSV (overrides LEARNING_CATALOG_CSV)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres schema
    InitDb,
    /// Show the recommended next skill
    Focus {
        #[arg(long, default_value = "math")]
        subject: Subject,
    },
    /// Run an interactive practice session on stdin
    Practice {
        #[arg(long, default_value = "math")]
        subject: Subject,
        #[arg(long)]
        count: Option<usize>,
        /// Seed the problem generator for a reproducible session
        #[arg(long)]
        seed: Option<u64>,
        /// Ignore the daily free-session limit
        #[arg(long)]
        unlimited: bool,
    },
    /// Show a subject's level path
    Path {
        #[arg(long, default_value = "math")]
        subject: Subject,
    },
    /// Mark a level as completed
    Complete {
        #[arg(long)]
        subject: Subject,
        #[arg(long)]
        level: String,
        #[arg(long)]
        quests: u32,
        #[arg(long)]
        assisted: bool,
    },
    /// Record an attempt that ended before the level was passed
    Attempt {
        #[arg(long)]
        subject: Subject,
        #[arg(long)]
        level: String,
        #[arg(long)]
        quests: u32,
    },
    /// Check whether an assisted unlock should be offered
    AssistCheck {
        #[arg(long)]
        subject: Subject,
        #[arg(long)]
        level: String,
        #[arg(long)]
        quests: u32,
    },
    /// Seed proficiencies and curriculum cursors from a grade
    Place {
        #[arg(long)]
        grade: Grade,
        /// Skills to start slightly ahead on
        #[arg(long, value_delimiter = ',')]
        focus: Vec<Skill>,
    },
    /// Reset curriculum progress for one subject or everything
    Reset {
        #[arg(long)]
        subject: Option<Subject>,
    },
    /// Show the combined level across subjects
    Overview,
    /// Write a markdown progress report
    Report {
        #[arg(long, default_value = "math")]
        subject: Subject,
        #[arg(long, default_value = "progress-report.md")]
        out: PathBuf,
    },
}

/// Where state is read from and written back to.
enum Backend {
    Files(FileStore),
    Postgres { pool: PgPool, staged: MemoryStore },
}

impl Backend {
    fn store(&self) -> Arc<dyn KeyValueStore> {
        match self {
            Backend::Files(store) => Arc::new(store.clone()),
            Backend::Postgres { staged, .. } => Arc::new(staged.clone()),
        }
    }

    async fn flush(&self) -> anyhow::Result<()> {
        if let Backend::Postgres { pool, staged } = self {
            let written = db::persist_state(pool, staged).await?;
            info!(written, "learning state written to Postgres");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog_csv = Some(catalog);
    }

    let backend = match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
                .context("failed to connect to Postgres")?;
            if let Commands::InitDb = cli.command {
                db::init_db(&pool).await?;
                println!("Schema ready.");
                return Ok(());
            }
            let staged = db::load_state(&pool).await?;
            Backend::Postgres { pool, staged }
        }
        None => {
            if let Commands::InitDb = cli.command {
                anyhow::bail!("DATABASE_URL must be set to initialize Postgres");
            }
            Backend::Files(FileStore::new(&config.data_dir))
        }
    };

    let catalog = match &config.catalog_csv {
        Some(path) => CurriculumCatalog::from_csv_path(path)?,
        None => CurriculumCatalog::reference()?,
    };
    let mut progress = ProgressStore::open(
        backend.store(),
        config.mastery_engine(),
        Box::new(TracingReporter),
    )
    .context("failed to open progress store")?
    .with_free_sessions_per_day(config.free_sessions_per_day);
    let mut curriculum =
        CurriculumEngine::open(catalog, backend.store()).context("failed to open curriculum state")?;
    let now = Local::now().naive_local();

    match cli.command {
        Commands::InitDb => {}
        Commands::Focus { subject } => {
            let skill = progress.focus_skill(subject);
            println!(
                "Focus for {subject}: {skill} (proficiency {:.2})",
                progress.proficiency(skill, subject)
            );
        }
        Commands::Practice {
            subject,
            count,
            seed,
            unlimited,
        } => {
            if !unlimited && !progress.can_start_exercise(subject, now) {
                println!("Today's free {subject} session is done. Come back tomorrow!");
                return Ok(());
            }
            let count = count.unwrap_or(config.problems_per_session);
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            run_practice(&mut progress, subject, count, &mut rng, now)?;
        }
        Commands::Path { subject } => {
            let snapshots = curriculum.level_snapshots(subject);
            if snapshots.is_empty() {
                println!("No levels defined for {subject}.");
            }
            for snapshot in &snapshots {
                println!("{}", path_line(snapshot));
            }
        }
        Commands::Complete {
            subject,
            level,
            quests,
            assisted,
        } => {
            let level = parse_level(&level)?;
            curriculum.mark_level_completed(&level, subject, quests, assisted)?;
            println!(
                "{level} completed; {subject} is now at level {}.",
                curriculum.highest_unlocked_index(subject) + 1
            );
        }
        Commands::Attempt {
            subject,
            level,
            quests,
        } => {
            let level = parse_level(&level)?;
            curriculum.record_incomplete_attempt(&level, subject, quests)?;
            let record = curriculum.record(&level, subject);
            println!(
                "Attempt recorded for {level}: {} attempts, best {}.",
                record.attempts, record.best_completed_quest_count
            );
        }
        Commands::AssistCheck {
            subject,
            level,
            quests,
        } => {
            let level = parse_level(&level)?;
            if curriculum.should_offer_assisted_unlock(&level, subject, quests) {
                println!("Offer an assisted unlock for {level}.");
            } else {
                println!("No assisted unlock for {level}.");
            }
        }
        Commands::Place { grade, focus } => {
            let profile = PlacementProfile::new(grade).with_focus(focus);
            progress.apply_placement(&profile, Subject::Math)?;
            curriculum.apply_placement(grade)?;
            println!(
                "Placed at {grade}; math focus is now {}.",
                progress.focus_skill(Subject::Math)
            );
        }
        Commands::Reset { subject } => match subject {
            Some(subject) => {
                curriculum.reset_subject(subject)?;
                println!("{subject} curriculum reset.");
            }
            None => {
                curriculum.reset_progress()?;
                println!("All curriculum progress reset.");
            }
        },
        Commands::Overview => {
            let overall = curriculum.overall_progress();
            println!(
                "Level {} of {} ({} completed, {:.0}% toward the next)",
                overall.level_number,
                overall.total_levels,
                overall.completed_levels,
                overall.progress_to_next * 100.0
            );
        }
        Commands::Report { subject, out } => {
            let report = report::build_report(subject, &progress, &curriculum, now);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    backend.flush().await?;
    Ok(())
}

fn path_line(snapshot: &LevelSnapshot<'_>) -> String {
    format!(
        "- [{}] {} {} ({}), needs {} of {} quests, best {} over {} attempts",
        snapshot.status,
        snapshot.level.id,
        snapshot.level.title,
        snapshot.level.grade,
        snapshot.level.quests_required_for_mastery,
        snapshot.level.quests.len(),
        snapshot.record.best_completed_quest_count,
        snapshot.record.attempts
    )
}

fn parse_level(raw: &str) -> anyhow::Result<LevelId> {
    LevelId::parse(raw).with_context(|| format!("'{raw}' is not a valid level id"))
}

fn run_practice(
    progress: &mut ProgressStore,
    subject: Subject,
    count: usize,
    rng: &mut StdRng,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    let plan = session::plan_session(progress, subject, count, rng);
    println!("Practicing {} ({} problems)", plan.skill, plan.problems.len());

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut results = Vec::with_capacity(plan.problems.len());

    for problem in plan.problems {
        print!("{} ", problem.prompt);
        io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let answer = line?.trim().parse::<i64>().ok();
        let expected = problem.correct_answer;
        let result = match answer {
            Some(answer) => ProblemResult::grade(problem, answer),
            None => ProblemResult {
                problem,
                correct: false,
            },
        };
        if result.correct {
            println!("Correct!");
        } else {
            println!("Not quite, the answer is {expected}.");
        }
        results.push(result);
    }

    if results.is_empty() {
        println!("No answers given; nothing recorded.");
        return Ok(());
    }

    let report = progress.record_session(subject, &results, now)?;
    let correct = results.iter().filter(|result| result.correct).count();
    println!("{correct} of {} correct.", results.len());
    for skill in report.newly_mastered_skills {
        println!("New skill mastered: {skill}!");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_line_states_the_quest_requirement() {
        let engine = CurriculumEngine::open(
            CurriculumCatalog::reference().unwrap(),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let snapshots = engine.level_snapshots(Subject::Math);
        assert_eq!(
            path_line(&snapshots[0]),
            "- [current] math-pre-k Number Garden (Pre-K), needs 2 of 3 quests, best 0 over 0 attempts"
        );
    }
}
