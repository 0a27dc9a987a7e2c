use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing_subscriber::EnvFilter;

mod db;
mod error;
mod forecast;
mod models;
mod registry;
mod report;
mod scaler;
mod store;
mod trainer;
mod training;

use forecast::Forecaster;
use models::TermSubmission;
use registry::ModelRegistry;
use store::MemoryStore;
use trainer::TrainerConfig;

#[derive(Parser)]
#[command(name = "grade-forecast")]
#[command(about = "Term grade forecasting for Group Scholar students", long_about = None)]
struct Cli {
    /// Gradient descent step size
    #[arg(long, global = true, default_value_t = 0.01)]
    learning_rate: f64,
    /// Gradient descent iterations per model
    #[arg(long, global = true, default_value_t = 2500)]
    iterations: usize,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import historical term records from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record a student's scores for a term and forecast the rest
    Submit {
        #[arg(long)]
        email: String,
        #[arg(long)]
        term: u32,
        #[arg(long)]
        mid1: f64,
        #[arg(long)]
        mid2: f64,
        #[arg(long)]
        endsem: Option<f64>,
        /// Also write a markdown report including this forecast
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// What-if final grade for mid-term scores; nothing is stored
    Preview {
        #[arg(long)]
        mid1: f64,
        #[arg(long)]
        mid2: f64,
        #[arg(long)]
        prior_average: Option<f64>,
        /// Skip the database and use the heuristics only
        #[arg(long)]
        no_models: bool,
    },
    /// Generate a markdown report for one student
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Average latest finalized grade across students
    Summary {
        /// Limit to these students (repeatable); all students when omitted
        #[arg(long)]
        email: Vec<String>,
    },
    /// Show what the trained models look like
    Models,
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_snapshot(
    pool: &PgPool,
    config: TrainerConfig,
) -> anyhow::Result<(MemoryStore, ModelRegistry)> {
    let students = db::fetch_students(pool).await?;
    let store = MemoryStore::from_students(students);
    let registry = ModelRegistry::build(&store, config)?;
    Ok((store, registry))
}

/// Checks the scores before looking the student up, so bad input is
/// reported as such even for an unknown email.
fn resolve_submission(
    store: &MemoryStore,
    email: &str,
    term: u32,
    mid1: f64,
    mid2: f64,
    endsem: Option<f64>,
) -> anyhow::Result<TermSubmission> {
    error::validate_submission(term, mid1, mid2, endsem)?;
    let student_id = store
        .find_by_email(email)
        .map(|student| student.id)
        .with_context(|| format!("no student with email {email}"))?;
    Ok(TermSubmission {
        student_id,
        term,
        mid1,
        mid2,
        end_term: endsem,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = TrainerConfig {
        learning_rate: cli.learning_rate,
        iterations: cli.iterations,
    };

    match cli.command {
        Commands::InitDb => {
            db::init_db(&connect().await?).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&connect().await?).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&connect().await?, &csv).await?;
            println!("Imported {inserted} term records from {}.", csv.display());
        }
        Commands::Submit {
            email,
            term,
            mid1,
            mid2,
            endsem,
            out,
        } => {
            let pool = connect().await?;
            let (mut store, registry) = load_snapshot(&pool, config).await?;
            let submission = resolve_submission(&store, &email, term, mid1, mid2, endsem)?;
            let student_id = submission.student_id;

            let result = Forecaster::new(&registry).submit_term_scores(&mut store, submission)?;
            let record = store
                .record(student_id, term)
                .context("submitted record missing from store")?;
            db::save_record(&pool, student_id, record).await?;

            if let Some(out) = out {
                let student = store
                    .find_by_email(&email)
                    .context("student missing from store")?;
                let report = report::build_report(
                    student,
                    chrono::Utc::now().date_naive(),
                    Some(&result),
                );
                std::fs::write(&out, report)?;
                println!("Report written to {}.", out.display());
            }

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Term {} for {}:", result.term, email);
                if let Some(end) = result.predicted_end {
                    println!("- predicted end-of-term score {end:.2}");
                }
                if let Some(grade) = result.predicted_final_grade {
                    println!("- final grade {grade:.2}");
                }
                if let Some(next) = result.predicted_next_term_grade {
                    println!("- projected next-term grade {next:.2}");
                }
                if result.degraded {
                    println!("(heuristic estimate: not enough history to train)");
                }
            }
        }
        Commands::Preview {
            mid1,
            mid2,
            prior_average,
            no_models,
        } => {
            let registry = if no_models {
                ModelRegistry::untrained(config)
            } else {
                load_snapshot(&connect().await?, config).await?.1
            };
            let preview =
                Forecaster::new(&registry).preview_prediction(mid1, mid2, prior_average)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&preview)?);
            } else {
                println!("Predicted final grade {:.2}.", preview.predicted_final_grade);
            }
        }
        Commands::Report { email, out } => {
            let students = db::fetch_students(&connect().await?).await?;
            let store = MemoryStore::from_students(students);
            let student = store
                .find_by_email(&email)
                .with_context(|| format!("no student with email {email}"))?;
            let report = report::build_report(student, chrono::Utc::now().date_naive(), None);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Summary { email } => {
            let students: Vec<models::Student> = db::fetch_students(&connect().await?)
                .await?
                .into_iter()
                .filter(|student| {
                    email.is_empty()
                        || email
                            .iter()
                            .any(|wanted| student.email.eq_ignore_ascii_case(wanted))
                })
                .collect();
            let summary = report::cohort_summary(&students);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                match summary.average_grade {
                    Some(average) => println!(
                        "Average latest grade {average:.2} across {} of {} students.",
                        summary.graded_students, summary.student_count
                    ),
                    None => println!(
                        "No finalized grades among {} students.",
                        summary.student_count
                    ),
                }
            }
        }
        Commands::Models => {
            let (_, registry) = load_snapshot(&connect().await?, config).await?;
            println!("{}", serde_json::to_string_pretty(&registry.summary())?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use crate::models::Student;

    fn store() -> MemoryStore {
        MemoryStore::from_students(vec![Student::new(
            "Avery Lee",
            "avery.lee@groupscholar.com",
            Some(7.4),
        )])
    }

    #[test]
    fn bad_scores_win_over_unknown_email() {
        let err = resolve_submission(&store(), "nobody@groupscholar.com", 0, 10.0, 10.0, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::Validation(_))
        ));
    }

    #[test]
    fn valid_scores_resolve_the_student() {
        let store = store();
        let submission =
            resolve_submission(&store, "Avery.Lee@groupscholar.com", 2, 18.0, 20.0, Some(70.0))
                .unwrap();
        let expected = store.find_by_email("avery.lee@groupscholar.com").unwrap().id;
        assert_eq!(submission.student_id, expected);
        assert_eq!(submission.end_term, Some(70.0));

        let err = resolve_submission(&store, "nobody@groupscholar.com", 1, 10.0, 10.0, None)
            .unwrap_err();
        assert!(err.to_string().contains("no student with email"));
    }
}
