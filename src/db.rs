use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error;
use crate::models::{AcademicRecord, Student};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    name: &str,
    email: &str,
    prior_average: Option<f64>,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO grade_forecast.students (id, full_name, email, prior_average)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, prior_average = EXCLUDED.prior_average
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(prior_average)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

/// Writes one term record. A final grade already in the database is kept,
/// as is a stored end-of-term score when the new record has none.
pub async fn save_record(
    pool: &PgPool,
    student_id: Uuid,
    record: &AcademicRecord,
) -> anyhow::Result<()> {
    let term = i32::try_from(record.term).context("term out of range")?;
    sqlx::query(
        r#"
        INSERT INTO grade_forecast.term_records
        (student_id, term, mid1, mid2, end_term, final_grade)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, term) DO UPDATE
        SET mid1 = EXCLUDED.mid1,
            mid2 = EXCLUDED.mid2,
            end_term = COALESCE(EXCLUDED.end_term, term_records.end_term),
            final_grade = COALESCE(term_records.final_grade, EXCLUDED.final_grade),
            updated_at = NOW()
        "#,
    )
    .bind(student_id)
    .bind(term)
    .bind(record.mid1)
    .bind(record.mid2)
    .bind(record.end_term)
    .bind(record.final_grade)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("Avery Lee", "avery.lee@groupscholar.com", Some(7.4)),
        ("Jules Moreno", "jules.moreno@groupscholar.com", Some(6.2)),
        ("Kiara Patel", "kiara.patel@groupscholar.com", Some(8.6)),
        ("Noah Brooks", "noah.brooks@groupscholar.com", None),
    ];

    let records = vec![
        ("avery.lee@groupscholar.com", 1, 18.0, 20.0, Some(74.0), Some(8.1)),
        ("avery.lee@groupscholar.com", 2, 19.0, 21.0, Some(79.0), Some(8.4)),
        ("jules.moreno@groupscholar.com", 1, 12.0, 14.0, Some(50.0), Some(6.1)),
        ("jules.moreno@groupscholar.com", 2, 13.0, 12.0, Some(47.0), Some(5.8)),
        ("kiara.patel@groupscholar.com", 1, 22.0, 23.0, Some(88.0), Some(9.2)),
        ("kiara.patel@groupscholar.com", 2, 21.0, 24.0, Some(90.0), Some(9.3)),
        ("noah.brooks@groupscholar.com", 1, 9.0, 11.0, Some(41.0), Some(4.9)),
        ("noah.brooks@groupscholar.com", 2, 14.0, 15.0, None, None),
    ];

    let mut ids = HashMap::new();
    for (name, email, prior_average) in students {
        let id = upsert_student(pool, name, email, prior_average).await?;
        ids.insert(email, id);
    }

    for (email, term, mid1, mid2, end_term, final_grade) in records {
        let student_id = *ids.get(email).context("seed record for unknown student")?;
        let record = AcademicRecord {
            term,
            mid1,
            mid2,
            end_term,
            final_grade,
        };
        save_record(pool, student_id, &record).await?;
    }

    Ok(())
}

/// Loads every student with their term records.
pub async fn fetch_students(pool: &PgPool) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, full_name, email, prior_average \
         FROM grade_forecast.students ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    let mut students = Vec::with_capacity(rows.len());
    let mut positions = HashMap::new();
    for row in rows {
        let id: Uuid = row.get("id");
        positions.insert(id, students.len());
        students.push(Student {
            id,
            name: row.get("full_name"),
            email: row.get("email"),
            prior_average: row.get("prior_average"),
            records: Default::default(),
        });
    }

    let records = sqlx::query(
        "SELECT student_id, term, mid1, mid2, end_term, final_grade \
         FROM grade_forecast.term_records",
    )
    .fetch_all(pool)
    .await?;

    for row in records {
        let student_id: Uuid = row.get("student_id");
        let term =
            u32::try_from(row.get::<i32, _>("term")).context("negative term in database")?;
        let Some(&position) = positions.get(&student_id) else {
            continue;
        };
        students[position].records.insert(
            term,
            AcademicRecord {
                term,
                mid1: row.get("mid1"),
                mid2: row.get("mid2"),
                end_term: row.get("end_term"),
                final_grade: row.get("final_grade"),
            },
        );
    }

    Ok(students)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CsvRow {
    pub full_name: String,
    pub email: String,
    pub prior_average: Option<f64>,
    pub term: u32,
    pub mid1: f64,
    pub mid2: f64,
    pub end_term: Option<f64>,
    pub final_grade: Option<f64>,
}

impl CsvRow {
    fn validate(&self) -> error::Result<()> {
        error::validate_submission(self.term, self.mid1, self.mid2, self.end_term)?;
        error::validate_prior_average(self.prior_average)?;
        error::validate_final_grade(self.final_grade)
    }
}

/// Parses historical term rows, skipping rows that are malformed or fail
/// validation.
pub fn read_csv_rows(csv_path: &Path) -> anyhow::Result<Vec<CsvRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                tracing::warn!(line = index + 2, %err, "skipping malformed csv row");
                continue;
            }
        };
        if let Err(err) = row.validate() {
            tracing::warn!(line = index + 2, email = %row.email, %err, "skipping csv row");
            continue;
        }
        rows.push(row);
    }

    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows = read_csv_rows(csv_path)?;
    let mut inserted = 0usize;

    for row in rows {
        let student_id =
            upsert_student(pool, &row.full_name, &row.email, row.prior_average).await?;
        let record = AcademicRecord {
            term: row.term,
            mid1: row.mid1,
            mid2: row.mid2,
            end_term: row.end_term,
            final_grade: row.final_grade,
        };
        save_record(pool, student_id, &record).await?;
        inserted += 1;
    }

    Ok(inserted)
}
