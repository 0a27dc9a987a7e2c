use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::forecast;
use crate::models::{PredictionResult, Student};

#[derive(Debug, Clone, PartialEq)]
pub struct GradeTrend {
    pub first_term: u32,
    pub latest_term: u32,
    pub change: f64,
    pub mean_grade: f64,
    pub finalized_terms: usize,
}

/// Compares the first and latest finalized terms. Needs at least one.
pub fn grade_trend(student: &Student) -> Option<GradeTrend> {
    let graded: Vec<(u32, f64)> = student
        .records
        .values()
        .filter_map(|record| record.final_grade.map(|grade| (record.term, grade)))
        .collect();

    let (first_term, first_grade) = *graded.first()?;
    let (latest_term, latest_grade) = *graded.last()?;
    let mean_grade = graded.iter().map(|(_, grade)| grade).sum::<f64>() / graded.len() as f64;

    Some(GradeTrend {
        first_term,
        latest_term,
        change: latest_grade - first_grade,
        mean_grade,
        finalized_terms: graded.len(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortSummary {
    /// Mean of each student's latest finalized grade, if any student has one.
    pub average_grade: Option<f64>,
    pub graded_students: usize,
    pub student_count: usize,
}

pub fn cohort_summary(students: &[Student]) -> CohortSummary {
    let latest: Vec<f64> = students
        .iter()
        .filter_map(|student| {
            student
                .records
                .values()
                .rev()
                .find_map(|record| record.final_grade)
        })
        .collect();

    let average_grade = if latest.is_empty() {
        None
    } else {
        Some(forecast::round2(latest.iter().sum::<f64>() / latest.len() as f64))
    };

    CohortSummary {
        average_grade,
        graded_students: latest.len(),
        student_count: students.len(),
    }
}

fn format_score(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "-".to_string())
}

pub fn build_report(
    student: &Student,
    generated_on: NaiveDate,
    forecast: Option<&PredictionResult>,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Grade Forecast Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}) on {}",
        student.name, student.email, generated_on
    );
    let _ = writeln!(
        output,
        "Prior cumulative average: {}",
        format_score(student.prior_average)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Term History");

    if student.records.is_empty() {
        let _ = writeln!(output, "No terms recorded yet.");
    } else {
        let _ = writeln!(output, "| Term | Mid 1 | Mid 2 | End | Grade |");
        let _ = writeln!(output, "|------|-------|-------|-----|-------|");
        for record in student.records.values() {
            let _ = writeln!(
                output,
                "| {} | {:.2} | {:.2} | {} | {} |",
                record.term,
                record.mid1,
                record.mid2,
                format_score(record.end_term),
                format_score(record.final_grade)
            );
        }
    }

    let trend = grade_trend(student);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");

    match &trend {
        Some(trend) if trend.finalized_terms > 1 => {
            let _ = writeln!(
                output,
                "- Grade change from term {} to term {}: {:+.2}",
                trend.first_term, trend.latest_term, trend.change
            );
            let _ = writeln!(
                output,
                "- Mean grade across {} finalized terms: {:.2}",
                trend.finalized_terms, trend.mean_grade
            );
        }
        Some(trend) => {
            let _ = writeln!(
                output,
                "- Only term {} is finalized (grade {:.2}).",
                trend.latest_term, trend.mean_grade
            );
        }
        None => {
            let _ = writeln!(output, "No finalized terms yet.");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Projection");

    match forecast {
        Some(result) => {
            let _ = writeln!(
                output,
                "- Term {}: predicted end-of-term {}, final grade {}",
                result.term,
                format_score(result.predicted_end.or(result.endsem)),
                format_score(result.predicted_final_grade)
            );
            let _ = writeln!(
                output,
                "- Next term: {}",
                format_score(result.predicted_next_term_grade)
            );
            if result.degraded {
                let _ = writeln!(output, "- Heuristic estimate (not enough history to train).");
            }
        }
        None => {
            let latest = student
                .records
                .values()
                .rev()
                .find_map(|record| record.final_grade);
            match latest {
                Some(grade) => {
                    let _ = writeln!(
                        output,
                        "- Next term: {:.2}",
                        forecast::next_term_grade(grade, student.prior_average)
                    );
                }
                None => {
                    let _ = writeln!(output, "No projection without a finalized term.");
                }
            }
        }
    }

    output
}
