use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

pub const MID_TERM_MAX: f64 = 25.0;
pub const END_TERM_MAX: f64 = 100.0;
pub const GRADE_MAX: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcademicRecord {
    pub term: u32,
    pub mid1: f64,
    pub mid2: f64,
    pub end_term: Option<f64>,
    pub final_grade: Option<f64>,
}

impl AcademicRecord {
    pub fn new(term: u32) -> Self {
        Self {
            term,
            mid1: 0.0,
            mid2: 0.0,
            end_term: None,
            final_grade: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub prior_average: Option<f64>,
    pub records: BTreeMap<u32, AcademicRecord>,
}

impl Student {
    pub fn new(name: &str, email: &str, prior_average: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            prior_average,
            records: BTreeMap::new(),
        }
    }

    /// Prior cumulative average as a feature; unset counts as zero.
    pub fn prior_feature(&self) -> f64 {
        self.prior_average.unwrap_or(0.0)
    }
}

/// Fields merged into a term record by an upsert. `end_term` is only
/// written when present, so a later call without it keeps the stored value.
#[derive(Debug, Clone, Copy)]
pub struct RecordUpdate {
    pub mid1: f64,
    pub mid2: f64,
    pub end_term: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingExample {
    pub features: [f64; 3],
    pub label: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TermSubmission {
    pub student_id: Uuid,
    pub term: u32,
    pub mid1: f64,
    pub mid2: f64,
    pub end_term: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub student_id: Uuid,
    pub term: u32,
    pub mid1: f64,
    pub mid2: f64,
    pub endsem: Option<f64>,
    pub predicted_end: Option<f64>,
    pub predicted_final_grade: Option<f64>,
    pub predicted_next_term_grade: Option<f64>,
    /// Set when a heuristic stood in for an untrained model.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub predicted_final_grade: f64,
    pub degraded: bool,
}
