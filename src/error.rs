//! Errors surfaced by the forecasting engine.
//!
//! Only the record-store boundary and input validation can fail; the
//! scaling, training and prediction code is total over finite input.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{END_TERM_MAX, GRADE_MAX, MID_TERM_MAX};

#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    /// No student with this id exists in the record store.
    #[error("student not found: {0}")]
    StudentNotFound(Uuid),

    /// A submitted value is missing, non-numeric or out of range.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The record store rejected an operation.
    #[error("record store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;

fn check_bounded(field: &str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(ForecastError::Validation(format!("{field} must be a number")));
    }
    if !(0.0..=max).contains(&value) {
        return Err(ForecastError::Validation(format!(
            "{field} must be between 0 and {max}, got {value}"
        )));
    }
    Ok(())
}

pub fn validate_submission(term: u32, mid1: f64, mid2: f64, end_term: Option<f64>) -> Result<()> {
    if term == 0 {
        return Err(ForecastError::Validation(
            "term must be a positive integer".to_string(),
        ));
    }
    validate_scores(mid1, mid2)?;
    if let Some(value) = end_term {
        check_bounded("endsem", value, END_TERM_MAX)?;
    }
    Ok(())
}

pub fn validate_scores(mid1: f64, mid2: f64) -> Result<()> {
    check_bounded("mid1", mid1, MID_TERM_MAX)?;
    check_bounded("mid2", mid2, MID_TERM_MAX)
}

pub fn validate_prior_average(prior_average: Option<f64>) -> Result<()> {
    match prior_average {
        Some(value) => check_bounded("prior average", value, GRADE_MAX),
        None => Ok(()),
    }
}

pub fn validate_final_grade(final_grade: Option<f64>) -> Result<()> {
    match final_grade {
        Some(value) => check_bounded("final grade", value, GRADE_MAX),
        None => Ok(()),
    }
}
