use crate::error::{self, Result};
use crate::models::{
    PredictionResult, PreviewResult, RecordUpdate, TermSubmission, END_TERM_MAX, GRADE_MAX,
};
use crate::registry::{ModelRegistry, ModelSlot};
use crate::store::RecordStore;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn fallback_end_term(mid1: f64, mid2: f64) -> f64 {
    (mid1 + mid2) * 2.0
}

pub fn fallback_final_grade(mid1: f64, mid2: f64, end_term: f64) -> f64 {
    ((mid1 + mid2 + end_term) / END_TERM_MAX * GRADE_MAX).clamp(0.0, GRADE_MAX)
}

/// Weighted blend of this term's grade with the prior average. An unset or
/// zero prior average is replaced by the grade itself.
pub fn next_term_grade(final_grade: f64, prior_average: Option<f64>) -> f64 {
    let prior = prior_average
        .filter(|prior| *prior != 0.0)
        .unwrap_or(final_grade);
    round2(0.9 * final_grade + 0.1 * prior)
}

#[derive(Debug, Clone, Copy)]
struct Estimate {
    value: f64,
    fallback: bool,
}

/// Turns term submissions into end-of-term, final grade and next-term
/// estimates using the registry's models or the heuristics.
pub struct Forecaster<'a> {
    registry: &'a ModelRegistry,
}

impl<'a> Forecaster<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    fn predict_end_term(&self, features: [f64; 3]) -> Estimate {
        match self.registry.end_term() {
            ModelSlot::Trained(model) => Estimate {
                value: model.predict(features),
                fallback: false,
            },
            ModelSlot::Fallback => {
                tracing::debug!("end-of-term model untrained, using heuristic");
                Estimate {
                    value: fallback_end_term(features[0], features[1]),
                    fallback: true,
                }
            }
        }
    }

    fn predict_final_grade(&self, features: [f64; 3], end_term: f64) -> Estimate {
        match self.registry.final_grade() {
            ModelSlot::Trained(model) => Estimate {
                value: model.predict(features).clamp(0.0, GRADE_MAX),
                fallback: false,
            },
            ModelSlot::Fallback => {
                tracing::debug!("final-grade model untrained, using heuristic");
                Estimate {
                    value: fallback_final_grade(features[0], features[1], end_term),
                    fallback: true,
                }
            }
        }
    }

    /// Records the scores for one term and returns the forecast for it.
    ///
    /// The first call that sees an end-of-term score without a final grade
    /// computes and stores the grade; later calls return the stored grade.
    /// Predictions for a term still missing its end-of-term score are not stored.
    pub fn submit_term_scores<S: RecordStore>(
        &self,
        store: &mut S,
        submission: TermSubmission,
    ) -> Result<PredictionResult> {
        error::validate_submission(
            submission.term,
            submission.mid1,
            submission.mid2,
            submission.end_term,
        )?;

        let student = store.get_student(submission.student_id)?;
        let record = store.upsert_record(
            submission.student_id,
            submission.term,
            RecordUpdate {
                mid1: submission.mid1,
                mid2: submission.mid2,
                end_term: submission.end_term,
            },
        )?;
        let features = [record.mid1, record.mid2, student.prior_feature()];

        let (predicted_end, final_grade, degraded) = match (record.end_term, record.final_grade) {
            (None, _) => {
                let end = self.predict_end_term(features);
                let grade = self.predict_final_grade(features, end.value);
                (Some(end.value), grade.value, end.fallback || grade.fallback)
            }
            (Some(end_term), None) => {
                let grade = self.predict_final_grade(features, end_term);
                let value = round2(grade.value);
                if store.set_final_grade(submission.student_id, submission.term, value)? {
                    tracing::info!(
                        student_id = %submission.student_id,
                        term = submission.term,
                        final_grade = value,
                        "final grade stored"
                    );
                }
                (None, value, grade.fallback)
            }
            (Some(_), Some(stored)) => (None, stored, false),
        };

        Ok(PredictionResult {
            student_id: submission.student_id,
            term: submission.term,
            mid1: record.mid1,
            mid2: record.mid2,
            endsem: record.end_term,
            predicted_end: predicted_end.map(round2),
            predicted_final_grade: Some(round2(final_grade)),
            predicted_next_term_grade: Some(next_term_grade(final_grade, student.prior_average)),
            degraded,
        })
    }

    /// What-if final grade for a pair of mid-term scores. Never touches a store.
    pub fn preview_prediction(
        &self,
        mid1: f64,
        mid2: f64,
        prior_average: Option<f64>,
    ) -> Result<PreviewResult> {
        error::validate_scores(mid1, mid2)?;
        error::validate_prior_average(prior_average)?;

        let features = [mid1, mid2, prior_average.unwrap_or(0.0)];
        let end = self.predict_end_term(features);
        let grade = self.predict_final_grade(features, end.value);
        let degraded = match self.registry.final_grade() {
            ModelSlot::Trained(_) => false,
            ModelSlot::Fallback => true,
        };

        Ok(PreviewResult {
            predicted_final_grade: round2(grade.value),
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::error::ForecastError;
    use crate::models::{AcademicRecord, Student};
    use crate::store::MemoryStore;
    use crate::trainer::TrainerConfig;

    struct CountingStore {
        inner: MemoryStore,
        grade_writes: usize,
    }

    impl RecordStore for CountingStore {
        fn get_student(&self, id: Uuid) -> Result<Student> {
            self.inner.get_student(id)
        }

        fn list_all_students(&self) -> Result<Vec<Student>> {
            self.inner.list_all_students()
        }

        fn upsert_record(
            &mut self,
            student_id: Uuid,
            term: u32,
            update: RecordUpdate,
        ) -> Result<AcademicRecord> {
            self.inner.upsert_record(student_id, term, update)
        }

        fn set_final_grade(&mut self, student_id: Uuid, term: u32, grade: f64) -> Result<bool> {
            self.grade_writes += 1;
            self.inner.set_final_grade(student_id, term, grade)
        }
    }

    fn store_with(prior_average: Option<f64>) -> (CountingStore, Uuid) {
        let student = Student::new("Avery Lee", "avery.lee@groupscholar.com", prior_average);
        let id = student.id;
        let store = CountingStore {
            inner: MemoryStore::from_students(vec![student]),
            grade_writes: 0,
        };
        (store, id)
    }

    fn submission(
        student_id: Uuid,
        mid1: f64,
        mid2: f64,
        end_term: Option<f64>,
    ) -> TermSubmission {
        TermSubmission {
            student_id,
            term: 1,
            mid1,
            mid2,
            end_term,
        }
    }

    fn cold_registry() -> ModelRegistry {
        ModelRegistry::untrained(TrainerConfig::default())
    }

    #[test]
    fn cold_start_predicts_with_heuristics() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(Some(7.4));

        let result = forecaster
            .submit_term_scores(&mut store, submission(id, 18.0, 20.0, None))
            .unwrap();

        assert_eq!(result.predicted_end, Some(76.0));
        assert_eq!(result.predicted_final_grade, Some(10.0));
        assert_eq!(result.predicted_next_term_grade, Some(9.74));
        assert_eq!(result.endsem, None);
        assert!(result.degraded);
        assert_eq!(store.grade_writes, 0);
        assert_eq!(store.inner.record(id, 1).unwrap().final_grade, None);
    }

    #[test]
    fn end_term_present_stores_grade_once() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(None);

        let first = forecaster
            .submit_term_scores(&mut store, submission(id, 12.0, 14.0, Some(50.0)))
            .unwrap();
        assert_eq!(first.predicted_final_grade, Some(7.6));
        assert_eq!(first.predicted_end, None);
        assert_eq!(store.inner.record(id, 1).unwrap().final_grade, Some(7.6));
        assert_eq!(store.grade_writes, 1);

        let second = forecaster
            .submit_term_scores(&mut store, submission(id, 12.0, 14.0, Some(50.0)))
            .unwrap();
        assert_eq!(second.predicted_final_grade, Some(7.6));
        assert_eq!(second.predicted_next_term_grade, first.predicted_next_term_grade);
        assert_eq!(store.grade_writes, 1);
    }

    #[test]
    fn stored_grade_is_not_recomputed() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(Some(8.0));
        forecaster
            .submit_term_scores(&mut store, submission(id, 12.0, 14.0, Some(50.0)))
            .unwrap();

        let changed = forecaster
            .submit_term_scores(&mut store, submission(id, 25.0, 25.0, Some(100.0)))
            .unwrap();
        assert_eq!(changed.predicted_final_grade, Some(7.6));
        assert_eq!(changed.predicted_next_term_grade, Some(7.64));
        assert_eq!(changed.mid1, 25.0);
        assert!(!changed.degraded);
    }

    #[test]
    fn later_call_without_end_term_keeps_stored_value() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(None);
        forecaster
            .submit_term_scores(&mut store, submission(id, 10.0, 10.0, Some(40.0)))
            .unwrap();

        let result = forecaster
            .submit_term_scores(&mut store, submission(id, 10.0, 10.0, None))
            .unwrap();
        assert_eq!(result.endsem, Some(40.0));
        assert_eq!(result.predicted_end, None);
        assert_eq!(result.predicted_final_grade, Some(6.0));
    }

    fn trained_registry() -> ModelRegistry {
        let mut history = Student::new("Jules Moreno", "jules.moreno@groupscholar.com", Some(6.5));
        for (term, mid1, mid2, end_term, grade) in [
            (1, 10.0, 12.0, 45.0, 5.9),
            (2, 15.0, 16.0, 62.0, 7.1),
            (3, 20.0, 21.0, 83.0, 8.8),
        ] {
            history.records.insert(
                term,
                AcademicRecord {
                    term,
                    mid1,
                    mid2,
                    end_term: Some(end_term),
                    final_grade: Some(grade),
                },
            );
        }
        ModelRegistry::from_students(&[history], TrainerConfig::default())
    }

    #[test]
    fn trained_models_replace_heuristics() {
        let registry = trained_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(Some(6.5));

        let result = forecaster
            .submit_term_scores(&mut store, submission(id, 15.0, 16.0, None))
            .unwrap();
        assert!(!result.degraded);
        let end = result.predicted_end.unwrap();
        assert!((end - 62.0).abs() < 5.0);
        let grade = result.predicted_final_grade.unwrap();
        assert!((0.0..=10.0).contains(&grade));
        assert!((grade - 7.1).abs() < 0.5);
    }

    #[test]
    fn unstored_predictions_are_rounded() {
        let registry = trained_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(Some(6.5));

        let result = forecaster
            .submit_term_scores(&mut store, submission(id, 13.0, 17.0, None))
            .unwrap();
        let end = result.predicted_end.unwrap();
        let grade = result.predicted_final_grade.unwrap();
        assert_eq!(end, round2(end));
        assert_eq!(grade, round2(grade));

        let preview = forecaster.preview_prediction(13.0, 17.0, Some(6.5)).unwrap();
        assert_eq!(preview.predicted_final_grade, grade);
    }

    #[test]
    fn trained_grade_is_clamped_to_scale() {
        let mut history = Student::new("Kiara Patel", "kiara.patel@groupscholar.com", Some(9.0));
        for (term, mid, grade) in [(1, 10.0, 8.0), (2, 15.0, 9.0), (3, 20.0, 9.9)] {
            history.records.insert(
                term,
                AcademicRecord {
                    term,
                    mid1: mid,
                    mid2: mid,
                    end_term: Some(mid * 4.0),
                    final_grade: Some(grade),
                },
            );
        }
        let registry = ModelRegistry::from_students(&[history], TrainerConfig::default());
        let forecaster = Forecaster::new(&registry);

        let preview = forecaster.preview_prediction(25.0, 25.0, Some(9.0)).unwrap();
        assert!(!preview.degraded);
        assert_eq!(preview.predicted_final_grade, 10.0);
    }

    #[test]
    fn zero_prior_average_projects_from_grade_alone() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, id) = store_with(Some(0.0));

        let result = forecaster
            .submit_term_scores(&mut store, submission(id, 12.0, 14.0, Some(50.0)))
            .unwrap();
        assert_eq!(result.predicted_final_grade, Some(7.6));
        assert_eq!(result.predicted_next_term_grade, Some(7.6));
    }

    #[test]
    fn unknown_student_and_bad_input_are_rejected() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);
        let (mut store, _) = store_with(None);
        let missing = Uuid::new_v4();

        let err = forecaster
            .submit_term_scores(&mut store, submission(missing, 10.0, 10.0, None))
            .unwrap_err();
        assert_eq!(err, ForecastError::StudentNotFound(missing));

        let mut bad = submission(missing, 10.0, 10.0, None);
        bad.term = 0;
        let err = forecaster.submit_term_scores(&mut store, bad).unwrap_err();
        assert!(matches!(err, ForecastError::Validation(_)));
    }

    #[test]
    fn preview_uses_fallback_without_a_store() {
        let registry = cold_registry();
        let forecaster = Forecaster::new(&registry);

        let preview = forecaster.preview_prediction(10.0, 12.0, None).unwrap();
        assert!((preview.predicted_final_grade - 6.6).abs() < 1e-9);
        assert!(preview.degraded);

        assert!(forecaster.preview_prediction(30.0, 12.0, None).is_err());
    }

    #[test]
    fn next_term_blend_defaults_to_grade() {
        assert_eq!(next_term_grade(8.0, None), 8.0);
        assert_eq!(next_term_grade(8.0, Some(0.0)), 8.0);
        assert_eq!(next_term_grade(10.0, Some(7.4)), 9.74);
        assert_eq!(round2(7.6000000000000005), 7.6);
    }
}
