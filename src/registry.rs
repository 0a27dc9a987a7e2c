use serde::Serialize;

use crate::error::Result;
use crate::models::{Student, TrainingExample};
use crate::store::RecordStore;
use crate::trainer::{self, LinearModel, TrainerConfig};
use crate::training;

pub const MIN_TRAINING_EXAMPLES: usize = 2;

/// One prediction target: a trained model, or the heuristic when too few
/// examples were available.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ModelSlot {
    Trained(LinearModel),
    Fallback,
}

impl ModelSlot {
    fn train(examples: &[TrainingExample], config: TrainerConfig) -> Self {
        if examples.len() < MIN_TRAINING_EXAMPLES {
            return ModelSlot::Fallback;
        }
        match trainer::fit(examples, config) {
            Some(model) => ModelSlot::Trained(model),
            None => ModelSlot::Fallback,
        }
    }

    pub fn model(&self) -> Option<&LinearModel> {
        match self {
            ModelSlot::Trained(model) => Some(model),
            ModelSlot::Fallback => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub examples: usize,
    #[serde(flatten)]
    pub slot: ModelSlot,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub config: TrainerConfig,
    pub end_term: SlotSummary,
    pub final_grade: SlotSummary,
}

/// The end-of-term and final-grade models, trained from one snapshot of
/// the record store and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    config: TrainerConfig,
    end_term: ModelSlot,
    final_grade: ModelSlot,
    end_term_examples: usize,
    final_grade_examples: usize,
}

impl ModelRegistry {
    pub fn build(store: &impl RecordStore, config: TrainerConfig) -> Result<Self> {
        let students = store.list_all_students()?;
        Ok(Self::from_students(&students, config))
    }

    pub fn from_students(students: &[Student], config: TrainerConfig) -> Self {
        let mut registry = Self::untrained(config);
        registry.retrain(students);
        registry
    }

    /// A registry with both targets on the heuristic.
    pub fn untrained(config: TrainerConfig) -> Self {
        Self {
            config,
            end_term: ModelSlot::Fallback,
            final_grade: ModelSlot::Fallback,
            end_term_examples: 0,
            final_grade_examples: 0,
        }
    }

    pub fn retrain(&mut self, students: &[Student]) {
        let end_term = training::end_term_examples(students);
        let final_grade = training::final_grade_examples(students);

        self.end_term = ModelSlot::train(&end_term, self.config);
        self.final_grade = ModelSlot::train(&final_grade, self.config);
        self.end_term_examples = end_term.len();
        self.final_grade_examples = final_grade.len();

        tracing::info!(
            end_term_examples = self.end_term_examples,
            final_grade_examples = self.final_grade_examples,
            end_term_trained = self.end_term.model().is_some(),
            final_grade_trained = self.final_grade.model().is_some(),
            "model registry trained"
        );
    }

    pub fn end_term(&self) -> &ModelSlot {
        &self.end_term
    }

    pub fn final_grade(&self) -> &ModelSlot {
        &self.final_grade
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            config: self.config,
            end_term: SlotSummary {
                examples: self.end_term_examples,
                slot: self.end_term.clone(),
            },
            final_grade: SlotSummary {
                examples: self.final_grade_examples,
                slot: self.final_grade.clone(),
            },
        }
    }
}
