use crate::models::{AcademicRecord, Student, TrainingExample};

/// Which recorded value a training set is labelled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    EndTerm,
    FinalGrade,
}

impl Target {
    fn label(self, record: &AcademicRecord) -> Option<f64> {
        match self {
            Target::EndTerm => record.end_term,
            Target::FinalGrade => record.final_grade,
        }
    }
}

/// Collects one example per labelled record, students in the given order
/// and terms ascending.
pub fn build_examples(students: &[Student], target: Target) -> Vec<TrainingExample> {
    students
        .iter()
        .flat_map(|student| {
            let prior = student.prior_feature();
            student.records.values().filter_map(move |record| {
                target.label(record).map(|label| TrainingExample {
                    features: [record.mid1, record.mid2, prior],
                    label,
                })
            })
        })
        .collect()
}

pub fn end_term_examples(students: &[Student]) -> Vec<TrainingExample> {
    build_examples(students, Target::EndTerm)
}

pub fn final_grade_examples(students: &[Student]) -> Vec<TrainingExample> {
    build_examples(students, Target::FinalGrade)
}
