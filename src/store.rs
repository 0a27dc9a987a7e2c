use std::collections::BTreeMap;

use uuid::Uuid;

use crate::error::{ForecastError, Result};
use crate::models::{AcademicRecord, RecordUpdate, Student};

/// Synchronous view of wherever student records live.
pub trait RecordStore {
    fn get_student(&self, id: Uuid) -> Result<Student>;

    fn list_all_students(&self) -> Result<Vec<Student>>;

    /// Creates the (student, term) record if missing and merges `update` into it.
    fn upsert_record(&mut self, student_id: Uuid, term: u32, update: RecordUpdate)
        -> Result<AcademicRecord>;

    /// Stores a final grade. Returns `false` without writing when the
    /// record already holds one.
    fn set_final_grade(&mut self, student_id: Uuid, term: u32, grade: f64) -> Result<bool>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    students: BTreeMap<Uuid, Student>,
}

impl MemoryStore {
    pub fn from_students(students: Vec<Student>) -> Self {
        Self {
            students: students.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Student> {
        self.students
            .values()
            .find(|student| student.email.eq_ignore_ascii_case(email))
    }

    pub fn record(&self, student_id: Uuid, term: u32) -> Option<&AcademicRecord> {
        self.students
            .get(&student_id)
            .and_then(|student| student.records.get(&term))
    }

    fn student_mut(&mut self, id: Uuid) -> Result<&mut Student> {
        self.students
            .get_mut(&id)
            .ok_or(ForecastError::StudentNotFound(id))
    }
}

impl RecordStore for MemoryStore {
    fn get_student(&self, id: Uuid) -> Result<Student> {
        self.students
            .get(&id)
            .cloned()
            .ok_or(ForecastError::StudentNotFound(id))
    }

    fn list_all_students(&self) -> Result<Vec<Student>> {
        Ok(self.students.values().cloned().collect())
    }

    fn upsert_record(
        &mut self,
        student_id: Uuid,
        term: u32,
        update: RecordUpdate,
    ) -> Result<AcademicRecord> {
        let student = self.student_mut(student_id)?;
        let record = student
            .records
            .entry(term)
            .or_insert_with(|| AcademicRecord::new(term));
        record.mid1 = update.mid1;
        record.mid2 = update.mid2;
        if update.end_term.is_some() {
            record.end_term = update.end_term;
        }
        Ok(record.clone())
    }

    fn set_final_grade(&mut self, student_id: Uuid, term: u32, grade: f64) -> Result<bool> {
        let student = self.student_mut(student_id)?;
        let record = student.records.get_mut(&term).ok_or_else(|| {
            ForecastError::Store(format!("no term {term} record for student {student_id}"))
        })?;
        if record.final_grade.is_some() {
            return Ok(false);
        }
        record.final_grade = Some(grade);
        Ok(true)
    }
}
