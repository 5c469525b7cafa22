//! In-memory store for unit tests. Mirrors the relational constraints
//! (one progress row per key, one certificate per (enrollment, type))
//! under a single mutex so concurrency tests see the same serialization
//! the database's unique indexes provide.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::Result;
use crate::models::{Certificate, CertificateType, Enrollment, EnrollmentStatus, ProgressRecord};

use super::{CertificateInsert, LmsStore, NewCertificate};

#[derive(Default)]
struct Inner {
    next_id: i64,
    enrollments: Vec<Enrollment>,
    progress: Vec<ProgressRecord>,
    certificates: Vec<Certificate>,
    published_units: HashMap<i64, Vec<i64>>,
    scores: HashMap<(i64, i64), f64>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_published_units(&self, course_id: i64, unit_ids: Vec<i64>) {
        self.inner.lock().published_units.insert(course_id, unit_ids);
    }

    pub fn set_assessment_score(&self, student_id: i64, course_id: i64, score: f64) {
        self.inner.lock().scores.insert((student_id, course_id), score);
    }

    pub fn cancel_enrollment(&self, enrollment_id: i64) {
        let mut inner = self.inner.lock();
        if let Some(e) = inner.enrollments.iter_mut().find(|e| e.id == enrollment_id) {
            e.status = EnrollmentStatus::Cancelled;
        }
    }

    pub fn enrollment(&self, enrollment_id: i64) -> Option<Enrollment> {
        self.inner.lock().enrollments.iter().find(|e| e.id == enrollment_id).cloned()
    }

    pub fn certificate_count(&self, enrollment_id: i64, cert_type: CertificateType) -> usize {
        self.inner
            .lock()
            .certificates
            .iter()
            .filter(|c| c.enrollment_id == enrollment_id && c.cert_type == cert_type)
            .count()
    }
}

#[async_trait]
impl LmsStore for MemStore {
    async fn create_enrollment(&self, student_id: i64, course_id: i64) -> Result<Enrollment> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .enrollments
            .iter()
            .find(|e| e.student_id == student_id && e.course_id == course_id)
        {
            return Ok(existing.clone());
        }
        let id = inner.next_id();
        let enrollment = Enrollment {
            id,
            student_id,
            course_id,
            status: EnrollmentStatus::Active,
            enrolled_at: Utc::now(),
            completed_at: None,
        };
        inner.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn active_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>> {
        Ok(self
            .inner
            .lock()
            .enrollments
            .iter()
            .find(|e| {
                e.student_id == student_id
                    && e.course_id == course_id
                    && e.status == EnrollmentStatus::Active
            })
            .cloned())
    }

    async fn find_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>> {
        Ok(self
            .inner
            .lock()
            .enrollments
            .iter()
            .find(|e| e.student_id == student_id && e.course_id == course_id)
            .cloned())
    }

    async fn complete_enrollment(&self, enrollment_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(e) = inner.enrollments.iter_mut().find(|e| e.id == enrollment_id) {
            if e.status == EnrollmentStatus::Active {
                e.status = EnrollmentStatus::Completed;
                e.completed_at = Some(at);
            }
        }
        Ok(())
    }

    async fn published_unit_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        Ok(self.inner.lock().published_units.get(&course_id).cloned().unwrap_or_default())
    }

    async fn upsert_progress(
        &self,
        student_id: i64,
        course_id: i64,
        unit_id: i64,
        module_id: Option<i64>,
        percentage: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<ProgressRecord> {
        let mut inner = self.inner.lock();
        if let Some(rec) = inner.progress.iter_mut().find(|r| {
            r.student_id == student_id
                && r.course_id == course_id
                && r.unit_id == unit_id
                && r.module_id == module_id
        }) {
            rec.progress_percentage = percentage;
            rec.completed_at = completed_at;
            rec.updated_at = Utc::now();
            return Ok(rec.clone());
        }
        let id = inner.next_id();
        let rec = ProgressRecord {
            id,
            student_id,
            course_id,
            unit_id,
            module_id,
            progress_percentage: percentage,
            completed_at,
            updated_at: Utc::now(),
        };
        inner.progress.push(rec.clone());
        Ok(rec)
    }

    async fn progress_records(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Vec<ProgressRecord>> {
        let mut rows: Vec<_> = self
            .inner
            .lock()
            .progress
            .iter()
            .filter(|r| r.student_id == student_id && r.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.unit_id, r.module_id));
        Ok(rows)
    }

    async fn certificates_for_enrollment(&self, enrollment_id: i64) -> Result<Vec<Certificate>> {
        Ok(self
            .inner
            .lock()
            .certificates
            .iter()
            .filter(|c| c.enrollment_id == enrollment_id)
            .cloned()
            .collect())
    }

    async fn insert_certificate(&self, new: NewCertificate) -> Result<CertificateInsert> {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner
            .certificates
            .iter()
            .find(|c| c.enrollment_id == new.enrollment_id && c.cert_type == new.cert_type)
        {
            return Ok(CertificateInsert::Existing(existing.clone()));
        }
        let id = inner.next_id();
        let cert = Certificate {
            id,
            enrollment_id: new.enrollment_id,
            cert_type: new.cert_type,
            certificate_number: new.certificate_number,
            issued_at: Utc::now(),
            final_score: new.final_score,
            course_progress: new.course_progress,
        };
        inner.certificates.push(cert.clone());
        Ok(CertificateInsert::Created(cert))
    }

    async fn assessment_score(&self, student_id: i64, course_id: i64) -> Result<f64> {
        Ok(self.inner.lock().scores.get(&(student_id, course_id)).copied().unwrap_or(0.0))
    }
}
