//! Durable-store seam for the progress and certificate engine.
//!
//! Production traffic goes through [`PgStore`]; unit tests use the
//! in-memory implementation, which enforces the same unique keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Certificate, CertificateType, Enrollment, ProgressRecord};

pub mod pg;
pub use pg::PgStore;

#[cfg(test)]
pub mod mem;

/// Fields for a certificate about to be issued.
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub enrollment_id: i64,
    pub cert_type: CertificateType,
    pub certificate_number: String,
    pub final_score: f64,
    pub course_progress: f64,
}

/// Outcome of an atomic certificate check-and-insert. A uniqueness
/// conflict on (enrollment, type) resolves to `Existing`, never an error.
#[derive(Debug, Clone)]
pub enum CertificateInsert {
    Created(Certificate),
    Existing(Certificate),
}

impl CertificateInsert {
    pub fn into_certificate(self) -> Certificate {
        match self {
            CertificateInsert::Created(c) | CertificateInsert::Existing(c) => c,
        }
    }
}

#[async_trait]
pub trait LmsStore: Clone + Send + Sync + 'static {
    async fn create_enrollment(&self, student_id: i64, course_id: i64) -> Result<Enrollment>;

    async fn active_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>>;

    /// Enrollment regardless of status. Enrollments are never hard-deleted,
    /// so certificate history stays reachable after completion.
    async fn find_enrollment(&self, student_id: i64, course_id: i64)
        -> Result<Option<Enrollment>>;

    /// Transition an active enrollment to completed. No-op if it already is.
    async fn complete_enrollment(&self, enrollment_id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Ids of published units for a course, in position order.
    async fn published_unit_ids(&self, course_id: i64) -> Result<Vec<i64>>;

    /// Upsert keyed by (student, course, unit, module); last write wins.
    /// `completed_at` is stored as given (the engine decides it from the
    /// percentage).
    async fn upsert_progress(
        &self,
        student_id: i64,
        course_id: i64,
        unit_id: i64,
        module_id: Option<i64>,
        percentage: f64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<ProgressRecord>;

    async fn progress_records(&self, student_id: i64, course_id: i64)
        -> Result<Vec<ProgressRecord>>;

    async fn certificates_for_enrollment(&self, enrollment_id: i64) -> Result<Vec<Certificate>>;

    /// Atomic check-and-insert against the (enrollment, type) unique key.
    async fn insert_certificate(&self, new: NewCertificate) -> Result<CertificateInsert>;

    /// Weight-weighted average of assessment scores, 0 when none recorded.
    async fn assessment_score(&self, student_id: i64, course_id: i64) -> Result<f64>;
}
