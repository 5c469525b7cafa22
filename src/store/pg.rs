use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Db;
use crate::error::Result;
use crate::models::{Certificate, Enrollment, EnrollmentStatus, ProgressRecord};

use super::{CertificateInsert, LmsStore, NewCertificate};

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LmsStore for PgStore {
    async fn create_enrollment(&self, student_id: i64, course_id: i64) -> Result<Enrollment> {
        // Enrollments are never hard-deleted; re-enrolling returns the
        // existing row.
        let inserted = sqlx::query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (student_id, course_id, status)
            VALUES ($1, $2, 'active')
            ON CONFLICT (student_id, course_id) DO NOTHING
            RETURNING id, student_id, course_id, status, enrolled_at, completed_at
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(enrollment) = inserted {
            return Ok(enrollment);
        }

        let existing = sqlx::query_as::<_, Enrollment>(
            "SELECT id, student_id, course_id, status, enrolled_at, completed_at
             FROM enrollments WHERE student_id = $1 AND course_id = $2",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.db)
        .await?;
        Ok(existing)
    }

    async fn active_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, Enrollment>(
            "SELECT id, student_id, course_id, status, enrolled_at, completed_at
             FROM enrollments
             WHERE student_id = $1 AND course_id = $2 AND status = $3",
        )
        .bind(student_id)
        .bind(course_id)
        .bind(EnrollmentStatus::Active)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn find_enrollment(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Option<Enrollment>> {
        let row = sqlx::query_as::<_, Enrollment>(
            "SELECT id, student_id, course_id, status, enrolled_at, completed_at
             FROM enrollments WHERE student_id = $1 AND course_id = $2",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn complete_enrollment(&self, enrollment_id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE enrollments SET status = $2, completed_at = $3
             WHERE id = $1 AND status = $4",
        )
        .bind(enrollment_id)
        .bind(EnrollmentStatus::Completed)
        .bind(at)
        .bind(EnrollmentStatus::Active)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn published_unit_ids(&self, course_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM units WHERE course_id = $1 AND published ORDER BY position, id",
        )
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
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
        // Conflict target matches the unique index with a coalesced
        // module_id so the unit-level record (module_id NULL) participates.
        let rec = sqlx::query_as::<_, ProgressRecord>(
            r#"
            INSERT INTO progress_records
                (student_id, course_id, unit_id, module_id, progress_percentage, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (student_id, course_id, unit_id, COALESCE(module_id, 0))
            DO UPDATE SET
                progress_percentage = EXCLUDED.progress_percentage,
                completed_at = EXCLUDED.completed_at,
                updated_at = now()
            RETURNING id, student_id, course_id, unit_id, module_id,
                      progress_percentage, completed_at, updated_at
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(unit_id)
        .bind(module_id)
        .bind(percentage)
        .bind(completed_at)
        .fetch_one(&self.db)
        .await?;
        Ok(rec)
    }

    async fn progress_records(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Vec<ProgressRecord>> {
        let rows = sqlx::query_as::<_, ProgressRecord>(
            "SELECT id, student_id, course_id, unit_id, module_id,
                    progress_percentage, completed_at, updated_at
             FROM progress_records
             WHERE student_id = $1 AND course_id = $2
             ORDER BY unit_id, module_id NULLS FIRST",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn certificates_for_enrollment(&self, enrollment_id: i64) -> Result<Vec<Certificate>> {
        let rows = sqlx::query_as::<_, Certificate>(
            "SELECT id, enrollment_id, cert_type, certificate_number, issued_at,
                    final_score, course_progress
             FROM certificates WHERE enrollment_id = $1",
        )
        .bind(enrollment_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn insert_certificate(&self, new: NewCertificate) -> Result<CertificateInsert> {
        let inserted = sqlx::query_as::<_, Certificate>(
            r#"
            INSERT INTO certificates
                (enrollment_id, cert_type, certificate_number, final_score, course_progress)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (enrollment_id, cert_type) DO NOTHING
            RETURNING id, enrollment_id, cert_type, certificate_number, issued_at,
                      final_score, course_progress
            "#,
        )
        .bind(new.enrollment_id)
        .bind(new.cert_type)
        .bind(&new.certificate_number)
        .bind(new.final_score)
        .bind(new.course_progress)
        .fetch_optional(&self.db)
        .await?;

        if let Some(cert) = inserted {
            return Ok(CertificateInsert::Created(cert));
        }

        // Lost the race (or re-requested): the row for this (enrollment,
        // type) already exists and is immutable.
        let existing = sqlx::query_as::<_, Certificate>(
            "SELECT id, enrollment_id, cert_type, certificate_number, issued_at,
                    final_score, course_progress
             FROM certificates WHERE enrollment_id = $1 AND cert_type = $2",
        )
        .bind(new.enrollment_id)
        .bind(new.cert_type)
        .fetch_one(&self.db)
        .await?;
        Ok(CertificateInsert::Existing(existing))
    }

    async fn assessment_score(&self, student_id: i64, course_id: i64) -> Result<f64> {
        let score = sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(SUM(score * weight) / NULLIF(SUM(weight), 0), 0)
             FROM assessment_results WHERE student_id = $1 AND course_id = $2",
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.db)
        .await?;
        Ok(score)
    }
}
