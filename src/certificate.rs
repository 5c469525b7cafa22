//! Certificate issuance. At most one certificate per (enrollment, type);
//! the complete certificate is the stronger credential and is always
//! evaluated before the virtual one.

use chrono::{Datelike, Utc};

use crate::error::{EligibilityReport, Error, Result};
use crate::models::{Certificate, CertificateType, Enrollment, EnrollmentStatus};
use crate::progress::{overall_progress, ProgressEngine};
use crate::store::{CertificateInsert, LmsStore, NewCertificate};

/// `CERT-{course:3digits}-{student:4digits}-{year}`. Deterministic, so a
/// re-issued request in the same year maps to the same number.
pub fn certificate_number(course_id: i64, student_id: i64, year: i32) -> String {
    format!("CERT-{:03}-{:04}-{}", course_id % 1000, student_id % 10_000, year)
}

impl<S: LmsStore> ProgressEngine<S> {
    /// Issue (or idempotently return) the certificate the student is
    /// entitled to for this course.
    ///
    /// Completed enrollments stay eligible: issuance itself completes the
    /// enrollment, and a re-request must return the existing certificate.
    /// Only a missing or cancelled enrollment is rejected.
    pub async fn generate_certificate(
        &self,
        student_id: i64,
        course_id: i64,
    ) -> Result<Certificate> {
        let enrollment = self
            .store
            .find_enrollment(student_id, course_id)
            .await?
            .filter(|e| e.status != EnrollmentStatus::Cancelled)
            .ok_or(Error::NoActiveEnrollment)?;

        let records = self.store.progress_records(student_id, course_id).await?;
        let published = self.store.published_unit_ids(course_id).await?;
        let progress = overall_progress(&published, &records);
        let score = self.store.assessment_score(student_id, course_id).await?;
        let thresholds = self.thresholds;

        let existing = self.store.certificates_for_enrollment(enrollment.id).await?;
        let held =
            |ty: CertificateType| existing.iter().find(|c| c.cert_type == ty).cloned();

        if let Some(cert) = held(CertificateType::Complete) {
            return Ok(cert);
        }

        let complete_eligible = score >= thresholds.complete_certificate
            && progress >= thresholds.virtual_certificate;
        if complete_eligible {
            return self.issue(&enrollment, CertificateType::Complete, score, progress).await;
        }

        if let Some(cert) = held(CertificateType::Virtual) {
            return Ok(cert);
        }
        if progress >= thresholds.virtual_certificate {
            return self.issue(&enrollment, CertificateType::Virtual, score, progress).await;
        }

        Err(Error::NotEligible(EligibilityReport {
            course_progress: progress,
            final_score: score,
            pass_threshold: thresholds.pass,
            virtual_certificate_threshold: thresholds.virtual_certificate,
            complete_certificate_threshold: thresholds.complete_certificate,
        }))
    }

    pub async fn certificates(&self, student_id: i64, course_id: i64) -> Result<Vec<Certificate>> {
        let enrollment = self
            .store
            .find_enrollment(student_id, course_id)
            .await?
            .ok_or(Error::NotFound("enrollment"))?;
        self.store.certificates_for_enrollment(enrollment.id).await
    }

    async fn issue(
        &self,
        enrollment: &Enrollment,
        cert_type: CertificateType,
        final_score: f64,
        course_progress: f64,
    ) -> Result<Certificate> {
        let number =
            certificate_number(enrollment.course_id, enrollment.student_id, Utc::now().year());
        let outcome = self
            .store
            .insert_certificate(NewCertificate {
                enrollment_id: enrollment.id,
                cert_type,
                certificate_number: number,
                final_score,
                course_progress,
            })
            .await?;

        match outcome {
            CertificateInsert::Created(cert) => {
                self.notifier.certificate_issued(&cert);
                self.store.complete_enrollment(enrollment.id, Utc::now()).await?;
                Ok(cert)
            }
            // Concurrent request won the insert; theirs is ours.
            CertificateInsert::Existing(cert) => Ok(cert),
        }
    }
}
