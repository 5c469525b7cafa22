//! Per-student course progress: unit-level upserts and the derived
//! course summary that gates certificate issuance.

use std::sync::Arc;

use chrono::Utc;

use crate::config::CertificateThresholds;
use crate::error::{Error, Result};
use crate::models::{CourseProgress, ModuleProgress, ProgressRecord, ProgressUpdate, UnitProgress};
use crate::notify::Notifier;
use crate::store::LmsStore;

pub struct ProgressEngine<S> {
    pub(crate) store: S,
    pub(crate) thresholds: CertificateThresholds,
    pub(crate) notifier: Arc<dyn Notifier>,
}

impl<S: Clone> Clone for ProgressEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            thresholds: self.thresholds,
            notifier: Arc::clone(&self.notifier),
        }
    }
}

impl<S: LmsStore> ProgressEngine<S> {
    pub fn new(store: S, thresholds: CertificateThresholds, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, thresholds, notifier }
    }

    /// Create (or return the existing) enrollment for the pair.
    pub async fn enroll(&self, student_id: i64, course_id: i64) -> Result<crate::models::Enrollment> {
        self.store.create_enrollment(student_id, course_id).await
    }

    /// Upsert one progress record and return the refreshed unit and
    /// course percentages. The summary is recomputed from the store after
    /// the write, so it always reflects the record just written.
    pub async fn update_progress(
        &self,
        student_id: i64,
        course_id: i64,
        unit_id: i64,
        module_id: Option<i64>,
        percentage: f64,
    ) -> Result<ProgressUpdate> {
        if !(0.0..=100.0).contains(&percentage) {
            return Err(Error::Validation(format!(
                "percentage must be between 0 and 100, got {percentage}"
            )));
        }

        let completed_at = if percentage >= 100.0 { Some(Utc::now()) } else { None };
        self.store
            .upsert_progress(student_id, course_id, unit_id, module_id, percentage, completed_at)
            .await?;

        let records = self.store.progress_records(student_id, course_id).await?;
        let published = self.store.published_unit_ids(course_id).await?;
        let unit_progress = unit_progress_of(unit_id, &records);
        let course_progress = overall_progress(&published, &records);
        let is_completed = course_progress >= 100.0;

        if is_completed {
            if let Some(enrollment) =
                self.store.active_enrollment(student_id, course_id).await?
            {
                self.store.complete_enrollment(enrollment.id, Utc::now()).await?;
            }
        }

        Ok(ProgressUpdate { unit_progress, course_progress, is_completed })
    }

    /// Read-only breakdown grouped by unit, with per-module detail.
    pub async fn course_progress(&self, student_id: i64, course_id: i64) -> Result<CourseProgress> {
        let records = self.store.progress_records(student_id, course_id).await?;
        let published = self.store.published_unit_ids(course_id).await?;

        let units = published
            .iter()
            .map(|&unit_id| {
                let unit_rec = records
                    .iter()
                    .find(|r| r.unit_id == unit_id && r.module_id.is_none());
                let modules: Vec<ModuleProgress> = records
                    .iter()
                    .filter(|r| r.unit_id == unit_id && r.module_id.is_some())
                    .map(|r| ModuleProgress {
                        module_id: r.module_id.unwrap_or_default(),
                        progress_percentage: r.progress_percentage,
                        completed_at: r.completed_at,
                    })
                    .collect();
                UnitProgress {
                    unit_id,
                    progress_percentage: unit_progress_of(unit_id, &records),
                    completed_at: unit_rec.and_then(|r| r.completed_at),
                    modules,
                }
            })
            .collect();

        let overall = overall_progress(&published, &records);
        Ok(CourseProgress {
            overall_progress: overall,
            can_generate_certificate: overall >= 100.0,
            units,
        })
    }
}

/// The unit-level record (module_id null) is authoritative; with only
/// module-level records the unit percentage is their mean; no records at
/// all counts as zero.
pub(crate) fn unit_progress_of(unit_id: i64, records: &[ProgressRecord]) -> f64 {
    if let Some(rec) = records.iter().find(|r| r.unit_id == unit_id && r.module_id.is_none()) {
        return rec.progress_percentage;
    }
    let module_pcts: Vec<f64> = records
        .iter()
        .filter(|r| r.unit_id == unit_id && r.module_id.is_some())
        .map(|r| r.progress_percentage)
        .collect();
    if module_pcts.is_empty() {
        0.0
    } else {
        module_pcts.iter().sum::<f64>() / module_pcts.len() as f64
    }
}

/// completed units / published units, clamped to [0,100]. Zero published
/// units means zero progress, never a division by zero.
pub(crate) fn overall_progress(published_units: &[i64], records: &[ProgressRecord]) -> f64 {
    if published_units.is_empty() {
        return 0.0;
    }
    let completed = published_units
        .iter()
        .filter(|&&unit_id| unit_progress_of(unit_id, records) >= 100.0)
        .count();
    (completed as f64 / published_units.len() as f64 * 100.0).clamp(0.0, 100.0)
}
