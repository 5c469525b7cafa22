use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "enrollment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One row per (student, course, unit, module) key; module_id is null for
/// the unit-level record. Upsert semantics, last write wins.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ProgressRecord {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    pub unit_id: i64,
    pub module_id: Option<i64>,
    pub progress_percentage: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "certificate_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CertificateType {
    /// Awarded for progress completion alone.
    Virtual,
    /// Awarded for progress completion plus a qualifying assessment score.
    Complete,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Certificate {
    pub id: i64,
    pub enrollment_id: i64,
    pub cert_type: CertificateType,
    pub certificate_number: String,
    pub issued_at: DateTime<Utc>,
    pub final_score: f64,
    pub course_progress: f64,
}

// --- request/response DTOs ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateEnrollmentReq {
    pub student_id: i64,
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateProgressReq {
    pub unit_id: i64,
    pub module_id: Option<i64>,
    pub percentage: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProgressUpdate {
    pub unit_progress: f64,
    pub course_progress: f64,
    pub is_completed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModuleProgress {
    pub module_id: i64,
    pub progress_percentage: f64,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UnitProgress {
    pub unit_id: i64,
    pub progress_percentage: f64,
    pub completed_at: Option<DateTime<Utc>>,
    pub modules: Vec<ModuleProgress>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseProgress {
    pub overall_progress: f64,
    pub can_generate_certificate: bool,
    pub units: Vec<UnitProgress>,
}
