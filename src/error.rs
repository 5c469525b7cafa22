use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// Diagnostic payload for a failed certificate request, so the caller can
/// show "how close" feedback.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityReport {
    pub course_progress: f64,
    pub final_score: f64,
    pub pass_threshold: f64,
    pub virtual_certificate_threshold: f64,
    pub complete_certificate_threshold: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("no active enrollment for this student and course")]
    NoActiveEnrollment,

    #[error("certificate requirements not met")]
    NotEligible(EligibilityReport),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<EligibilityReport>,
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, code, details) = match &self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", None),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            Error::NoActiveEnrollment => (StatusCode::NOT_FOUND, "no_active_enrollment", None),
            Error::NotEligible(report) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "certificate_not_eligible",
                Some(report.clone()),
            ),
            Error::Store(e) => {
                tracing::error!(error = %e, "store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let message = self.to_string();
        (status, Json(ErrorBody { error: code, message, details })).into_response()
    }
}
