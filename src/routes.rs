use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::guard::{guard_middleware, AccessGuard, AuthUser};
use crate::guard::blocklist::BlockInfo;
use crate::models::*;
use crate::progress::ProgressEngine;
use crate::store::PgStore;

#[derive(Clone)]
pub struct AppState {
    pub engine: ProgressEngine<PgStore>,
    pub guard: Arc<AccessGuard>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/enrollments", post(create_enrollment))
        .route(
            "/api/students/:student_id/courses/:course_id/progress",
            post(update_progress).get(get_progress),
        )
        .route(
            "/api/students/:student_id/courses/:course_id/certificate",
            post(generate_certificate),
        )
        .route(
            "/api/students/:student_id/courses/:course_id/certificates",
            get(list_certificates),
        )
        .route("/api/admin/blocks", get(list_blocks).post(create_block))
        .route("/api/admin/blocks/:ip", delete(delete_block))
        .layer(middleware::from_fn_with_state(state.guard.clone(), guard_middleware))
        .with_state(state)
}

async fn create_enrollment(
    State(state): State<AppState>,
    Json(req): Json<CreateEnrollmentReq>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    let enrollment = state.engine.enroll(req.student_id, req.course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn update_progress(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateProgressReq>,
) -> Result<Json<ProgressUpdate>> {
    let update = state
        .engine
        .update_progress(student_id, course_id, req.unit_id, req.module_id, req.percentage)
        .await?;
    Ok(Json(update))
}

async fn get_progress(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(i64, i64)>,
) -> Result<Json<CourseProgress>> {
    let summary = state.engine.course_progress(student_id, course_id).await?;
    Ok(Json(summary))
}

async fn generate_certificate(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(i64, i64)>,
) -> Result<Json<Certificate>> {
    let cert = state.engine.generate_certificate(student_id, course_id).await?;
    Ok(Json(cert))
}

async fn list_certificates(
    State(state): State<AppState>,
    Path((student_id, course_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<Certificate>>> {
    let certs = state.engine.certificates(student_id, course_id).await?;
    Ok(Json(certs))
}

// --- admin block management ---

#[derive(Deserialize)]
struct CreateBlockReq {
    ip: IpAddr,
    reason: String,
    duration_secs: Option<u64>,
}

async fn list_blocks(State(state): State<AppState>) -> Json<Vec<BlockInfo>> {
    Json(state.guard.list_blocks())
}

async fn create_block(
    State(state): State<AppState>,
    actor: Option<axum::Extension<AuthUser>>,
    Json(req): Json<CreateBlockReq>,
) -> (StatusCode, Json<BlockInfo>) {
    let actor = actor.map_or_else(|| "admin".to_string(), |axum::Extension(AuthUser(id))| format!("user:{id}"));
    let info = state.guard.block_manual(
        &actor,
        req.ip,
        &req.reason,
        req.duration_secs.map(Duration::from_secs),
    );
    (StatusCode::CREATED, Json(info))
}

async fn delete_block(
    State(state): State<AppState>,
    actor: Option<axum::Extension<AuthUser>>,
    Path(ip): Path<IpAddr>,
) -> Result<StatusCode> {
    let actor = actor.map_or_else(|| "admin".to_string(), |axum::Extension(AuthUser(id))| format!("user:{id}"));
    if state.guard.unblock_manual(&actor, ip) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("block entry"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::{GuardConfig, LimitRule};
    use crate::notify::LogNotifier;

    fn guarded_app(config: GuardConfig) -> Router {
        let guard = Arc::new(AccessGuard::new(config, Arc::new(LogNotifier)));
        Router::new()
            .route("/api/ping", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(guard, guard_middleware))
    }

    fn request_from(ip: [u8; 4]) -> Request<Body> {
        let mut req = Request::builder().uri("/api/ping").body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        req
    }

    #[tokio::test]
    async fn allowed_responses_carry_rate_limit_headers() {
        let config = GuardConfig { guest: LimitRule::new(5, 3600), ..GuardConfig::default() };
        let app = guarded_app(config);

        let res = app.oneshot(request_from([10, 0, 0, 1])).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "5");
        assert_eq!(res.headers()["x-ratelimit-remaining"], "4");
        assert!(res.headers().contains_key("x-ratelimit-reset"));
    }

    #[tokio::test]
    async fn over_limit_returns_429_with_retry_after() {
        let config = GuardConfig { guest: LimitRule::new(2, 900), ..GuardConfig::default() };
        let app = guarded_app(config);

        for _ in 0..2 {
            let res = app.clone().oneshot(request_from([10, 0, 0, 2])).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app.oneshot(request_from([10, 0, 0, 2])).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
        assert!(retry_after > 0);
        assert_eq!(res.headers()["x-ratelimit-remaining"], "0");
    }

    #[tokio::test]
    async fn permanently_blocked_ip_gets_403() {
        let mut config = GuardConfig::default();
        config.permanent_blocklist.insert("10.0.0.3".parse().unwrap());
        let app = guarded_app(config);

        let res = app.oneshot(request_from([10, 0, 0, 3])).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn whitelisted_ip_skips_limits() {
        let mut config = GuardConfig { guest: LimitRule::new(0, 3600), ..GuardConfig::default() };
        config.whitelist.insert("10.0.0.4".parse().unwrap());
        let app = guarded_app(config);

        let res = app.oneshot(request_from([10, 0, 0, 4])).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key("x-ratelimit-limit"));
    }
}
