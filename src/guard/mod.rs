//! Layered request admission: whitelist, permanent and ephemeral IP
//! blocks, suspicious-activity escalation, and per-class fixed-window
//! rate limiting.
//!
//! The guard never raises to the caller. Every deny path produces a
//! complete HTTP response; everything else fails open so an internal
//! accounting hiccup can never block legitimate traffic.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use crate::config::{GuardConfig, LimitClass};
use crate::notify::Notifier;

pub mod blocklist;
pub mod limiter;

use blocklist::{BlockInfo, BlockStore, SuspiciousTracker};
use limiter::{Decision, RateLimiter};

/// Authenticated principal, set by the (out-of-scope) auth layer as a
/// request extension. Rate limiting keys on the user when present.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

#[derive(Debug)]
pub enum Admission {
    /// Whitelisted requests carry no rate-limit headers.
    Allowed(Option<Decision>),
    Blocked { reason: String },
    RateLimited(Decision),
}

pub struct AccessGuard {
    config: GuardConfig,
    limiter: RateLimiter,
    blocks: BlockStore,
    suspicious: SuspiciousTracker,
    notifier: Arc<dyn Notifier>,
}

impl AccessGuard {
    pub fn new(config: GuardConfig, notifier: Arc<dyn Notifier>) -> Self {
        let suspicious = SuspiciousTracker::new(config.suspicious_ttl);
        Self {
            config,
            limiter: RateLimiter::new(),
            blocks: BlockStore::new(),
            suspicious,
            notifier,
        }
    }

    /// Evaluate one request in the fixed order: whitelist, permanent
    /// block, ephemeral block, suspicious flag (log only), rate limit.
    pub fn evaluate(&self, ip: IpAddr, user_id: Option<i64>, class: LimitClass) -> Admission {
        if self.config.whitelist.contains(&ip) {
            return Admission::Allowed(None);
        }

        if self.config.permanent_blocklist.contains(&ip) {
            tracing::warn!(%ip, "request from permanently blocked ip");
            return Admission::Blocked { reason: "permanent blocklist".to_string() };
        }

        if let Some(entry) = self.blocks.get(ip) {
            return Admission::Blocked { reason: entry.reason };
        }

        let identity =
            user_id.map_or_else(|| ip.to_string(), |id| format!("user:{id}"));

        let flagged = self.suspicious.count(&identity);
        if flagged >= 3 {
            tracing::warn!(identity = %identity, violations = flagged, "request from flagged identity");
        }

        let decision =
            self.limiter.check_and_record(class, &identity, self.config.rule(class));
        if decision.allowed {
            return Admission::Allowed(Some(decision));
        }

        let violations = self.suspicious.record_violation(&identity);
        if violations == self.config.suspicious_alert_threshold {
            self.notifier.suspicious_alert(&identity, violations);
        }
        if violations >= self.config.suspicious_block_threshold {
            self.blocks.block(ip, "repeated rate limit violations", self.config.auto_block_duration);
            tracing::warn!(%ip, violations, "ip auto-blocked after repeated violations");
        }

        Admission::RateLimited(decision)
    }

    // --- administrator operations ---

    pub fn block_manual(
        &self,
        actor: &str,
        ip: IpAddr,
        reason: &str,
        duration: Option<Duration>,
    ) -> BlockInfo {
        let duration = duration.unwrap_or(self.config.auto_block_duration);
        let entry = self.blocks.block(ip, reason, duration);
        self.notifier.block_audit(actor, ip, reason, Some(duration));
        BlockInfo {
            ip,
            expires_in_secs: entry.remaining().as_secs(),
            reason: entry.reason,
            blocked_at: entry.blocked_at,
        }
    }

    /// Returns false if there was no live block to remove.
    pub fn unblock_manual(&self, actor: &str, ip: IpAddr) -> bool {
        let removed = self.blocks.unblock(ip);
        if removed {
            self.notifier.block_audit(actor, ip, "unblocked", None);
        }
        removed
    }

    pub fn list_blocks(&self) -> Vec<BlockInfo> {
        self.blocks.list()
    }

    /// Drop expired windows, blocks, and violation counters to bound
    /// memory. Called periodically from a background task.
    pub fn cleanup(&self) {
        self.limiter.cleanup(|class| self.config.rule(class));
        self.blocks.prune();
        self.suspicious.prune();
    }
}

/// Pick the limit class from the request path and authentication state.
pub fn limit_class(path: &str, authenticated: bool) -> LimitClass {
    if path.starts_with("/api/auth/login") {
        LimitClass::Login
    } else if path.starts_with("/api/auth/register") {
        LimitClass::Register
    } else if path.starts_with("/api/admin") {
        LimitClass::Admin
    } else if path.starts_with("/api/uploads") {
        LimitClass::Upload
    } else if authenticated {
        LimitClass::Api
    } else {
        LimitClass::Guest
    }
}

pub async fn guard_middleware(
    State(guard): State<Arc<AccessGuard>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = addr.ip();
    let user_id = req.extensions().get::<AuthUser>().map(|u| u.0);
    let class = limit_class(req.uri().path(), user_id.is_some());

    match guard.evaluate(ip, user_id, class) {
        Admission::Allowed(decision) => {
            let mut response = next.run(req).await;
            if let Some(d) = decision {
                apply_rate_limit_headers(response.headers_mut(), &d);
            }
            response
        }
        Admission::Blocked { reason } => {
            tracing::info!(%ip, reason = %reason, "request blocked");
            let body = serde_json::json!({
                "error": "access_forbidden",
                "message": "access from this address is blocked",
            });
            (StatusCode::FORBIDDEN, Json(body)).into_response()
        }
        Admission::RateLimited(d) => {
            let retry_after = d.reset_after.as_secs().max(1);
            let body = serde_json::json!({
                "error": "rate_limit_exceeded",
                "message": "too many requests, please slow down",
                "retry_after": retry_after,
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            if let Ok(v) = retry_after.to_string().parse() {
                headers.insert(header::RETRY_AFTER, v);
            }
            apply_rate_limit_headers(headers, &d);
            response
        }
    }
}

fn apply_rate_limit_headers(headers: &mut axum::http::HeaderMap, d: &Decision) {
    let reset_epoch = Utc::now().timestamp() + d.reset_after.as_secs() as i64;
    for (name, value) in [
        ("x-ratelimit-limit", d.limit.to_string()),
        ("x-ratelimit-remaining", d.remaining.to_string()),
        ("x-ratelimit-reset", reset_epoch.to_string()),
    ] {
        if let Ok(v) = value.parse() {
            headers.insert(name, v);
        }
    }
}
