use std::collections::HashSet;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Endpoint class used to pick a rate-limit rule. Derived from the request
/// path and authentication state, each class carries its own window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitClass {
    Login,
    Register,
    Api,
    Upload,
    Admin,
    Guest,
}

impl LimitClass {
    pub fn as_str(self) -> &'static str {
        match self {
            LimitClass::Login => "login",
            LimitClass::Register => "register",
            LimitClass::Api => "api",
            LimitClass::Upload => "upload",
            LimitClass::Admin => "admin",
            LimitClass::Guest => "guest",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LimitRule {
    pub max_attempts: u32,
    pub decay: Duration,
}

impl LimitRule {
    pub fn new(max_attempts: u32, decay_secs: u64) -> Self {
        Self { max_attempts, decay: Duration::from_secs(decay_secs) }
    }
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub whitelist: HashSet<IpAddr>,
    pub permanent_blocklist: HashSet<IpAddr>,
    pub login: LimitRule,
    pub register: LimitRule,
    pub api: LimitRule,
    pub upload: LimitRule,
    pub admin: LimitRule,
    pub guest: LimitRule,
    /// Violations within the suspicious TTL before a critical alert fires.
    pub suspicious_alert_threshold: u32,
    /// Violations within the suspicious TTL before an automatic block.
    pub suspicious_block_threshold: u32,
    pub suspicious_ttl: Duration,
    pub auto_block_duration: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            whitelist: HashSet::new(),
            permanent_blocklist: HashSet::new(),
            login: LimitRule::new(50, 900),
            register: LimitRule::new(10, 3600),
            api: LimitRule::new(500, 3600),
            upload: LimitRule::new(10, 3600),
            admin: LimitRule::new(500, 3600),
            guest: LimitRule::new(20, 3600),
            suspicious_alert_threshold: 5,
            suspicious_block_threshold: 10,
            suspicious_ttl: Duration::from_secs(24 * 3600),
            auto_block_duration: Duration::from_secs(3600),
        }
    }
}

impl GuardConfig {
    pub fn rule(&self, class: LimitClass) -> LimitRule {
        match class {
            LimitClass::Login => self.login,
            LimitClass::Register => self.register,
            LimitClass::Api => self.api,
            LimitClass::Upload => self.upload,
            LimitClass::Admin => self.admin,
            LimitClass::Guest => self.guest,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CertificateThresholds {
    /// Minimum final score counted as a pass.
    pub pass: f64,
    /// Course progress required for a virtual certificate.
    pub virtual_certificate: f64,
    /// Final score required for a complete certificate.
    pub complete_certificate: f64,
}

impl Default for CertificateThresholds {
    fn default() -> Self {
        Self { pass: 70.0, virtual_certificate: 100.0, complete_certificate: 70.0 }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub thresholds: CertificateThresholds,
    pub guard: GuardConfig,
}

impl AppConfig {
    /// Build from environment variables, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = CertificateThresholds::default();
        let thresholds = CertificateThresholds {
            pass: env_f64("PASS_THRESHOLD", defaults.pass),
            virtual_certificate: env_f64(
                "VIRTUAL_CERTIFICATE_THRESHOLD",
                defaults.virtual_certificate,
            ),
            complete_certificate: env_f64(
                "COMPLETE_CERTIFICATE_THRESHOLD",
                defaults.complete_certificate,
            ),
        };

        let gd = GuardConfig::default();
        let guard = GuardConfig {
            whitelist: env_ip_set("GUARD_WHITELIST"),
            permanent_blocklist: env_ip_set("GUARD_BLOCKLIST"),
            login: env_rule("RATE_LIMIT_LOGIN", gd.login),
            register: env_rule("RATE_LIMIT_REGISTER", gd.register),
            api: env_rule("RATE_LIMIT_API", gd.api),
            upload: env_rule("RATE_LIMIT_UPLOAD", gd.upload),
            admin: env_rule("RATE_LIMIT_ADMIN", gd.admin),
            guest: env_rule("RATE_LIMIT_GUEST", gd.guest),
            ..gd
        };

        Self { thresholds, guard }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Rules are given as "max/decay_secs", e.g. `RATE_LIMIT_LOGIN=50/900`.
fn env_rule(key: &str, default: LimitRule) -> LimitRule {
    env::var(key)
        .ok()
        .and_then(|s| {
            let (max, decay) = s.split_once('/')?;
            Some(LimitRule::new(max.trim().parse().ok()?, decay.trim().parse().ok()?))
        })
        .unwrap_or(default)
}

fn env_ip_set(key: &str) -> HashSet<IpAddr> {
    env::var(key)
        .ok()
        .map(|s| s.split(',').filter_map(|ip| ip.trim().parse().ok()).collect())
        .unwrap_or_default()
}
