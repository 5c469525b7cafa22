use std::net::IpAddr;
use std::time::Duration;

use crate::models::Certificate;

/// Observer for events that used to ride an implicit broadcast bus:
/// escalation alerts, certificate issuance, and manual block audit trail.
pub trait Notifier: Send + Sync {
    fn suspicious_alert(&self, identity: &str, violations: u32);
    fn certificate_issued(&self, certificate: &Certificate);
    fn block_audit(&self, actor: &str, ip: IpAddr, reason: &str, duration: Option<Duration>);
}

/// Default notifier: everything goes to the tracing pipeline.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn suspicious_alert(&self, identity: &str, violations: u32) {
        tracing::error!(identity, violations, "suspicious activity threshold reached");
    }

    fn certificate_issued(&self, certificate: &Certificate) {
        tracing::info!(
            certificate_number = %certificate.certificate_number,
            cert_type = ?certificate.cert_type,
            enrollment_id = certificate.enrollment_id,
            "certificate issued"
        );
    }

    fn block_audit(&self, actor: &str, ip: IpAddr, reason: &str, duration: Option<Duration>) {
        tracing::warn!(actor, %ip, reason, ?duration, "block list changed");
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records alerts for assertions in unit tests.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingNotifier {
        pub alerts: Arc<Mutex<Vec<(String, u32)>>>,
        pub issued: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for RecordingNotifier {
        fn suspicious_alert(&self, identity: &str, violations: u32) {
            self.alerts.lock().push((identity.to_string(), violations));
        }

        fn certificate_issued(&self, certificate: &Certificate) {
            self.issued.lock().push(certificate.certificate_number.clone());
        }

        fn block_audit(&self, _actor: &str, _ip: IpAddr, _reason: &str, _duration: Option<Duration>) {}
    }
}
