//! Ephemeral IP blocks and suspicious-activity accounting.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct BlockEntry {
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    expires: Instant,
}

impl BlockEntry {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }

    pub fn remaining(&self) -> Duration {
        self.expires.saturating_duration_since(Instant::now())
    }
}

/// Admin-facing view of one block entry.
#[derive(Debug, Clone, Serialize)]
pub struct BlockInfo {
    pub ip: IpAddr,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_in_secs: u64,
}

/// TTL-keyed block store. Expired entries are pruned on read.
#[derive(Debug, Default)]
pub struct BlockStore {
    entries: Mutex<HashMap<IpAddr, BlockEntry>>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ip: IpAddr) -> Option<BlockEntry> {
        let mut entries = self.entries.lock();
        match entries.get(&ip) {
            Some(entry) if entry.is_expired() => {
                entries.remove(&ip);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    pub fn block(&self, ip: IpAddr, reason: &str, duration: Duration) -> BlockEntry {
        let entry = BlockEntry {
            reason: reason.to_string(),
            blocked_at: Utc::now(),
            expires: Instant::now() + duration,
        };
        self.entries.lock().insert(ip, entry.clone());
        entry
    }

    /// Returns false if no live entry existed.
    pub fn unblock(&self, ip: IpAddr) -> bool {
        self.entries.lock().remove(&ip).is_some_and(|e| !e.is_expired())
    }

    pub fn prune(&self) {
        self.entries.lock().retain(|_, e| !e.is_expired());
    }

    pub fn list(&self) -> Vec<BlockInfo> {
        let mut entries = self.entries.lock();
        entries.retain(|_, e| !e.is_expired());
        entries
            .iter()
            .map(|(&ip, e)| BlockInfo {
                ip,
                reason: e.reason.clone(),
                blocked_at: e.blocked_at,
                expires_in_secs: e.remaining().as_secs(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
struct SuspiciousEntry {
    count: u32,
    first_violation: Instant,
}

/// Violation counter per identity with a rolling-from-first-hit TTL.
/// Absent entries read as zero; the tracker never fails a request.
#[derive(Debug)]
pub struct SuspiciousTracker {
    ttl: Duration,
    entries: Mutex<HashMap<String, SuspiciousEntry>>,
}

impl SuspiciousTracker {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Record one violation and return the updated count within the TTL.
    pub fn record_violation(&self, identity: &str) -> u32 {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(identity.to_string())
            .or_insert(SuspiciousEntry { count: 0, first_violation: now });

        if now.duration_since(entry.first_violation) >= self.ttl {
            entry.count = 0;
            entry.first_violation = now;
        }
        entry.count += 1;
        entry.count
    }

    pub fn prune(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, e| now.duration_since(e.first_violation) < self.ttl);
    }

    pub fn count(&self, identity: &str) -> u32 {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(identity)
            .filter(|e| now.duration_since(e.first_violation) < self.ttl)
            .map_or(0, |e| e.count)
    }
}
