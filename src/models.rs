use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use tokio::sync::Notify;

/// Counters owned by one `UptimeMonitor`.
///
/// Only the monitor loop writes; readers get an approximately current view.
/// `ping_count` is always bumped before `failed_pings`, and readers load
/// `failed_pings` first, so a snapshot never shows more failures than pings.
pub struct MonitorState {
    pub start_time: DateTime<Utc>,
    last_ping: RwLock<Option<DateTime<Utc>>>,
    ping_count: AtomicU64,
    failed_pings: AtomicU64,
    running: AtomicBool,
    stop_requested: AtomicBool,
    stop: Notify,
}

impl MonitorState {
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            last_ping: RwLock::new(None),
            ping_count: AtomicU64::new(0),
            failed_pings: AtomicU64::new(0),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            stop: Notify::new(),
        }
    }

    pub fn record(&self, success: bool) {
        self.ping_count.fetch_add(1, Ordering::SeqCst);
        if !success {
            self.failed_pings.fetch_add(1, Ordering::SeqCst);
        }
        *self.last_ping.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }

    /// `(ping_count, failed_pings)`
    pub fn counts(&self) -> (u64, u64) {
        let failed = self.failed_pings.load(Ordering::SeqCst);
        let total = self.ping_count.load(Ordering::SeqCst);
        (total, failed)
    }

    pub fn last_ping(&self) -> Option<DateTime<Utc>> {
        *self.last_ping.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flips to running unless a stop was already requested. A stop is final:
    /// once requested, the monitor never runs again.
    pub fn begin(&self) -> bool {
        if self.stop_requested.load(Ordering::SeqCst) {
            return false;
        }
        self.running.store(true, Ordering::SeqCst);
        // A stop may land between the check and the store.
        if self.stop_requested.load(Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.stop.notify_waiters();
    }

    /// Resolves once a stop has been requested. Returns immediately if the
    /// flag is already down.
    pub async fn stopped(&self) {
        let notified = self.stop.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_running() {
            return;
        }
        notified.await;
    }
}

impl Default for MonitorState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UptimeStats {
    pub start_time: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub uptime_formatted: String,
    pub last_ping: Option<DateTime<Utc>>,
    pub total_pings: u64,
    pub failed_pings: u64,
    pub success_rate: f64,
}

/// What the bound application reports about itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "bot_status", rename_all = "snake_case")]
pub enum StatusResponse {
    Running {
        bot_username: Option<String>,
        bot_id: i64,
        bot_name: String,
        timestamp: DateTime<Utc>,
    },
    NotInitialized {
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UptimeBreakdown {
    pub seconds: f64,
    pub minutes: f64,
    pub hours: f64,
    pub days: f64,
    pub formatted: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UptimeResponse {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub uptime: UptimeBreakdown,
}
