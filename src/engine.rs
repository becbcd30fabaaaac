use anyhow::{Context, Result};
use chrono::Utc;
use futures::FutureExt;
use reqwest::StatusCode;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{LoopFault, ProbeError};
use crate::models::{MonitorState, UptimeStats};
use crate::utils::{format_duration, round2};

/// Pause after a probe cycle blew up, before normal scheduling resumes.
pub const FAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// A statistics line is logged whenever the ping count hits a multiple of this.
pub const STATS_EVERY: u64 = 10;

pub struct UptimeMonitor {
    pub config: MonitorConfig,
    pub state: Arc<MonitorState>,
    http_client: reqwest::Client,
    #[cfg(test)]
    script: std::sync::Mutex<std::collections::VecDeque<tests::Scripted>>,
}

impl UptimeMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            config,
            state: Arc::new(MonitorState::new()),
            http_client,
            #[cfg(test)]
            script: Default::default(),
        })
    }

    /// Sends one GET to the target and records the outcome.
    ///
    /// Returns `true` only for HTTP 200. Every failure is counted and logged
    /// here; nothing escapes.
    pub async fn probe(&self) -> bool {
        let outcome = self.send_probe().await;
        self.state.record(outcome.is_ok());

        match outcome {
            Ok(status) => {
                info!(url = %self.config.url, %status, "Ping successful");
                true
            }
            Err(ProbeError::UnexpectedStatus(status)) => {
                warn!(url = %self.config.url, %status, "Ping returned non-OK status");
                false
            }
            Err(e @ ProbeError::Timeout(_)) => {
                error!(url = %self.config.url, "Ping timeout: {}", e);
                false
            }
            Err(e @ ProbeError::Network(_)) => {
                error!(url = %self.config.url, "Network error during ping: {}", e);
                false
            }
            Err(e @ ProbeError::Unexpected(_)) => {
                error!(url = %self.config.url, "Unexpected error during ping: {}", e);
                false
            }
        }
    }

    async fn send_probe(&self) -> Result<StatusCode, ProbeError> {
        #[cfg(test)]
        {
            if let Some(step) = self.next_scripted() {
                return step.outcome();
            }
        }

        let timeout = Duration::from_secs(self.config.timeout);
        let request = self.http_client.get(&self.config.url).send();
        let response = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| ProbeError::Timeout(self.config.timeout))?
            .map_err(|e| ProbeError::from_reqwest(e, self.config.timeout))?;

        match response.status() {
            StatusCode::OK => Ok(StatusCode::OK),
            other => Err(ProbeError::UnexpectedStatus(other)),
        }
    }

    pub fn stats(&self) -> UptimeStats {
        let (total, failed) = self.state.counts();
        let uptime_seconds =
            (Utc::now() - self.state.start_time).num_milliseconds().max(0) as f64 / 1000.0;
        let success_rate = if total == 0 {
            0.0
        } else {
            round2((total - failed) as f64 / total as f64 * 100.0)
        };

        UptimeStats {
            start_time: self.state.start_time,
            uptime_seconds,
            uptime_formatted: format_duration(uptime_seconds),
            last_ping: self.state.last_ping(),
            total_pings: total,
            failed_pings: failed,
            success_rate,
        }
    }

    /// Runs the probe loop until [`stop_monitoring`](Self::stop_monitoring) is
    /// called or the task is dropped.
    ///
    /// The first probe goes out immediately; later ones follow `interval`.
    pub async fn start_monitoring(&self) {
        if !self.state.begin() {
            info!(url = %self.config.url, "Uptime monitor already stopped, not starting");
            return;
        }
        info!(url = %self.config.url, "Starting uptime monitor");
        info!(interval_secs = self.config.interval, "Ping interval");
        info!(timeout_secs = self.config.timeout, "Request timeout");

        let interval = Duration::from_secs(self.config.interval);
        loop {
            if let Err(fault) = self.run_cycle().await {
                error!("Error in monitoring loop: {}", fault);
                if !self.pause(FAULT_COOLDOWN).await {
                    break;
                }
            }
            if !self.pause(interval).await {
                break;
            }
        }

        info!("Uptime monitor stopped");
    }

    pub fn stop_monitoring(&self) {
        info!("Stopping uptime monitor...");
        self.state.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    async fn run_cycle(&self) -> Result<(), LoopFault> {
        AssertUnwindSafe(self.probe())
            .catch_unwind()
            .await
            .map_err(|panic| LoopFault::Panicked(panic_message(panic.as_ref())))?;

        let (total, _) = self.state.counts();
        if total > 0 && total % STATS_EVERY == 0 {
            let stats = self.stats();
            info!(
                "Stats: {} pings, {}% success, uptime: {}",
                stats.total_pings, stats.success_rate, stats.uptime_formatted
            );
        }
        Ok(())
    }

    /// Sleeps for `duration` unless a stop arrives first. `false` means stop.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.state.is_running(),
            _ = self.state.stopped() => {
                info!("Monitoring cancelled");
                false
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Mutex, PoisonError};
    use tokio::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Canned outcome used in place of a network round trip.
    #[derive(Debug, Clone, Copy)]
    pub(super) enum Scripted {
        Ok,
        Status(u16),
        Panic,
    }

    impl Scripted {
        pub(super) fn outcome(self) -> Result<StatusCode, ProbeError> {
            match self {
                Scripted::Ok => Ok(StatusCode::OK),
                Scripted::Status(code) => Err(ProbeError::UnexpectedStatus(
                    StatusCode::from_u16(code).unwrap(),
                )),
                Scripted::Panic => panic!("scripted cycle fault"),
            }
        }
    }

    impl UptimeMonitor {
        pub(super) fn next_scripted(&self) -> Option<Scripted> {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
        }

        fn push_script(&self, steps: impl IntoIterator<Item = Scripted>) {
            self.script.lock().unwrap().extend(steps);
        }
    }

    fn scripted_monitor(
        interval: u64,
        steps: impl IntoIterator<Item = Scripted>,
    ) -> Arc<UptimeMonitor> {
        let monitor = UptimeMonitor::new(MonitorConfig {
            url: "http://127.0.0.1:9/health".into(),
            interval,
            timeout: 1,
        })
        .unwrap();
        monitor.push_script(steps);
        Arc::new(monitor)
    }

    fn spawn_loop(monitor: &Arc<UptimeMonitor>) -> tokio::task::JoinHandle<()> {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.start_monitoring().await })
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn monitor_for(url: String, timeout: u64) -> UptimeMonitor {
        UptimeMonitor::new(MonitorConfig {
            url,
            interval: 1,
            timeout,
        })
        .unwrap()
    }

    /// An address nothing listens on.
    async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/health", addr)
    }

    #[tokio::test]
    async fn ok_response_is_success() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let monitor = monitor_for(format!("{}/health", mock.uri()), 5);
        assert!(monitor.probe().await);
        assert_eq!(monitor.state.counts(), (1, 0));
        assert!(monitor.state.last_ping().is_some());
    }

    #[tokio::test]
    async fn server_error_counts_once_as_failure() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock)
            .await;

        let monitor = monitor_for(mock.uri(), 5);
        assert!(!monitor.probe().await);
        assert_eq!(monitor.state.counts(), (1, 1));
        assert!(monitor.state.last_ping().is_some());
    }

    #[tokio::test]
    async fn other_success_codes_are_not_ok() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock)
            .await;

        let monitor = monitor_for(mock.uri(), 5);
        assert!(!monitor.probe().await);
        assert_eq!(monitor.state.counts(), (1, 1));
    }

    #[tokio::test]
    async fn refused_connection_is_failure() {
        let monitor = monitor_for(closed_port_url().await, 2);
        assert!(!monitor.probe().await);
        assert_eq!(monitor.state.counts(), (1, 1));
        assert!(monitor.state.last_ping().is_some());
    }

    #[tokio::test]
    async fn slow_target_times_out() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock)
            .await;

        let monitor = monitor_for(mock.uri(), 1);
        let started = std::time::Instant::now();
        assert!(!monitor.probe().await);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(monitor.state.counts(), (1, 1));
    }

    #[tokio::test]
    async fn stats_before_any_probe() {
        let monitor = monitor_for("http://127.0.0.1:1/".into(), 1);
        let stats = monitor.stats();
        assert_eq!(stats.total_pings, 0);
        assert_eq!(stats.failed_pings, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert!(stats.last_ping.is_none());
        assert!(stats.uptime_seconds >= 0.0);
        assert!(!stats.uptime_formatted.is_empty());
    }

    #[tokio::test]
    async fn success_rate_is_rounded() {
        let monitor = monitor_for("http://127.0.0.1:1/".into(), 1);
        monitor.state.record(true);
        monitor.state.record(true);
        monitor.state.record(false);
        let stats = monitor.stats();
        assert_eq!(stats.total_pings, 3);
        assert_eq!(stats.failed_pings, 1);
        assert_eq!(stats.success_rate, 66.67);
    }

    #[tokio::test]
    async fn stop_during_sleep_ends_loop_without_extra_probe() {
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let monitor = Arc::new(
            UptimeMonitor::new(MonitorConfig {
                url: mock.uri(),
                interval: 3600,
                timeout: 5,
            })
            .unwrap(),
        );
        let task = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.start_monitoring().await })
        };

        for _ in 0..100 {
            if monitor.state.counts().0 == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(monitor.state.counts().0, 1);
        assert!(monitor.is_running());

        monitor.stop_monitoring();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop should exit promptly")
            .unwrap();
        assert!(!monitor.is_running());
        assert_eq!(monitor.state.counts().0, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_fault_is_survived_after_cooldown_and_interval() {
        let monitor = scripted_monitor(60, [Scripted::Panic, Scripted::Ok, Scripted::Ok]);
        let started = Instant::now();
        let task = spawn_loop(&monitor);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(monitor.is_running());
        assert_eq!(monitor.state.counts(), (0, 0));

        // Cooldown plus one interval has to pass before the next ping.
        tokio::time::sleep_until(started + FAULT_COOLDOWN + Duration::from_secs(59)).await;
        assert_eq!(monitor.state.counts(), (0, 0));
        tokio::time::sleep_until(started + FAULT_COOLDOWN + Duration::from_secs(61)).await;
        assert_eq!(monitor.state.counts(), (1, 0));

        tokio::time::sleep_until(started + FAULT_COOLDOWN + Duration::from_secs(121)).await;
        assert_eq!(monitor.state.counts(), (2, 0));
        assert!(monitor.is_running());

        monitor.stop_monitoring();
        task.await.unwrap();
        assert_eq!(monitor.state.counts(), (2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_are_logged_on_the_tenth_ping() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer({
                let captured = captured.clone();
                move || captured.clone()
            })
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut steps = vec![Scripted::Ok; 9];
        steps.push(Scripted::Status(500));
        let monitor = scripted_monitor(1, steps);
        let started = Instant::now();
        let task = spawn_loop(&monitor);

        tokio::time::sleep_until(started + Duration::from_millis(8_500)).await;
        assert_eq!(monitor.state.counts().0, 9);
        assert!(!captured.text().contains("Stats:"));

        tokio::time::sleep_until(started + Duration::from_millis(9_500)).await;
        assert_eq!(monitor.state.counts(), (10, 1));
        monitor.stop_monitoring();
        task.await.unwrap();

        let logs = captured.text();
        assert_eq!(logs.matches("Stats:").count(), 1);
        assert!(logs.contains("Stats: 10 pings, 90% success"));
    }

    #[tokio::test]
    async fn stop_before_start_keeps_loop_from_running() {
        let monitor = scripted_monitor(1, [Scripted::Ok]);
        monitor.stop_monitoring();
        tokio::time::timeout(Duration::from_secs(1), monitor.start_monitoring())
            .await
            .expect("start after stop should return at once");
        assert!(!monitor.is_running());
        assert_eq!(monitor.state.counts(), (0, 0));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
