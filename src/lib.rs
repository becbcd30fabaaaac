//! Keep-alive monitoring for a long-running bot process.
//!
//! [`engine::UptimeMonitor`] pings a URL on a fixed interval and keeps
//! success/failure counters. [`api::HealthServer`] answers `/`, `/health`,
//! `/status` and `/uptime` for external uptime checkers. The two only meet
//! in the binary's wiring.

pub mod api;
pub mod bot;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod utils;

pub use api::HealthServer;
pub use config::{AppConfig, MonitorConfig};
pub use engine::UptimeMonitor;
