use std::net::SocketAddr;
use thiserror::Error;

/// Why a single probe was counted as a failure.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0}s")]
    Timeout(u64),
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("unexpected status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ProbeError {
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else if err.is_connect() || err.is_request() {
            Self::Network(err)
        } else {
            Self::Unexpected(err.to_string())
        }
    }
}

/// A fault that escaped a probe cycle. Recovered by the loop after a cooldown.
#[derive(Debug, Error)]
pub enum LoopFault {
    #[error("probe cycle panicked: {0}")]
    Panicked(String),
}

/// Health server startup failure. Fatal for the process.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind health server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to ask the bound application for its identity.
///
/// Request URLs embed the bot token, so `Request` errors must be built from
/// `reqwest::Error::without_url`.
#[derive(Debug, Error)]
pub enum StatusQueryError {
    #[error("identity request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("bot API error: {0}")]
    Api(String),
    #[error("malformed identity response: {0}")]
    Decode(String),
}
