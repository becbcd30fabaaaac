//! Identity queries against the bound bot.
//!
//! The health surface only ever asks "who are you"; everything else the bot
//! does lives outside this crate.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::StatusQueryError;
use crate::models::BotIdentity;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_me(&self) -> Result<BotIdentity, StatusQueryError>;
}

/// Asks the Telegram Bot API for the bot's own account via `getMe`.
pub struct TelegramIdentity {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ApiEnvelope {
    ok: bool,
    result: Option<BotIdentity>,
    description: Option<String>,
}

impl TelegramIdentity {
    pub fn new(api_url: &str, token: &str) -> Result<Self, StatusQueryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| StatusQueryError::Request(e.without_url()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/getMe", api_url.trim_end_matches('/'), token),
        })
    }
}

#[async_trait]
impl IdentityProvider for TelegramIdentity {
    async fn get_me(&self) -> Result<BotIdentity, StatusQueryError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| StatusQueryError::Request(e.without_url()))?;
        let status = response.status();
        let envelope: ApiEnvelope = response.json().await.map_err(|e| {
            StatusQueryError::Decode(format!("HTTP {}: {}", status, e.without_url()))
        })?;

        if !envelope.ok {
            return Err(StatusQueryError::Api(
                envelope.description.unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }
        envelope
            .result
            .ok_or_else(|| StatusQueryError::Decode("missing result".into()))
    }
}
