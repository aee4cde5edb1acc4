//! Best-effort alerting
//!
//! Alerts never influence a stage's outcome: delivery failures are logged
//! and swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use t20i_common::{PipelineError, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Render the invocation alert (Telegram HTML)
pub fn format_alert(at: DateTime<Utc>, stage: &str, success: bool, body: &str) -> String {
    let status = if success { "SUCCESS ✅" } else { "ERROR ❌" };
    format!(
        "<b>Date:</b> {}\n<b>Time:</b> {}\n<b>Stage:</b> {}\n\
         <b>Status:</b> {}\n<b>Response:</b> {}",
        at.format("%d-%m-%Y"),
        at.format("%H:%M:%S"),
        escape_html(stage),
        status,
        escape_html(body)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Telegram bot alerts
pub struct TelegramAlerts {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramAlerts {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        Self::with_api_base(config, TELEGRAM_API_BASE)
    }

    pub fn with_api_base(config: TelegramConfig, api_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PipelineError::ConfigurationMissing(format!("HTTP client for alerts: {}", e))
            })?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: config.bot_token,
            chat_id: config.chat_id,
        })
    }
}

#[async_trait]
impl AlertChannel for TelegramAlerts {
    async fn notify(&self, message: &str) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let payload = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "HTML",
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("Alert delivered");
            },
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                warn!(%status, response = %text, "Failed to send alert");
            },
            Err(e) => warn!(error = %e, "Failed to send alert"),
        }
    }
}

/// Channel used when no credentials are configured
pub struct LogOnlyAlerts;

#[async_trait]
impl AlertChannel for LogOnlyAlerts {
    async fn notify(&self, message: &str) {
        info!(alert = message, "Alert (no channel configured)");
    }
}

/// Keeps every alert in memory
#[derive(Default)]
pub struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl AlertChannel for RecordingAlerts {
    async fn notify(&self, message: &str) {
        self.messages.lock().await.push(message.to_string());
    }
}
