//! Notification sinks
//!
//! Delivery is best effort: the orchestrator logs a failed send and moves on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{failed} of {total} notification sinks failed")]
    Partial { failed: usize, total: usize },
}

/// Destination for human-readable status messages
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        tracing::info!(target: "instaflow::notify", "{}", text);
        Ok(())
    }
}

/// Telegram Bot API `sendMessage`
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct TelegramMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        // The URL embeds the bot token; strip it from any error.
        let response = self
            .client
            .post(self.endpoint())
            .json(&TelegramMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        let body: TelegramResponse = response.json().await.map_err(reqwest::Error::without_url)?;
        if !status.is_success() || !body.ok {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message: body
                    .description
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        Ok(())
    }
}

/// Generic JSON webhook: `POST {"text": "..."}`
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Sends to every sink, failing only if at least one sink failed
#[derive(Default, Clone)]
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }
}

#[async_trait]
impl NotificationSink for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let mut failed = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.send(text).await {
                tracing::warn!("Notification via {} failed: {}", sink.name(), e);
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(NotifyError::Partial {
                failed,
                total: self.sinks.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationSink for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            self.messages.lock().unwrap().push(text.to_string());
            if self.fail {
                return Err(NotifyError::Rejected {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_every_sink() {
        let failing = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let ok = Arc::new(Recording::default());
        let fanout = FanoutNotifier::new()
            .with_sink(failing.clone())
            .with_sink(ok.clone());

        let err = fanout.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Partial { failed: 1, total: 2 }));
        assert_eq!(ok.messages.lock().unwrap().as_slice(), ["hello"]);
        assert_eq!(failing.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_fanout_succeeds() {
        assert!(FanoutNotifier::new().send("noop").await.is_ok());
    }

    #[test]
    fn test_telegram_debug_hides_token() {
        let notifier = TelegramNotifier::new("123:secret-token", "42")
            .with_api_base("http://localhost:9999/");
        let debug = format!("{:?}", notifier);
        assert!(!debug.contains("secret-token"));
        assert_eq!(
            notifier.endpoint(),
            "http://localhost:9999/bot123:secret-token/sendMessage"
        );
    }
}
