//! Telegram bot transport. Every channel key goes to the single configured chat,
//! prefixed with the key.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::json;

use crate::error::NotifyError;
use crate::{Notification, Notifier};

const TRANSPORT: &str = "telegram";
const DEFAULT_BASE_URL: &str = "https://api.telegram.org/";

/// Telegram captions are capped at 1024 characters.
const MAX_CAPTION_CHARS: usize = 1024;

pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
    base_url: Url,
}

impl TelegramNotifier {
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(bot_token: &str, chat_id: &str, timeout_secs: u64) -> Result<Self, NotifyError> {
        Self::with_base_url(bot_token, chat_id, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a notifier against a custom API base (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Http`] if the HTTP client cannot be built, or
    /// [`NotifyError::InvalidEndpoint`] if `base_url` is not a valid URL.
    pub fn with_base_url(
        bot_token: &str,
        chat_id: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("dropcart/0.1 (notifications)")
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| NotifyError::InvalidEndpoint {
            transport: TRANSPORT,
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            bot_token: bot_token.to_owned(),
            chat_id: chat_id.to_owned(),
            base_url,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url, NotifyError> {
        // Tokens contain ':', so build the string instead of `Url::join`,
        // which would read `bot<id>:` as a scheme.
        Url::parse(&format!("{}bot{}/{method}", self.base_url, self.bot_token))
            .map_err(|e| NotifyError::InvalidEndpoint {
                transport: TRANSPORT,
                url: format!("{}bot<token>/{method}", self.base_url),
                reason: e.to_string(),
            })
    }

    fn message_text(notification: &Notification) -> String {
        format!("[{}] {}", notification.channel_key, notification.text)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let text = Self::message_text(notification);

        let request = match &notification.image {
            None => self.client.post(self.method_url("sendMessage")?).json(&json!({
                "chat_id": self.chat_id,
                "text": text,
            })),
            Some(png) => {
                let caption: String = text.chars().take(MAX_CAPTION_CHARS).collect();
                let photo = Part::bytes(png.clone())
                    .file_name("screenshot.png")
                    .mime_str("image/png")?;
                let form = Form::new()
                    .text("chat_id", self.chat_id.clone())
                    .text("caption", caption)
                    .part("photo", photo);
                self.client
                    .post(self.method_url("sendPhoto")?)
                    .multipart(form)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                transport: TRANSPORT,
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(channel = %notification.channel_key, "telegram notification delivered");
        Ok(())
    }
}
