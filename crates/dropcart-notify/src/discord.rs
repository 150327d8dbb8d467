//! Discord webhook transport.
//!
//! One webhook per channel key; keys without their own webhook fall back to
//! the [`DEFAULT_CHANNEL`] webhook. Messages go out as an embed with an
//! `@here` mention; screenshots are attached to the same request.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde_json::json;

use crate::error::NotifyError;
use crate::{Notification, Notifier, DEFAULT_CHANNEL};

const TRANSPORT: &str = "discord";

/// Embed accent colour (Discord blurple).
const EMBED_COLOR: u32 = 0x0058_65F2;

pub struct DiscordNotifier {
    client: Client,
    webhooks: BTreeMap<String, Url>,
}

impl DiscordNotifier {
    /// Creates a notifier from a `channel key -> webhook URL` map.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidEndpoint`] for an unparsable webhook URL,
    /// or [`NotifyError::Http`] if the HTTP client cannot be built.
    pub fn new(webhooks: &BTreeMap<String, String>, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("dropcart/0.1 (notifications)")
            .build()?;

        let webhooks = webhooks
            .iter()
            .map(|(key, raw)| {
                Url::parse(raw)
                    .map(|url| (key.clone(), url))
                    .map_err(|e| NotifyError::InvalidEndpoint {
                        transport: TRANSPORT,
                        // Webhook URLs carry their token; report the key only.
                        url: format!("<webhook for '{key}'>"),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Self { client, webhooks })
    }

    fn webhook_for(&self, key: &str) -> Result<&Url, NotifyError> {
        self.webhooks
            .get(key)
            .or_else(|| self.webhooks.get(DEFAULT_CHANNEL))
            .ok_or_else(|| NotifyError::UnknownChannel {
                transport: TRANSPORT,
                key: key.to_owned(),
            })
    }

    fn payload(notification: &Notification) -> serde_json::Value {
        json!({
            "content": "@here",
            "allowed_mentions": { "parse": ["everyone"] },
            "embeds": [{
                "title": notification.channel_key,
                "description": notification.text,
                "color": EMBED_COLOR,
            }]
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = self.webhook_for(&notification.channel_key)?.clone();
        let payload = Self::payload(notification);

        let request = match &notification.image {
            None => self.client.post(url).json(&payload),
            Some(png) => {
                let file = Part::bytes(png.clone())
                    .file_name("screenshot.png")
                    .mime_str("image/png")?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", file);
                self.client.post(url).multipart(form)
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

        tracing::debug!(channel = %notification.channel_key, "discord notification delivered");
        Ok(())
    }
}
