//! Notification side channel for dropcart.
//!
//! The checkout core only sees the [`Notifier`] trait. Transports deliver a
//! [`Notification`] (text plus an optional PNG screenshot) to Discord webhooks
//! and/or a Telegram chat; [`FanoutNotifier`] sends to every configured one.

pub mod discord;
pub mod error;
pub mod fanout;
pub mod telegram;

use async_trait::async_trait;

pub use discord::DiscordNotifier;
pub use error::NotifyError;
pub use fanout::{build_notifier, FanoutNotifier};
pub use telegram::TelegramNotifier;

/// Channel key used for messages that are not tied to one storefront.
pub const DEFAULT_CHANNEL: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Storefront key (e.g. `bestbuy`) or [`DEFAULT_CHANNEL`].
    pub channel_key: String,
    pub text: String,
    /// PNG bytes.
    pub image: Option<Vec<u8>>,
}

impl Notification {
    #[must_use]
    pub fn text(channel_key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_key: channel_key.into(),
            text: text.into(),
            image: None,
        }
    }

    #[must_use]
    pub fn with_image(mut self, png: Vec<u8>) -> Self {
        self.image = Some(png);
        self
    }
}

/// Delivers notifications. Callers await every send so that delivery order
/// follows workflow order.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the transport fails to deliver.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}
