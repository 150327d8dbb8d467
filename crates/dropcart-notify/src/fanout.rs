use async_trait::async_trait;
use dropcart_core::NotificationSettings;
use futures::future::join_all;

use crate::discord::DiscordNotifier;
use crate::error::NotifyError;
use crate::telegram::TelegramNotifier;
use crate::{Notification, Notifier};

/// Sends every notification to all configured transports.
///
/// Succeeds when at least one transport delivered (or none is configured);
/// individual transport failures are logged.
#[derive(Default)]
pub struct FanoutNotifier {
    transports: Vec<(&'static str, Box<dyn Notifier>)>,
}

impl FanoutNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transport(mut self, name: &'static str, transport: Box<dyn Notifier>) -> Self {
        self.transports.push((name, transport));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transports.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.transports.is_empty() {
            return Ok(());
        }

        let results = join_all(
            self.transports
                .iter()
                .map(|(_, transport)| transport.send(notification)),
        )
        .await;

        let mut failed = 0usize;
        for ((name, _), result) in self.transports.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                tracing::warn!(
                    transport = name,
                    channel = %notification.channel_key,
                    error = %e,
                    "notification transport failed"
                );
            }
        }

        if failed == self.transports.len() {
            return Err(NotifyError::AllTransportsFailed { failed });
        }
        Ok(())
    }
}

/// Builds a [`FanoutNotifier`] from the profile's notification settings.
///
/// # Errors
///
/// Returns [`NotifyError`] if a transport cannot be constructed.
pub fn build_notifier(
    settings: &NotificationSettings,
    timeout_secs: u64,
) -> Result<FanoutNotifier, NotifyError> {
    let mut fanout = FanoutNotifier::new();

    if !settings.discord.is_empty() {
        let discord = DiscordNotifier::new(&settings.discord, timeout_secs)?;
        fanout = fanout.with_transport("discord", Box::new(discord));
    }

    if let Some(telegram) = &settings.telegram {
        let telegram = TelegramNotifier::new(&telegram.bot_token, &telegram.chat_id, timeout_secs)?;
        fanout = fanout.with_transport("telegram", Box::new(telegram));
    }

    if fanout.is_empty() {
        tracing::warn!("no notification transports configured; status goes to logs only");
    }

    Ok(fanout)
}
