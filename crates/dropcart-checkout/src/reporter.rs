//! Status reporting: tracing plus the notification side channel.
//!
//! Every send is awaited so delivery order follows workflow order. A failed
//! delivery is logged and never interrupts the purchase attempt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dropcart_browser::PageSession;
use dropcart_notify::{Notification, Notifier};

#[derive(Clone)]
pub struct Reporter {
    notifier: Arc<dyn Notifier>,
    screenshot_dir: Option<PathBuf>,
}

impl Reporter {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            screenshot_dir: None,
        }
    }

    /// Also persist every screenshot under `dir`.
    #[must_use]
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub async fn text(&self, channel: &str, message: &str) {
        tracing::info!(channel, "{message}");
        self.deliver(Notification::text(channel, message)).await;
    }

    /// Captures the page, saves it as `<unix-millis>_<label>.png` and sends it
    /// with `message`. Falls back to text when the capture fails.
    pub async fn screenshot(
        &self,
        channel: &str,
        session: &dyn PageSession,
        label: &str,
        message: &str,
    ) {
        tracing::info!(channel, label, "{message}");

        let png = match session.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                tracing::warn!(channel, label, error = %e, "screenshot capture failed");
                self.deliver(Notification::text(channel, message)).await;
                return;
            }
        };

        if let Some(dir) = &self.screenshot_dir {
            persist(dir, label, &png).await;
        }

        self.deliver(Notification::text(channel, message).with_image(png))
            .await;
    }

    async fn deliver(&self, notification: Notification) {
        if let Err(e) = self.notifier.send(&notification).await {
            tracing::warn!(
                channel = %notification.channel_key,
                error = %e,
                "notification delivery failed"
            );
        }
    }
}

fn screenshot_file_name(label: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let label: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{millis}_{label}.png")
}

async fn persist(dir: &Path, label: &str, png: &[u8]) {
    let path = dir.join(screenshot_file_name(label));
    let result = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, png).await
    }
    .await;

    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "screenshot saved"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "screenshot not saved"),
    }
}
