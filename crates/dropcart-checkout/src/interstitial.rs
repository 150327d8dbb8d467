//! Virtual-queue and soft-block handling.
//!
//! Under load a storefront may answer a navigation with an interstitial page
//! (queue, captcha, "blocked") instead of the requested content. The probe
//! recognises those pages; [`await_clearance`] waits, bounded, for the page to
//! move on and escalates to a human when it does not.

use std::time::Duration;

use dropcart_browser::{PageError, PageSession};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CheckoutError;
use crate::reporter::Reporter;

/// Describes how one storefront's interstitial pages look.
#[derive(Debug, Clone, Default)]
pub struct InterstitialProbe {
    url_markers: Vec<&'static str>,
    heading: Option<(&'static str, &'static str)>,
    blocking_selector: Option<&'static str>,
    expected_url_fragment: Option<String>,
}

impl InterstitialProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A URL containing `marker` is an interstitial.
    #[must_use]
    pub fn url_marker(mut self, marker: &'static str) -> Self {
        self.url_markers.push(marker);
        self
    }

    /// An element whose trimmed text equals `text` (case-insensitive).
    #[must_use]
    pub fn heading(mut self, selector: &'static str, text: &'static str) -> Self {
        self.heading = Some((selector, text));
        self
    }

    /// Any element matching `selector` (e.g. a captcha widget).
    #[must_use]
    pub fn blocking_selector(mut self, selector: &'static str) -> Self {
        self.blocking_selector = Some(selector);
        self
    }

    /// A URL that no longer contains `fragment` is an interstitial.
    #[must_use]
    pub fn expect_url_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.expected_url_fragment = Some(fragment.into());
        self
    }

    /// Returns a short description of the interstitial, or `None` when the
    /// page looks normal.
    ///
    /// # Errors
    ///
    /// Propagates [`PageError`] from the session.
    pub async fn detect(&self, session: &dyn PageSession) -> Result<Option<String>, PageError> {
        let url = session.current_url().await?;
        let lowered = url.to_ascii_lowercase();

        if let Some(marker) = self.url_markers.iter().find(|m| lowered.contains(**m)) {
            return Ok(Some(format!("redirected to {url} ({marker})")));
        }
        if let Some(fragment) = &self.expected_url_fragment {
            if !url.contains(fragment.as_str()) {
                return Ok(Some(format!("left the expected page for {url}")));
            }
        }
        if let Some(selector) = self.blocking_selector {
            if session.is_present(selector).await? {
                return Ok(Some(format!("blocking element {selector} on page")));
            }
        }
        if let Some((selector, expected)) = self.heading {
            if let Some(text) = session.eval_text(selector).await? {
                if text.trim().eq_ignore_ascii_case(expected) {
                    return Ok(Some(format!("queue page: {}", text.trim())));
                }
            }
        }
        Ok(None)
    }
}

/// Ceiling and poll interval for an interstitial wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueWait {
    pub ceiling: Duration,
    pub poll: Duration,
}

/// Where an interstitial wait reports to.
pub struct WaitContext<'a> {
    pub session: &'a dyn PageSession,
    pub reporter: &'a Reporter,
    pub channel: &'a str,
    /// What was being attempted, for notifications (e.g. "product page").
    pub doing: &'a str,
    /// Raised for as long as the wait lasts.
    pub queued: Option<&'a watch::Sender<bool>>,
}

/// Holds the queued flag up until dropped, including when the wait is
/// cancelled.
struct QueuedFlag<'a>(Option<&'a watch::Sender<bool>>);

impl<'a> QueuedFlag<'a> {
    fn raise(sender: Option<&'a watch::Sender<bool>>) -> Self {
        if let Some(sender) = sender {
            sender.send_replace(true);
        }
        Self(sender)
    }
}

impl Drop for QueuedFlag<'_> {
    fn drop(&mut self) {
        if let Some(sender) = self.0 {
            sender.send_replace(false);
        }
    }
}

/// Waits for an interstitial to clear.
///
/// Returns `Ok(false)` when no interstitial is showing, `Ok(true)` once one
/// has cleared.
///
/// # Errors
///
/// Returns [`CheckoutError::Navigation`] when the page is still blocked at the
/// ceiling, or the session error if the browser goes away.
pub async fn await_clearance(
    cx: &WaitContext<'_>,
    probe: &InterstitialProbe,
    wait: QueueWait,
) -> Result<bool, CheckoutError> {
    let reason = match probe.detect(cx.session).await {
        Ok(Some(reason)) => reason,
        Ok(None) => return Ok(false),
        Err(e) if e.is_session_lost() => return Err(e.into()),
        Err(e) => {
            tracing::debug!(channel = cx.channel, error = %e, "interstitial probe inconclusive");
            return Ok(false);
        }
    };

    let _queued = QueuedFlag::raise(cx.queued);
    tracing::warn!(channel = cx.channel, %reason, ceiling_secs = wait.ceiling.as_secs(), "interstitial detected");
    cx.reporter
        .screenshot(
            cx.channel,
            cx.session,
            "interstitial",
            &format!(
                "Held on {} ({reason}). Waiting up to {} min; check your PC if a captcha is showing.",
                cx.doing,
                wait.ceiling.as_secs() / 60
            ),
        )
        .await;

    let deadline = Instant::now() + wait.ceiling;
    let mut last = reason;
    while Instant::now() < deadline {
        tokio::time::sleep(wait.poll).await;
        match probe.detect(cx.session).await {
            Ok(None) => {
                tracing::info!(channel = cx.channel, "interstitial cleared");
                cx.reporter
                    .text(cx.channel, &format!("Through to the {}.", cx.doing))
                    .await;
                return Ok(true);
            }
            Ok(Some(reason)) => last = reason,
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(e) => tracing::debug!(channel = cx.channel, error = %e, "probe failed while waiting"),
        }
    }

    tracing::warn!(channel = cx.channel, reason = %last, "interstitial did not clear");
    cx.reporter
        .screenshot(
            cx.channel,
            cx.session,
            "interstitial-unresolved",
            &format!(
                "Still held on {} after {} min ({last}); giving up on this attempt.",
                cx.doing,
                wait.ceiling.as_secs() / 60
            ),
        )
        .await;

    let url = cx.session.current_url().await.unwrap_or_default();
    Err(CheckoutError::Navigation {
        url,
        reason: format!("interstitial unresolved after {:?}: {last}", wait.ceiling),
    })
}
