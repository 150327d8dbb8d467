//! The page-automation port consumed by the checkout core.
//!
//! One [`PageSession`] is one isolated browsing context (own cookies, own
//! page). Sessions are never shared between storefront adapters.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::PageError;

/// A cookie as seen by the current browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
}

/// A network response observed by the page after the last
/// [`PageSession::reset_network_log`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedResponse {
    pub url: String,
    /// `None` when the browser did not report a status.
    pub status: Option<u16>,
}

/// Predicate for [`PageSession::wait_for_response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    /// Substring the response URL must contain.
    pub url_contains: String,
    /// Required HTTP status, if any.
    pub status: Option<u16>,
}

impl ResponseMatcher {
    #[must_use]
    pub fn new(url_contains: impl Into<String>) -> Self {
        Self {
            url_contains: url_contains.into(),
            status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn matches(&self, response: &ObservedResponse) -> bool {
        if !response.url.contains(&self.url_contains) {
            return false;
        }
        match self.status {
            None => true,
            Some(expected) => response.status == Some(expected),
        }
    }
}

impl std::fmt::Display for ResponseMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "response {} with status {status}", self.url_contains),
            None => write!(f, "response {}", self.url_contains),
        }
    }
}

/// Driver-level operations on one browsing context.
///
/// Every call may fail with [`PageError::Timeout`]; callers treat timeouts as
/// recoverable.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    async fn wait_for_selector(&self, selector: &str, timeout: Duration)
        -> Result<(), PageError>;

    /// Immediate presence check, no waiting.
    async fn is_present(&self, selector: &str) -> Result<bool, PageError>;

    /// `Ok(false)` when the element is missing or disabled.
    async fn is_enabled(&self, selector: &str) -> Result<bool, PageError>;

    async fn click(&self, selector: &str) -> Result<(), PageError>;

    /// Makes a hidden or disabled control visible and clicks it from script.
    async fn force_click(&self, selector: &str) -> Result<(), PageError>;

    /// Ticks a checkbox or radio button.
    async fn check(&self, selector: &str) -> Result<(), PageError>;

    async fn focus(&self, selector: &str) -> Result<(), PageError>;

    async fn clear(&self, selector: &str) -> Result<(), PageError>;

    async fn type_text(&self, selector: &str, value: &str) -> Result<(), PageError>;

    /// Types one keystroke at a time, for widgets that reject bulk input.
    async fn type_keys(&self, selector: &str, value: &str) -> Result<(), PageError>;

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), PageError>;

    /// `textContent` of the first match, or `None` when nothing matches.
    async fn eval_text(&self, selector: &str) -> Result<Option<String>, PageError>;

    /// Forget responses observed so far.
    async fn reset_network_log(&self) -> Result<(), PageError>;

    async fn wait_for_response(
        &self,
        matcher: &ResponseMatcher,
        timeout: Duration,
    ) -> Result<ObservedResponse, PageError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, PageError>;

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, PageError>;

    async fn close(&self) -> Result<(), PageError>;
}

/// Factory for isolated browsing sessions.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, PageError>;
}
