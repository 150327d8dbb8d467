use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`crate::PageSession`] or [`crate::PageDriver`].
#[derive(Debug, Error)]
pub enum PageError {
    /// A bounded wait ran out. Always recoverable.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("no element matches selector {selector}")]
    ElementNotFound { selector: String },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The WebDriver connection or browser session is gone.
    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("failed to start browser session: {0}")]
    SessionStart(String),

    #[error("driver command failed: {0}")]
    Command(String),
}

impl PageError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Timeout { .. })
    }

    /// `true` when no further command on this session can succeed.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, PageError::SessionLost(_) | PageError::SessionStart(_))
    }
}
