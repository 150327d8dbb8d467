use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{transport} rejected notification with HTTP {status}: {body}")]
    Rejected {
        transport: &'static str,
        status: u16,
        body: String,
    },

    #[error("no {transport} channel configured for key '{key}' and no default channel")]
    UnknownChannel { transport: &'static str, key: String },

    #[error("invalid {transport} endpoint \"{url}\": {reason}")]
    InvalidEndpoint {
        transport: &'static str,
        url: String,
        reason: String,
    },

    #[error("all {failed} notification transports failed")]
    AllTransportsFailed { failed: usize },
}
