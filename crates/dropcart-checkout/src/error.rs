use std::path::PathBuf;

use dropcart_browser::PageError;
use dropcart_core::Storefront;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while working a product through a storefront.
///
/// Most variants are local to one product: the workflow logs them and moves
/// on. [`CheckoutError::is_run_fatal`] picks out the few that must reach the
/// orchestrator.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The product (or checkout) page never resolved, including a queue or
    /// soft-block page that did not clear within the wait ceiling.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// A page-displayed identifier did not match the configured key.
    #[error("{descriptor} mismatch: expected '{expected}', page shows '{actual}'")]
    Mismatch {
        descriptor: &'static str,
        expected: String,
        actual: String,
    },

    /// Add-to-cart produced no confirming signal.
    #[error("add to cart for '{product}' not confirmed: {reason}")]
    Cart { product: String, reason: String },

    /// A checkout step could not be completed.
    #[error("checkout step '{step}' failed: {reason}")]
    Checkout { step: &'static str, reason: String },

    /// Order total was unparsable (zero) or above the budget.
    #[error("order total {total} rejected against budget {budget}")]
    BudgetExceeded { total: Decimal, budget: Decimal },

    #[error("login to {storefront} failed: {reason}")]
    Login {
        storefront: Storefront,
        reason: String,
    },

    /// The storefront's protection cookie says this session was flagged.
    #[error("anti-bot protection flagged the {storefront} session")]
    AntiBot { storefront: Storefront },

    /// The purchase guard is already set; no further mutations allowed.
    #[error("a purchase has already been recorded")]
    AlreadyPurchased,

    #[error("attempt cancelled")]
    Cancelled,

    #[error(transparent)]
    Page(#[from] PageError),
}

impl CheckoutError {
    /// `true` for errors that must stop the adapter's product loop and reach
    /// the orchestrator.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        match self {
            CheckoutError::AntiBot { .. }
            | CheckoutError::AlreadyPurchased
            | CheckoutError::Cancelled => true,
            CheckoutError::Page(e) => e.is_session_lost(),
            CheckoutError::Navigation { .. }
            | CheckoutError::Mismatch { .. }
            | CheckoutError::Cart { .. }
            | CheckoutError::Checkout { .. }
            | CheckoutError::BudgetExceeded { .. }
            | CheckoutError::Login { .. } => false,
        }
    }

    /// Wraps a page error as a failed checkout step, keeping lost sessions
    /// distinguishable.
    pub(crate) fn step(step: &'static str, err: PageError) -> Self {
        if err.is_session_lost() {
            CheckoutError::Page(err)
        } else {
            CheckoutError::Checkout {
                step,
                reason: err.to_string(),
            }
        }
    }
}

/// Failure to persist the purchase marker.
#[derive(Debug, Error)]
#[error("purchase guard at {path} could not be written: {source}")]
pub struct GuardError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failures that end a run in the `aborted` state.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("no retailer adapters configured")]
    NoAdapters,

    #[error("login phase failed: {0}")]
    Login(#[source] CheckoutError),

    #[error("{storefront} browser session lost: {reason}")]
    SessionLost {
        storefront: Storefront,
        reason: String,
    },
}
