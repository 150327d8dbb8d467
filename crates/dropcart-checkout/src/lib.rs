//! Purchase orchestration core.
//!
//! One [`RetailerAdapter`] per storefront drives a browser session through
//! the shared per-product workflow; the [`Orchestrator`] repeats rounds with
//! jittered backoff until exactly one purchase is recorded by the
//! [`PurchaseGuard`].

pub mod adapter;
pub mod antibot;
pub mod backoff;
pub mod error;
pub mod guard;
pub mod interstitial;
pub mod money;
pub mod orchestrator;
pub mod reporter;
pub mod retailers;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use adapter::{AdapterContext, CheckoutOutcome, CheckoutSettings, RetailerAdapter};
pub use antibot::AntiBotPolicy;
pub use backoff::{RetrySchedule, WaitReason};
pub use error::{CheckoutError, GuardError, OrchestratorError};
pub use guard::PurchaseGuard;
pub use interstitial::{InterstitialProbe, QueueWait};
pub use orchestrator::{
    Orchestrator, OrchestratorSettings, OrchestratorState, RoundRecord, RoundResult, RunOutcome,
    RunReport,
};
pub use reporter::Reporter;
pub use retailers::build_adapter;
pub use workflow::{run_purchase_round, AdapterRoundOutcome, AttemptState};
