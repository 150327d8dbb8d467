//! Top-level retry loop.
//!
//! `starting` checks the purchase guard and logs adapters in, then the loop
//! alternates `running-round` and `between-rounds-waiting` until a purchase
//! (or dry run) ends it in `done`, or an unrecoverable failure ends it in
//! `aborted`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dropcart_core::{AppConfig, RunMode, Storefront};
use dropcart_notify::DEFAULT_CHANNEL;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::adapter::RetailerAdapter;
use crate::backoff::{RetrySchedule, WaitReason};
use crate::error::{CheckoutError, OrchestratorError};
use crate::guard::PurchaseGuard;
use crate::reporter::Reporter;
use crate::workflow::{run_purchase_round, AdapterRoundOutcome};

/// Pause between consecutive storefront logins.
const LOGIN_PAUSE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub run_mode: RunMode,
    pub schedule: RetrySchedule,
    /// Sign every adapter in before round 1.
    pub login: bool,
    pub login_pause: Duration,
    pub notify_grace: Duration,
    pub max_rounds: Option<u32>,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            run_mode: config.run_mode,
            schedule: RetrySchedule::new(
                Duration::from_secs(config.backoff_min_secs),
                Duration::from_secs(config.backoff_max_secs),
                Duration::from_secs(config.antibot_cooldown_secs),
            ),
            login: !config.guest_checkout,
            login_pause: LOGIN_PAUSE,
            notify_grace: Duration::from_secs(config.notify_grace_secs),
            max_rounds: config.max_rounds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Starting,
    RunningRound { round: u32 },
    BetweenRounds { round: u32, wait: Duration, reason: WaitReason },
    Done,
    Aborted,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Starting => f.write_str("starting"),
            OrchestratorState::RunningRound { round } => write!(f, "running-round({round})"),
            OrchestratorState::BetweenRounds { round, .. } => {
                write!(f, "between-rounds-waiting({round})")
            }
            OrchestratorState::Done => f.write_str("done"),
            OrchestratorState::Aborted => f.write_str("aborted"),
        }
    }
}

/// What one round produced, after combining every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundResult {
    Purchased { storefront: Storefront, product: String },
    DryRun { storefront: Storefront, product: String },
    /// Another writer set the guard mid-round.
    GuardSet,
    SessionLost { storefront: Storefront, reason: String },
    AntiBot { storefront: Storefront },
    Cancelled,
    NothingPurchased,
}

impl RoundResult {
    fn from_adapter(
        storefront: Storefront,
        result: Result<AdapterRoundOutcome, CheckoutError>,
    ) -> Self {
        match result {
            Ok(AdapterRoundOutcome::Purchased { product }) => {
                RoundResult::Purchased { storefront, product }
            }
            Ok(AdapterRoundOutcome::DryRun { product }) => RoundResult::DryRun { storefront, product },
            Ok(AdapterRoundOutcome::NotPurchased { .. }) => RoundResult::NothingPurchased,
            Err(CheckoutError::AntiBot { .. }) => RoundResult::AntiBot { storefront },
            Err(CheckoutError::AlreadyPurchased) => RoundResult::GuardSet,
            Err(CheckoutError::Cancelled) => RoundResult::Cancelled,
            Err(e) => RoundResult::SessionLost {
                storefront,
                reason: e.to_string(),
            },
        }
    }

    /// Ordering used when concurrent adapters settle differently.
    fn precedence(&self) -> u8 {
        match self {
            RoundResult::Purchased { .. } => 6,
            RoundResult::DryRun { .. } => 5,
            RoundResult::GuardSet => 4,
            RoundResult::SessionLost { .. } => 3,
            RoundResult::AntiBot { .. } => 2,
            RoundResult::Cancelled => 1,
            RoundResult::NothingPurchased => 0,
        }
    }

    /// Ends the round for every other adapter.
    fn is_decisive(&self) -> bool {
        !matches!(self, RoundResult::NothingPurchased)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRecord {
    pub round: u32,
    pub result: RoundResult,
    /// Wait that followed the round, if another round followed.
    pub wait: Option<(Duration, WaitReason)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Guard already set: nothing to do.
    AlreadyPurchased,
    Purchased { storefront: Storefront, product: String },
    DryRunComplete { storefront: Storefront, product: String },
    RoundLimitReached { rounds: u32 },
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub rounds: Vec<RoundRecord>,
}

pub struct Orchestrator {
    adapters: Vec<Box<dyn RetailerAdapter>>,
    guard: Arc<PurchaseGuard>,
    reporter: Reporter,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        adapters: Vec<Box<dyn RetailerAdapter>>,
        guard: Arc<PurchaseGuard>,
        reporter: Reporter,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            adapters,
            guard,
            reporter,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Cancelling this token stops the run after in-flight steps unwind.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn enter(state: OrchestratorState) {
        tracing::info!(%state, "orchestrator state");
    }

    /// Runs until `done` or `aborted`.
    ///
    /// With the guard already set this returns at once without touching any
    /// adapter.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] when the run is aborted.
    pub async fn run(self) -> Result<RunReport, OrchestratorError> {
        Self::enter(OrchestratorState::Starting);

        if self.guard.exists() {
            tracing::info!(path = %self.guard.path().display(), "purchase already recorded; nothing to do");
            Self::enter(OrchestratorState::Done);
            return Ok(RunReport {
                outcome: RunOutcome::AlreadyPurchased,
                rounds: Vec::new(),
            });
        }
        if self.adapters.is_empty() {
            Self::enter(OrchestratorState::Aborted);
            return Err(OrchestratorError::NoAdapters);
        }

        let result = self.drive().await;
        self.finish(&result).await;
        result
    }

    async fn drive(&self) -> Result<RunReport, OrchestratorError> {
        if self.settings.login {
            self.login_all().await?;
        }

        self.reporter
            .text(
                DEFAULT_CHANNEL,
                &format!(
                    "Starting purchase attempts on {} storefront(s).",
                    self.adapters.len()
                ),
            )
            .await;

        let mut rounds = Vec::new();
        let mut round = 0u32;
        loop {
            round += 1;
            Self::enter(OrchestratorState::RunningRound { round });
            let result = self.run_round().await;

            let finished = match &result {
                RoundResult::Purchased {
                    storefront,
                    product,
                } => Some(RunOutcome::Purchased {
                    storefront: *storefront,
                    product: product.clone(),
                }),
                RoundResult::DryRun {
                    storefront,
                    product,
                } => Some(RunOutcome::DryRunComplete {
                    storefront: *storefront,
                    product: product.clone(),
                }),
                RoundResult::GuardSet => Some(RunOutcome::AlreadyPurchased),
                RoundResult::SessionLost { storefront, reason } => {
                    return Err(OrchestratorError::SessionLost {
                        storefront: *storefront,
                        reason: reason.clone(),
                    });
                }
                RoundResult::Cancelled => Some(RunOutcome::Cancelled),
                RoundResult::AntiBot { .. } | RoundResult::NothingPurchased => {
                    self.cancel.is_cancelled().then_some(RunOutcome::Cancelled)
                }
            };

            if let Some(outcome) = finished {
                rounds.push(RoundRecord {
                    round,
                    result,
                    wait: None,
                });
                return Ok(RunReport { outcome, rounds });
            }

            if self.settings.max_rounds.is_some_and(|max| round >= max) {
                tracing::info!(round, "round limit reached");
                rounds.push(RoundRecord {
                    round,
                    result,
                    wait: None,
                });
                return Ok(RunReport {
                    outcome: RunOutcome::RoundLimitReached { rounds: round },
                    rounds,
                });
            }

            let reason = if matches!(result, RoundResult::AntiBot { .. }) {
                WaitReason::AntiBotCooldown
            } else {
                WaitReason::Backoff
            };
            let wait = self.settings.schedule.wait_for(reason);
            rounds.push(RoundRecord {
                round,
                result,
                wait: Some((wait, reason)),
            });

            Self::enter(OrchestratorState::BetweenRounds {
                round,
                wait,
                reason,
            });
            #[allow(clippy::cast_possible_truncation)]
            let delay_ms = wait.as_millis() as u64;
            match reason {
                WaitReason::AntiBotCooldown => {
                    tracing::warn!(round, delay_ms, "anti-bot signal; cooling down");
                    self.reporter
                        .text(
                            DEFAULT_CHANNEL,
                            &format!(
                                "Anti-bot protection triggered. Cooling down for {} s before round {}.",
                                wait.as_secs(),
                                round + 1
                            ),
                        )
                        .await;
                }
                WaitReason::Backoff => {
                    tracing::info!(round, delay_ms, "no purchase this round; backing off");
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(RunReport { outcome: RunOutcome::Cancelled, rounds });
                }
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn login_all(&self) -> Result<(), OrchestratorError> {
        for (index, adapter) in self.adapters.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.login_pause).await;
            }
            let storefront = adapter.storefront();
            if let Err(e) = adapter.login().await {
                tracing::error!(%storefront, error = %e, "login failed");
                self.reporter
                    .text(storefront.key(), &format!("Login failed: {e}"))
                    .await;
                return Err(OrchestratorError::Login(e));
            }
            self.reporter.text(storefront.key(), "Logged in.").await;
        }
        Ok(())
    }

    async fn run_round(&self) -> RoundResult {
        match self.settings.run_mode {
            RunMode::Sequential => self.run_sequential().await,
            RunMode::Concurrent => self.run_concurrent().await,
        }
    }

    async fn run_sequential(&self) -> RoundResult {
        for adapter in &self.adapters {
            let result =
                run_purchase_round(adapter.as_ref(), &self.guard, &self.reporter, &self.cancel)
                    .await;
            let result = RoundResult::from_adapter(adapter.storefront(), result);
            if result.is_decisive() {
                return result;
            }
        }
        RoundResult::NothingPurchased
    }

    /// Every adapter on its own session at once. The first decisive result
    /// cancels the rest; the round ends when all have settled.
    async fn run_concurrent(&self) -> RoundResult {
        let round_cancel = self.cancel.child_token();
        let mut pending: FuturesUnordered<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let round_cancel = &round_cancel;
                async move {
                    let result = run_purchase_round(
                        adapter.as_ref(),
                        &self.guard,
                        &self.reporter,
                        round_cancel,
                    )
                    .await;
                    RoundResult::from_adapter(adapter.storefront(), result)
                }
            })
            .collect();

        let mut decided = RoundResult::NothingPurchased;
        while let Some(result) = pending.next().await {
            if result.is_decisive() && !round_cancel.is_cancelled() {
                tracing::debug!(?result, "cancelling remaining adapters");
                round_cancel.cancel();
            }
            if result.precedence() > decided.precedence() {
                decided = result;
            }
        }
        decided
    }

    async fn finish(&self, result: &Result<RunReport, OrchestratorError>) {
        let message = match result {
            Ok(report) => {
                Self::enter(OrchestratorState::Done);
                match &report.outcome {
                    RunOutcome::Purchased {
                        storefront,
                        product,
                    } => format!("Purchase complete: {product} from {storefront}. Shutting down."),
                    RunOutcome::DryRunComplete {
                        storefront,
                        product,
                    } => format!(
                        "Dry run complete: {product} from {storefront} reached the final step. No order placed."
                    ),
                    RunOutcome::AlreadyPurchased => {
                        "A purchase is already recorded. Shutting down.".to_owned()
                    }
                    RunOutcome::RoundLimitReached { rounds } => {
                        format!("Stopping after {rounds} round(s) without a purchase.")
                    }
                    RunOutcome::Cancelled => "Stopped by operator.".to_owned(),
                }
            }
            Err(e) => {
                Self::enter(OrchestratorState::Aborted);
                tracing::error!(error = %e, "run aborted");
                format!("Run aborted: {e}")
            }
        };

        self.reporter.text(DEFAULT_CHANNEL, &message).await;
        tokio::time::sleep(self.settings.notify_grace).await;

        for adapter in &self.adapters {
            if let Err(e) = adapter.close().await {
                tracing::warn!(storefront = %adapter.storefront(), error = %e, "closing session failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_precedence_prefers_purchase() {
        let purchased = RoundResult::Purchased {
            storefront: Storefront::Walmart,
            product: "PS5".to_owned(),
        };
        let anti_bot = RoundResult::AntiBot {
            storefront: Storefront::BestBuy,
        };
        assert!(purchased.precedence() > anti_bot.precedence());
        assert!(anti_bot.precedence() > RoundResult::Cancelled.precedence());
        assert!(!RoundResult::NothingPurchased.is_decisive());
    }

    #[test]
    fn adapter_errors_classify() {
        let result = RoundResult::from_adapter(
            Storefront::BestBuy,
            Err(CheckoutError::AntiBot {
                storefront: Storefront::BestBuy,
            }),
        );
        assert_eq!(
            result,
            RoundResult::AntiBot {
                storefront: Storefront::BestBuy
            }
        );
        assert_eq!(
            RoundResult::from_adapter(Storefront::BestBuy, Err(CheckoutError::AlreadyPurchased)),
            RoundResult::GuardSet
        );
    }

    #[test]
    fn state_display() {
        assert_eq!(OrchestratorState::Starting.to_string(), "starting");
        assert_eq!(
            OrchestratorState::BetweenRounds {
                round: 2,
                wait: Duration::from_secs(1),
                reason: WaitReason::Backoff
            }
            .to_string(),
            "between-rounds-waiting(2)"
        );
    }
}
