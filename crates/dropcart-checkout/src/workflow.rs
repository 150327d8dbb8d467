//! Per-adapter purchase workflow.
//!
//! For each configured product, in order: locate, availability, verify,
//! add to cart, checkout. Product-local failures move on to the next product;
//! run-fatal errors (see [`CheckoutError::is_run_fatal`]) stop the loop and
//! propagate to the orchestrator.

use std::fmt;
use std::future::Future;

use dropcart_core::Product;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::adapter::{CheckoutOutcome, RetailerAdapter};
use crate::error::CheckoutError;
use crate::guard::PurchaseGuard;
use crate::reporter::Reporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    CheckingStock,
    Verifying,
    AddingToCart,
    Queued,
    CheckingOut,
    AwaitingConfirmation,
    Purchased,
    Failed,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttemptState::Idle => "idle",
            AttemptState::CheckingStock => "checking-stock",
            AttemptState::Verifying => "verifying",
            AttemptState::AddingToCart => "adding-to-cart",
            AttemptState::Queued => "queued",
            AttemptState::CheckingOut => "checking-out",
            AttemptState::AwaitingConfirmation => "awaiting-confirmation",
            AttemptState::Purchased => "purchased",
            AttemptState::Failed => "failed",
        })
    }
}

/// Result of one adapter's pass over its product list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterRoundOutcome {
    /// Order placed and guard written.
    Purchased { product: String },
    /// Test mode reached "place order" without issuing it.
    DryRun { product: String },
    /// Every product was tried without success.
    NotPurchased { tried: usize },
}

/// One product's pass through the state machine.
struct Attempt<'a> {
    storefront: &'static str,
    product: &'a str,
    state: AttemptState,
    #[cfg(test)]
    trail: Vec<AttemptState>,
}

impl<'a> Attempt<'a> {
    fn new(storefront: &'static str, product: &'a str) -> Self {
        let attempt = Self {
            storefront,
            product,
            state: AttemptState::Idle,
            #[cfg(test)]
            trail: vec![AttemptState::Idle],
        };
        attempt.log();
        attempt
    }

    fn advance(&mut self, next: AttemptState) {
        self.state = next;
        #[cfg(test)]
        self.trail.push(next);
        self.log();
    }

    fn log(&self) {
        tracing::debug!(
            storefront = self.storefront,
            product = self.product,
            state = %self.state,
            "attempt state"
        );
    }
}

/// Resolves on the next change of the queued flag; never without one.
async fn next_queue_change(queue: Option<&mut watch::Receiver<bool>>) -> bool {
    match queue {
        Some(rx) => {
            if rx.changed().await.is_ok() {
                *rx.borrow_and_update()
            } else {
                std::future::pending().await
            }
        }
        None => std::future::pending().await,
    }
}

/// Runs `step` unless `cancel` fires first, moving the attempt into `queued`
/// while the adapter reports an interstitial and back again afterwards.
async fn run_step<T>(
    attempt: &mut Attempt<'_>,
    cancel: &CancellationToken,
    queue: &mut Option<watch::Receiver<bool>>,
    step: impl Future<Output = Result<T, CheckoutError>>,
) -> Result<T, CheckoutError> {
    tokio::pin!(step);
    let resume = attempt.state;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CheckoutError::Cancelled),
            queued = next_queue_change(queue.as_mut()) => {
                let next = if queued { AttemptState::Queued } else { resume };
                if next != attempt.state {
                    attempt.advance(next);
                }
            }
            result = &mut step => {
                if attempt.state != resume {
                    attempt.advance(resume);
                }
                return result;
            }
        }
    }
}

/// What happened to one product.
enum ProductResult {
    Skipped,
    Done(CheckoutOutcome),
}

async fn attempt_product(
    adapter: &dyn RetailerAdapter,
    guard: &PurchaseGuard,
    cancel: &CancellationToken,
    attempt: &mut Attempt<'_>,
    product: &Product,
) -> Result<ProductResult, CheckoutError> {
    let mut queue = adapter.queue_updates();

    attempt.advance(AttemptState::CheckingStock);
    run_step(attempt, cancel, &mut queue, adapter.locate_product(product)).await?;
    if !run_step(attempt, cancel, &mut queue, adapter.is_available()).await? {
        tracing::info!(
            storefront = attempt.storefront,
            product = %product.name,
            "not available"
        );
        return Ok(ProductResult::Skipped);
    }

    attempt.advance(AttemptState::Verifying);
    run_step(attempt, cancel, &mut queue, adapter.verify_match(product)).await?;

    if guard.exists() {
        return Err(CheckoutError::AlreadyPurchased);
    }
    attempt.advance(AttemptState::AddingToCart);
    run_step(attempt, cancel, &mut queue, adapter.add_to_cart(product)).await?;

    attempt.advance(AttemptState::CheckingOut);
    run_step(attempt, cancel, &mut queue, adapter.prepare_checkout()).await?;

    // The order may be on its way once the click is issued, so this step runs
    // to completion even when the round is cancelled.
    if cancel.is_cancelled() {
        return Err(CheckoutError::Cancelled);
    }
    let outcome = adapter.place_order().await?;
    Ok(ProductResult::Done(outcome))
}

/// Works `adapter` through its products for one round.
///
/// # Errors
///
/// Returns a run-fatal [`CheckoutError`]; product-local errors are logged and
/// absorbed.
pub async fn run_purchase_round(
    adapter: &dyn RetailerAdapter,
    guard: &PurchaseGuard,
    reporter: &Reporter,
    cancel: &CancellationToken,
) -> Result<AdapterRoundOutcome, CheckoutError> {
    let storefront = adapter.storefront().key();
    let products = adapter.products();
    let mut tried = 0usize;
    let mut skipped_reasons = Vec::new();

    for product in products {
        if cancel.is_cancelled() {
            return Err(CheckoutError::Cancelled);
        }
        tried += 1;

        let mut attempt = Attempt::new(storefront, &product.name);
        match attempt_product(adapter, guard, cancel, &mut attempt, product).await {
            Ok(ProductResult::Done(CheckoutOutcome::OrderPlaced)) => {
                attempt.advance(AttemptState::AwaitingConfirmation);
                if let Err(e) = guard.create() {
                    tracing::error!(storefront, error = %e, "order placed but guard not written");
                    reporter
                        .text(
                            storefront,
                            &format!("Order placed but the purchase marker could not be written ({e}). Stop the bot manually."),
                        )
                        .await;
                }
                attempt.advance(AttemptState::Purchased);
                reporter
                    .text(storefront, &format!("Purchased {}.", product.name))
                    .await;
                return Ok(AdapterRoundOutcome::Purchased {
                    product: product.name.clone(),
                });
            }
            Ok(ProductResult::Done(CheckoutOutcome::DryRun)) => {
                attempt.advance(AttemptState::Idle);
                return Ok(AdapterRoundOutcome::DryRun {
                    product: product.name.clone(),
                });
            }
            Ok(ProductResult::Skipped) => {
                attempt.advance(AttemptState::Idle);
                skipped_reasons.push(format!("{}: not available", product.name));
            }
            Err(e) if e.is_run_fatal() => {
                attempt.advance(AttemptState::Failed);
                tracing::warn!(storefront, product = %product.name, error = %e, "stopping adapter");
                return Err(e);
            }
            Err(e) => {
                attempt.advance(AttemptState::Failed);
                tracing::warn!(storefront, product = %product.name, error = %e, "product attempt failed");
                skipped_reasons.push(format!("{}: {e}", product.name));
            }
        }
    }

    let summary = if skipped_reasons.is_empty() {
        "No products configured.".to_owned()
    } else {
        format!("No purchase this round. {}", skipped_reasons.join("; "))
    };
    reporter.text(storefront, &summary).await;

    Ok(AdapterRoundOutcome::NotPurchased { tried })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use dropcart_core::{CustomerProfile, MatchKeys, PaymentProfile, Storefront};
    use rust_decimal::Decimal;

    use super::*;
    use crate::testing::RecordingNotifier;

    #[derive(Clone, Copy)]
    enum Script {
        Unavailable,
        Mismatch,
        CartFails,
        Succeeds,
        AntiBot,
    }

    struct FakeAdapter {
        products: Vec<Product>,
        scripts: Vec<Script>,
        test_mode: bool,
        /// Cancelled from inside "place order", as a sibling adapter would.
        cancel_on_place: Option<CancellationToken>,
        queue: Option<watch::Sender<bool>>,
        calls: Mutex<Vec<String>>,
        current: Mutex<usize>,
    }

    impl FakeAdapter {
        fn new(scripts: &[Script]) -> Self {
            let products = (0..scripts.len())
                .map(|i| Product {
                    storefront: Storefront::TheSource,
                    name: format!("product-{}", i + 1),
                    page_path: format!("/p/{}", i + 1),
                    keys: MatchKeys {
                        sku: Some(format!("{}", i + 1)),
                        ..MatchKeys::default()
                    },
                })
                .collect();
            Self {
                products,
                scripts: scripts.to_vec(),
                test_mode: false,
                cancel_on_place: None,
                queue: None,
                calls: Mutex::default(),
                current: Mutex::new(0),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn script(&self) -> Script {
            self.scripts[*self.current.lock().unwrap()]
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl RetailerAdapter for FakeAdapter {
        fn storefront(&self) -> Storefront {
            Storefront::TheSource
        }
        fn products(&self) -> &[Product] {
            &self.products
        }
        async fn login(&self) -> Result<(), CheckoutError> {
            Ok(())
        }
        async fn locate_product(&self, product: &Product) -> Result<(), CheckoutError> {
            let index = self.products.iter().position(|p| p == product).unwrap();
            *self.current.lock().unwrap() = index;
            self.record(format!("locate:{}", product.name));
            Ok(())
        }
        async fn verify_match(&self, product: &Product) -> Result<(), CheckoutError> {
            self.record(format!("verify:{}", product.name));
            match self.script() {
                Script::Mismatch => Err(CheckoutError::Mismatch {
                    descriptor: "sku",
                    expected: "1".to_owned(),
                    actual: "2".to_owned(),
                }),
                _ => Ok(()),
            }
        }
        async fn is_available(&self) -> Result<bool, CheckoutError> {
            Ok(!matches!(self.script(), Script::Unavailable))
        }
        async fn add_to_cart(&self, product: &Product) -> Result<(), CheckoutError> {
            self.record(format!("cart:{}", product.name));
            match self.script() {
                Script::CartFails => Err(CheckoutError::Cart {
                    product: product.name.clone(),
                    reason: "no confirmation".to_owned(),
                }),
                Script::AntiBot => Err(CheckoutError::AntiBot {
                    storefront: Storefront::TheSource,
                }),
                _ => Ok(()),
            }
        }
        async fn prepare_checkout(&self) -> Result<(), CheckoutError> {
            self.record("checkout".to_owned());
            if let Some(queue) = &self.queue {
                queue.send_replace(true);
                tokio::time::sleep(Duration::from_secs(30)).await;
                queue.send_replace(false);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Ok(())
        }
        async fn place_order(&self) -> Result<CheckoutOutcome, CheckoutError> {
            if self.test_mode {
                return Ok(CheckoutOutcome::DryRun);
            }
            self.record("place-order".to_owned());
            if let Some(round) = &self.cancel_on_place {
                round.cancel();
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(CheckoutOutcome::OrderPlaced)
        }
        fn queue_updates(&self) -> Option<watch::Receiver<bool>> {
            self.queue.as_ref().map(watch::Sender::subscribe)
        }
        async fn enter_shipping_info(&self, _: &CustomerProfile) -> Result<(), CheckoutError> {
            Ok(())
        }
        async fn enter_payment_info(&self, _: &PaymentProfile) -> Result<(), CheckoutError> {
            Ok(())
        }
        async fn validate_order_total(&self, _: Decimal) -> Result<(), CheckoutError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), CheckoutError> {
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        guard: PurchaseGuard,
        notifier: Arc<RecordingNotifier>,
        reporter: Reporter,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let guard = PurchaseGuard::new(dir.path().join("purchase.json"));
        let notifier = RecordingNotifier::new();
        let reporter = Reporter::new(notifier.clone());
        Harness {
            _dir: dir,
            guard,
            notifier,
            reporter,
        }
    }

    #[tokio::test]
    async fn stops_at_first_successful_product() {
        let h = harness();
        let adapter = FakeAdapter::new(&[
            Script::Unavailable,
            Script::Mismatch,
            Script::CartFails,
            Script::Succeeds,
            Script::Succeeds,
        ]);

        let outcome = run_purchase_round(&adapter, &h.guard, &h.reporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            AdapterRoundOutcome::Purchased {
                product: "product-4".to_owned()
            }
        );
        let calls = adapter.calls();
        assert!(calls.contains(&"locate:product-1".to_owned()));
        assert!(!calls.contains(&"verify:product-1".to_owned()), "unavailable skips verify");
        assert!(!calls.contains(&"cart:product-2".to_owned()), "mismatch skips cart");
        assert!(calls.contains(&"cart:product-3".to_owned()));
        assert!(!calls.iter().any(|c| c.ends_with("product-5")), "never visits N+1");
        assert_eq!(calls.iter().filter(|c| *c == "checkout").count(), 1);
        assert!(h.guard.exists());
    }

    #[tokio::test]
    async fn exhausted_products_report_not_purchased() {
        let h = harness();
        let adapter = FakeAdapter::new(&[Script::Unavailable, Script::Mismatch]);

        let outcome = run_purchase_round(&adapter, &h.guard, &h.reporter, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, AdapterRoundOutcome::NotPurchased { tried: 2 });
        assert!(!h.guard.exists());
        let texts = h.notifier.texts();
        assert_eq!(texts.len(), 1, "one summary per round");
        assert!(texts[0].starts_with("No purchase this round."));
    }

    #[tokio::test]
    async fn anti_bot_propagates_and_stops_loop() {
        let h = harness();
        let adapter = FakeAdapter::new(&[Script::AntiBot, Script::Succeeds]);

        let err = run_purchase_round(&adapter, &h.guard, &h.reporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AntiBot { .. }));
        assert!(!adapter.calls().contains(&"locate:product-2".to_owned()));
    }

    #[tokio::test]
    async fn dry_run_does_not_write_guard() {
        let h = harness();
        let mut adapter = FakeAdapter::new(&[Script::Succeeds]);
        adapter.test_mode = true;

        let outcome = run_purchase_round(&adapter, &h.guard, &h.reporter, &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(outcome, AdapterRoundOutcome::DryRun { .. }));
        assert!(!h.guard.exists());
    }

    #[tokio::test]
    async fn guard_set_elsewhere_blocks_cart() {
        let h = harness();
        h.guard.create().unwrap();
        let adapter = FakeAdapter::new(&[Script::Succeeds]);

        let err = run_purchase_round(&adapter, &h.guard, &h.reporter, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::AlreadyPurchased));
        assert!(!adapter.calls().iter().any(|c| c.starts_with("cart:")));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let h = harness();
        let adapter = FakeAdapter::new(&[Script::Succeeds]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_purchase_round(&adapter, &h.guard, &h.reporter, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutError::Cancelled));
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn placed_order_survives_cancellation() {
        let h = harness();
        let cancel = CancellationToken::new();
        let mut adapter = FakeAdapter::new(&[Script::Succeeds]);
        adapter.cancel_on_place = Some(cancel.clone());

        let outcome = run_purchase_round(&adapter, &h.guard, &h.reporter, &cancel)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            AdapterRoundOutcome::Purchased {
                product: "product-1".to_owned()
            }
        );
        assert!(cancel.is_cancelled());
        assert!(h.guard.exists());
    }

    #[tokio::test]
    async fn cancellation_before_place_order_stops_short() {
        let h = harness();
        let cancel = CancellationToken::new();
        let adapter = FakeAdapter::new(&[Script::Succeeds]);
        let mut attempt = Attempt::new("thesource", "product-1");
        cancel.cancel();

        let result = attempt_product(&adapter, &h.guard, &cancel, &mut attempt, &adapter.products[0]).await;

        assert!(matches!(result, Err(CheckoutError::Cancelled)));
        assert!(!adapter.calls().contains(&"place-order".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn interstitial_moves_attempt_into_queued() {
        let h = harness();
        let mut adapter = FakeAdapter::new(&[Script::Succeeds]);
        adapter.queue = Some(watch::channel(false).0);
        let mut attempt = Attempt::new("thesource", "product-1");

        attempt_product(
            &adapter,
            &h.guard,
            &CancellationToken::new(),
            &mut attempt,
            &adapter.products[0],
        )
        .await
        .unwrap();

        assert_eq!(
            attempt.trail,
            [
                AttemptState::Idle,
                AttemptState::CheckingStock,
                AttemptState::Verifying,
                AttemptState::AddingToCart,
                AttemptState::CheckingOut,
                AttemptState::Queued,
                AttemptState::CheckingOut,
            ]
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(AttemptState::CheckingStock.to_string(), "checking-stock");
        assert_eq!(
            AttemptState::AwaitingConfirmation.to_string(),
            "awaiting-confirmation"
        );
    }
}
