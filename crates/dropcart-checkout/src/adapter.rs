//! The storefront capability set and the context every variant works through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dropcart_browser::{PageError, PageSession};
use dropcart_core::{
    AppConfig, CustomerProfile, LoginCredentials, PaymentProfile, Product, Storefront,
};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::antibot::AntiBotPolicy;
use crate::error::CheckoutError;
use crate::guard::PurchaseGuard;
use crate::interstitial::{await_clearance, InterstitialProbe, QueueWait, WaitContext};
use crate::money;
use crate::reporter::Reporter;

/// Extra attempts at a checkout or product page after a queue redirect.
pub const ENTRY_RETRIES: u32 = 1;

/// What a completed checkout did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// "Place order" was issued.
    OrderPlaced,
    /// Test mode: every step ran except "place order".
    DryRun,
}

/// Behaviour switches and timeouts shared by all adapters.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub test_mode: bool,
    pub guest_checkout: bool,
    pub nav_timeout: Duration,
    pub element_timeout: Duration,
    pub cart_timeout: Duration,
    pub queue: QueueWait,
    /// Pause after "place order" before the confirmation screenshot.
    pub settle_delay: Duration,
}

impl CheckoutSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            test_mode: config.test_mode,
            guest_checkout: config.guest_checkout,
            nav_timeout: Duration::from_secs(config.nav_timeout_secs),
            element_timeout: Duration::from_secs(config.element_timeout_secs),
            cart_timeout: Duration::from_secs(config.cart_timeout_secs),
            queue: QueueWait {
                ceiling: Duration::from_secs(config.queue_wait_secs),
                poll: Duration::from_secs(config.queue_poll_secs),
            },
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Capability set implemented once per storefront.
///
/// The shared purchase workflow drives these in a fixed order; see
/// [`crate::workflow::run_purchase_round`].
#[async_trait]
pub trait RetailerAdapter: Send + Sync {
    fn storefront(&self) -> Storefront;

    /// Products to try, in priority order.
    fn products(&self) -> &[Product];

    async fn login(&self) -> Result<(), CheckoutError>;

    /// Opens the product page, waiting out queue and soft-block pages.
    async fn locate_product(&self, product: &Product) -> Result<(), CheckoutError>;

    /// Compares the page's identifier with the product's key.
    async fn verify_match(&self, product: &Product) -> Result<(), CheckoutError>;

    /// `true` iff the add-to-cart control is present and enabled.
    async fn is_available(&self) -> Result<bool, CheckoutError>;

    async fn add_to_cart(&self, product: &Product) -> Result<(), CheckoutError>;

    /// Drives checkout from entry through shipping, payment and the order
    /// total check. Stops short of "place order".
    async fn prepare_checkout(&self) -> Result<(), CheckoutError>;

    /// Issues "place order" on a prepared checkout, or stops in test mode.
    ///
    /// Once the click lands the purchase guard is written before anything
    /// else; callers must not cancel this step midway.
    async fn place_order(&self) -> Result<CheckoutOutcome, CheckoutError>;

    /// Runs the storefront checkout up to and including "place order".
    async fn checkout(&self) -> Result<CheckoutOutcome, CheckoutError> {
        self.prepare_checkout().await?;
        self.place_order().await
    }

    async fn enter_shipping_info(&self, customer: &CustomerProfile) -> Result<(), CheckoutError>;

    async fn enter_payment_info(&self, payment: &PaymentProfile) -> Result<(), CheckoutError>;

    /// Last safety check before money is committed.
    async fn validate_order_total(&self, budget: Decimal) -> Result<(), CheckoutError>;

    async fn close(&self) -> Result<(), CheckoutError>;

    /// Follows whether the session is held on an interstitial page.
    fn queue_updates(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}

/// Everything an adapter owns for the run. The session is exclusive to the
/// adapter.
pub struct AdapterContext {
    pub storefront: Storefront,
    pub session: Box<dyn PageSession>,
    pub reporter: Reporter,
    pub guard: Arc<PurchaseGuard>,
    pub customer: Arc<CustomerProfile>,
    pub payment: Arc<PaymentProfile>,
    pub login: Option<LoginCredentials>,
    pub settings: CheckoutSettings,
    pub antibot: AntiBotPolicy,
    /// `true` while a queue or soft-block page holds the session.
    pub queue_state: watch::Sender<bool>,
}

impl AdapterContext {
    pub(crate) fn channel(&self) -> &'static str {
        self.storefront.key()
    }

    pub(crate) fn queue_updates(&self) -> watch::Receiver<bool> {
        self.queue_state.subscribe()
    }

    pub(crate) fn page(&self) -> &dyn PageSession {
        self.session.as_ref()
    }

    pub(crate) async fn notify(&self, message: &str) {
        self.reporter.text(self.channel(), message).await;
    }

    pub(crate) async fn notify_screenshot(&self, label: &str, message: &str) {
        self.reporter
            .screenshot(self.channel(), self.page(), label, message)
            .await;
    }

    pub(crate) fn credentials(&self) -> Result<&LoginCredentials, CheckoutError> {
        self.login.as_ref().ok_or_else(|| CheckoutError::Login {
            storefront: self.storefront,
            reason: "no credentials configured".to_owned(),
        })
    }

    /// Waits for `selector` then clicks, focuses and types `value`.
    pub(crate) async fn fill_text_input(&self, selector: &str, value: &str) -> Result<(), PageError> {
        let page = self.page();
        page.wait_for_selector(selector, self.settings.element_timeout)
            .await?;
        page.click(selector).await?;
        page.focus(selector).await?;
        page.type_text(selector, value).await
    }

    /// Keystroke entry for composite widgets that reject a direct value.
    pub(crate) async fn fill_keys(&self, selector: &str, value: &str) -> Result<(), PageError> {
        let page = self.page();
        page.wait_for_selector(selector, self.settings.element_timeout)
            .await?;
        page.clear(selector).await?;
        page.type_keys(selector, value).await
    }

    /// Reads `selector` and compares it, trimmed, with `expected`.
    pub(crate) async fn compare_values(
        &self,
        descriptor: &'static str,
        selector: &str,
        expected: &str,
    ) -> Result<(), CheckoutError> {
        let page = self.page();
        page.wait_for_selector(selector, self.settings.element_timeout)
            .await?;
        let actual = page.eval_text(selector).await?;
        compare_values(descriptor, expected, actual.as_deref())
    }

    /// Fails the run when the protection cookie says the session is flagged.
    pub(crate) async fn check_anti_bot(&self) -> Result<(), CheckoutError> {
        let cookies = self.page().cookies().await?;
        if self.antibot.is_flagged(&cookies) {
            tracing::warn!(
                storefront = %self.storefront,
                cookie = self.antibot.cookie_name(),
                "anti-bot protection flagged the session"
            );
            self.notify_screenshot(
                "anti-bot",
                "Anti-bot protection flagged this session. Backing off before the next round.",
            )
            .await;
            return Err(CheckoutError::AntiBot {
                storefront: self.storefront,
            });
        }
        Ok(())
    }

    pub(crate) async fn await_interstitial(
        &self,
        probe: &InterstitialProbe,
        doing: &str,
    ) -> Result<bool, CheckoutError> {
        let cx = WaitContext {
            session: self.page(),
            reporter: &self.reporter,
            channel: self.channel(),
            doing,
            queued: Some(&self.queue_state),
        };
        await_clearance(&cx, probe, self.settings.queue).await
    }

    /// Navigates to `url` until `ready_selector` shows, waiting out
    /// interstitials. At most `1 + ENTRY_RETRIES` navigations.
    pub(crate) async fn open_page(
        &self,
        url: &str,
        probe: &InterstitialProbe,
        ready_selector: &str,
        doing: &str,
    ) -> Result<(), CheckoutError> {
        let page = self.page();
        let mut last_reason = String::new();

        for attempt in 0..=ENTRY_RETRIES {
            let mut nav_error = None;
            if attempt > 0 {
                tracing::info!(storefront = %self.storefront, attempt, url, "retrying page entry");
            }

            match page.goto(url, self.settings.nav_timeout).await {
                Ok(()) => {}
                Err(e) if e.is_session_lost() => return Err(e.into()),
                // Queue pages often never finish loading; fall through to the probe.
                Err(e) => {
                    tracing::debug!(storefront = %self.storefront, url, error = %e, "navigation incomplete");
                    nav_error = Some(e.to_string());
                }
            }

            self.await_interstitial(probe, doing).await?;

            match page
                .wait_for_selector(ready_selector, self.settings.element_timeout)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_session_lost() => return Err(e.into()),
                Err(e) => {
                    last_reason = match nav_error {
                        Some(nav) => format!("{e} (after navigation error: {nav})"),
                        None => e.to_string(),
                    };
                }
            }
        }

        Err(CheckoutError::Navigation {
            url: url.to_owned(),
            reason: last_reason,
        })
    }

    /// Reads the displayed total and checks it against `budget`.
    pub(crate) async fn check_total(
        &self,
        selector: &str,
        budget: Decimal,
    ) -> Result<(), CheckoutError> {
        let page = self.page();
        page.wait_for_selector(selector, self.settings.element_timeout)
            .await
            .map_err(|e| CheckoutError::step("order total", e))?;
        let displayed = page.eval_text(selector).await?.unwrap_or_default();
        match money::validate_order_total(&displayed, budget) {
            Ok(total) => {
                tracing::info!(storefront = %self.storefront, %total, %budget, "order total within budget");
                Ok(())
            }
            Err(e) => {
                self.notify_screenshot(
                    "over-budget",
                    &format!("Order total '{}' failed the budget check ({budget}). Not placing the order.", displayed.trim()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Issues "place order", the only irreversible step.
    ///
    /// Re-checks the guard first. In test mode stops here and reports a dry run.
    /// A successful click writes the guard immediately, ahead of the settle
    /// delay and the confirmation screenshot.
    pub(crate) async fn place_order(
        &self,
        selector: &str,
        force: bool,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if self.guard.exists() {
            return Err(CheckoutError::AlreadyPurchased);
        }

        if self.settings.test_mode {
            self.notify("Test mode: stopping before placing the order.")
                .await;
            return Ok(CheckoutOutcome::DryRun);
        }

        let page = self.page();
        let clicked = if force {
            page.force_click(selector).await
        } else {
            page.click(selector).await
        };
        clicked.map_err(|e| CheckoutError::step("place order", e))?;

        if let Err(e) = self.guard.create() {
            tracing::error!(storefront = %self.storefront, error = %e, "order placed but guard not written");
        }

        tokio::time::sleep(self.settings.settle_delay).await;
        self.notify_screenshot("order-placed", "Order placed!").await;
        Ok(CheckoutOutcome::OrderPlaced)
    }
}

/// Trimmed comparison of a page value with the expected key.
///
/// # Errors
///
/// Returns [`CheckoutError::Mismatch`]; a missing value counts as a mismatch.
pub fn compare_values(
    descriptor: &'static str,
    expected: &str,
    actual: Option<&str>,
) -> Result<(), CheckoutError> {
    let actual = actual.map(str::trim).unwrap_or_default();
    if actual == expected.trim() {
        Ok(())
    } else {
        Err(CheckoutError::Mismatch {
            descriptor,
            expected: expected.trim().to_owned(),
            actual: actual.to_owned(),
        })
    }
}
