//! Best Buy Canada.
//!
//! Add-to-cart is confirmed by the basket API response. The checkout entry
//! may be held on a "thanks for waiting" queue page.

use async_trait::async_trait;
use dropcart_browser::ResponseMatcher;
use dropcart_core::{CustomerProfile, PaymentProfile, Product, Storefront};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::adapter::{AdapterContext, CheckoutOutcome, RetailerAdapter};
use crate::error::CheckoutError;
use crate::interstitial::InterstitialProbe;

const BASE_URL: &str = "https://www.bestbuy.ca";
const LOGIN_URL: &str = "https://www.bestbuy.ca/account/en-ca";
const CHECKOUT_URL: &str = "https://www.bestbuy.ca/checkout/#/en-ca/shipping";
const PAYMENT_URL: &str = "https://www.bestbuy.ca/checkout/#/en-ca/payment";
const REVIEW_URL: &str = "https://www.bestbuy.ca/checkout/#/en-ca/review";
const BASKET_API: &str = "/api/basket/v2/baskets";

const SIGN_IN_BUTTON: &str = ".signin-form-button";
const ADD_TO_CART: &str = ".productActionWrapperNonMobile_10B89 .addToCartButton";
const PRODUCT_DETAILS: &str = ".modelInformation_1ZG9l";
const MODEL_NUMBER: &str = ".modelInformation_1ZG9l:nth-of-type(1) span";
const SKU: &str = ".modelInformation_1ZG9l:nth-of-type(2) span";
const CHECKOUT_CONTAINER: &str = ".checkoutPageContainer";
const GUEST_FORM: &str = ".checkoutPageContainer .form";
const ORDER_TOTAL: &str = ".total td";
const PLACE_ORDER: &str = ".order-now";

const QUEUE_HEADING: &str = "#lbHeaderH2";
const QUEUE_TEXT: &str = "thanks for waiting to check out.";

pub struct BestBuy {
    ctx: AdapterContext,
    products: Vec<Product>,
}

impl BestBuy {
    #[must_use]
    pub fn new(ctx: AdapterContext, products: Vec<Product>) -> Self {
        Self { ctx, products }
    }

    fn probe() -> InterstitialProbe {
        InterstitialProbe::new()
            .url_marker("queue.bestbuy")
            .heading(QUEUE_HEADING, QUEUE_TEXT)
    }

    fn product_url(product: &Product) -> String {
        format!("{BASE_URL}/en-ca{}", product.page_path)
    }

    /// Clicks `button`, or navigates to `fallback` when the button is missing.
    async fn continue_to(&self, button: &str, fallback: &str) -> Result<(), CheckoutError> {
        let page = self.ctx.page();
        if let Err(e) = page.click(button).await {
            if e.is_session_lost() {
                return Err(e.into());
            }
            tracing::debug!(button, error = %e, "continue button unavailable; navigating");
            page.goto(fallback, self.ctx.settings.nav_timeout)
                .await
                .map_err(|e| CheckoutError::step("continue", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl RetailerAdapter for BestBuy {
    fn storefront(&self) -> Storefront {
        Storefront::BestBuy
    }

    fn products(&self) -> &[Product] {
        &self.products
    }

    async fn login(&self) -> Result<(), CheckoutError> {
        let credentials = self.ctx.credentials()?;
        let page = self.ctx.page();
        let fail = |e: dropcart_browser::PageError| CheckoutError::Login {
            storefront: Storefront::BestBuy,
            reason: e.to_string(),
        };

        page.goto(LOGIN_URL, self.ctx.settings.nav_timeout)
            .await
            .map_err(fail)?;
        self.ctx
            .fill_text_input("#username", &credentials.email)
            .await
            .map_err(fail)?;
        self.ctx
            .fill_text_input("#password", &credentials.password)
            .await
            .map_err(fail)?;
        page.click(SIGN_IN_BUTTON).await.map_err(fail)?;

        tracing::info!(storefront = %Storefront::BestBuy, "logged in");
        Ok(())
    }

    async fn locate_product(&self, product: &Product) -> Result<(), CheckoutError> {
        let url = Self::product_url(product);
        tracing::info!(storefront = %Storefront::BestBuy, %url, "navigating to product");
        self.ctx
            .open_page(&url, &Self::probe(), PRODUCT_DETAILS, "product page")
            .await
    }

    async fn verify_match(&self, product: &Product) -> Result<(), CheckoutError> {
        let model = product.keys.model.as_deref().unwrap_or_default();
        let sku = product.keys.sku.as_deref().unwrap_or_default();
        self.ctx.compare_values("model number", MODEL_NUMBER, model).await?;
        self.ctx.compare_values("sku", SKU, sku).await
    }

    async fn is_available(&self) -> Result<bool, CheckoutError> {
        let page = self.ctx.page();
        Ok(page.is_present(ADD_TO_CART).await? && page.is_enabled(ADD_TO_CART).await?)
    }

    async fn add_to_cart(&self, product: &Product) -> Result<(), CheckoutError> {
        self.ctx.check_anti_bot().await?;

        let page = self.ctx.page();
        page.focus(ADD_TO_CART).await?;
        self.ctx
            .notify_screenshot(
                "product-in-stock",
                &format!("{} is in stock! Adding to cart.", product.name),
            )
            .await;

        page.reset_network_log().await?;
        page.click(ADD_TO_CART).await?;

        let basket = ResponseMatcher::new(BASKET_API).with_status(200);
        page.wait_for_response(&basket, self.ctx.settings.cart_timeout)
            .await
            .map_err(|e| {
                if e.is_session_lost() {
                    CheckoutError::Page(e)
                } else {
                    CheckoutError::Cart {
                        product: product.name.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        self.ctx
            .notify_screenshot("product-added", &format!("{} added to cart!", product.name))
            .await;
        Ok(())
    }

    async fn prepare_checkout(&self) -> Result<(), CheckoutError> {
        tracing::info!(storefront = %Storefront::BestBuy, "checking out");
        self.ctx
            .open_page(CHECKOUT_URL, &Self::probe(), CHECKOUT_CONTAINER, "checkout")
            .await?;
        self.ctx
            .notify_screenshot("starting-checkout", "Attempting checkout.")
            .await;

        if self.ctx.settings.guest_checkout {
            self.ctx
                .page()
                .wait_for_selector(GUEST_FORM, self.ctx.settings.element_timeout)
                .await
                .map_err(|e| CheckoutError::step("guest form", e))?;

            self.enter_shipping_info(&self.ctx.customer).await?;
            self.ctx
                .notify_screenshot("shipping-completed", "Filled out customer info.")
                .await;

            self.continue_to(".continue-to-payment", PAYMENT_URL).await?;
            self.enter_payment_info(&self.ctx.payment).await?;
            self.ctx.notify("Filled out payment info.").await;

            self.continue_to(".continue-to-review", REVIEW_URL).await?;
        } else {
            self.ctx
                .fill_text_input("#cvv", &self.ctx.payment.cvv)
                .await
                .map_err(|e| CheckoutError::step("cvv", e))?;
        }

        self.validate_order_total(self.ctx.customer.budget).await
    }

    async fn place_order(&self) -> Result<CheckoutOutcome, CheckoutError> {
        self.ctx
            .notify_screenshot("placing-order", "Placing order...")
            .await;
        self.ctx.place_order(PLACE_ORDER, false).await
    }

    async fn enter_shipping_info(&self, customer: &CustomerProfile) -> Result<(), CheckoutError> {
        let ctx = &self.ctx;
        let step = |e| CheckoutError::step("shipping", e);

        tracing::info!(storefront = %Storefront::BestBuy, "filling shipping information");
        ctx.fill_text_input("#email", &customer.email).await.map_err(step)?;
        ctx.fill_text_input("#phone", &customer.phone).await.map_err(step)?;
        ctx.fill_text_input("#firstName", &customer.first_name)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#lastName", &customer.last_name)
            .await
            .map_err(step)?;

        // Address auto-complete only reacts to real keystrokes; leaving the
        // field closes its suggestion list.
        ctx.fill_keys("#addressLine", &customer.address)
            .await
            .map_err(step)?;
        ctx.page().click("#email").await.map_err(step)?;

        ctx.fill_text_input("#city", &customer.city).await.map_err(step)?;
        ctx.page()
            .select_option("#regionCode", &customer.province)
            .await
            .map_err(step)?;
        ctx.fill_keys("#postalCode", &customer.postal_code)
            .await
            .map_err(step)?;
        Ok(())
    }

    async fn enter_payment_info(&self, payment: &PaymentProfile) -> Result<(), CheckoutError> {
        let ctx = &self.ctx;
        let step = |e| CheckoutError::step("payment", e);

        tracing::info!(storefront = %Storefront::BestBuy, "filling payment information");
        ctx.fill_keys("#shownCardNumber", &payment.card_number)
            .await
            .map_err(step)?;
        ctx.page()
            .select_option("#expirationMonth", &payment.expiration_month)
            .await
            .map_err(step)?;
        ctx.page()
            .select_option("#expirationYear", &payment.expiration_year)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#cvv", &payment.cvv).await.map_err(step)?;
        Ok(())
    }

    async fn validate_order_total(&self, budget: Decimal) -> Result<(), CheckoutError> {
        self.ctx.check_total(ORDER_TOTAL, budget).await
    }

    async fn close(&self) -> Result<(), CheckoutError> {
        self.ctx.page().close().await?;
        Ok(())
    }

    fn queue_updates(&self) -> Option<watch::Receiver<bool>> {
        Some(self.ctx.queue_updates())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use dropcart_browser::ObservedResponse;
    use dropcart_core::MatchKeys;

    use super::*;
    use crate::testing::{adapter_context, Effect, RecordingNotifier, ScriptedPage};

    fn product() -> Product {
        Product {
            storefront: Storefront::BestBuy,
            name: "PS5 Digital".to_owned(),
            page_path: "/product/playstation-5-digital-edition-console/14962184".to_owned(),
            keys: MatchKeys {
                sku: Some("14962184".to_owned()),
                model: Some("3005719".to_owned()),
                product_id: None,
            },
        }
    }

    fn product_page() -> ScriptedPage {
        ScriptedPage::new()
            .present(&[PRODUCT_DETAILS, ADD_TO_CART, MODEL_NUMBER, SKU])
            .text(MODEL_NUMBER, " 3005719 ")
            .text(SKU, "14962184")
    }

    #[tokio::test]
    async fn locates_and_verifies_product() {
        let page = product_page();
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        adapter.locate_product(&product()).await.unwrap();
        assert!(page.did(
            "goto:https://www.bestbuy.ca/en-ca/product/playstation-5-digital-edition-console/14962184"
        ));
        adapter.verify_match(&product()).await.unwrap();
        assert!(adapter.is_available().await.unwrap());
    }

    #[tokio::test]
    async fn sku_mismatch_is_reported() {
        let page = product_page().text(SKU, "14962185");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        let err = adapter.verify_match(&product()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Mismatch { descriptor: "sku", .. }));
    }

    #[tokio::test]
    async fn disabled_button_is_unavailable() {
        let page = product_page().disabled(ADD_TO_CART);
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        assert!(!adapter.is_available().await.unwrap());
    }

    #[tokio::test]
    async fn add_to_cart_waits_for_basket_response() {
        let page = product_page().on_click(
            ADD_TO_CART,
            Effect::Respond(ObservedResponse {
                url: format!("{BASE_URL}{BASKET_API}"),
                status: Some(200),
            }),
        );
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        adapter.add_to_cart(&product()).await.unwrap();
        let texts = notifier.texts();
        assert_eq!(texts[0], "PS5 Digital is in stock! Adding to cart.");
        assert_eq!(texts[1], "PS5 Digital added to cart!");
    }

    #[tokio::test]
    async fn failed_basket_call_is_cart_error() {
        let page = product_page().on_click(
            ADD_TO_CART,
            Effect::Respond(ObservedResponse {
                url: format!("{BASE_URL}{BASKET_API}"),
                status: Some(500),
            }),
        );
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        let err = adapter.add_to_cart(&product()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Cart { .. }));
        assert!(!err.is_run_fatal());
    }

    #[tokio::test]
    async fn flagged_cookie_stops_before_click() {
        let page = product_page().cookie("_abck", "ABC~-1~DEF");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        let err = adapter.add_to_cart(&product()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::AntiBot { .. }));
        assert!(!page.did(&format!("click:{ADD_TO_CART}")));
    }

    #[tokio::test]
    async fn signed_in_checkout_in_test_mode_stops_before_order() {
        let page = ScriptedPage::new()
            .present(&[CHECKOUT_CONTAINER, "#cvv", ORDER_TOTAL, PLACE_ORDER])
            .text(ORDER_TOTAL, "$649.99");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        let outcome = adapter.checkout().await.unwrap();
        assert_eq!(outcome, CheckoutOutcome::DryRun);
        assert!(page.did("type:#cvv=123"));
        assert!(!page.did(&format!("click:{PLACE_ORDER}")));
    }

    #[tokio::test]
    async fn over_budget_total_never_places_order() {
        let page = ScriptedPage::new()
            .present(&[CHECKOUT_CONTAINER, "#cvv", ORDER_TOTAL, PLACE_ORDER])
            .text(ORDER_TOTAL, "$1,649.99");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), false);
        let adapter = BestBuy::new(ctx, vec![product()]);

        let err = adapter.checkout().await.unwrap_err();
        assert!(matches!(err, CheckoutError::BudgetExceeded { .. }));
        assert!(!page.did(&format!("click:{PLACE_ORDER}")));
    }

    #[tokio::test]
    async fn live_checkout_places_order() {
        let page = ScriptedPage::new()
            .present(&[CHECKOUT_CONTAINER, "#cvv", ORDER_TOTAL, PLACE_ORDER])
            .text(ORDER_TOTAL, "$649.99");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), false);
        let adapter = BestBuy::new(ctx, vec![product()]);

        let outcome = adapter.checkout().await.unwrap();
        assert_eq!(outcome, CheckoutOutcome::OrderPlaced);
        assert!(page.did(&format!("click:{PLACE_ORDER}")));
        assert_eq!(notifier.texts().last().unwrap(), "Order placed!");
    }

    #[tokio::test(start_paused = true)]
    async fn guard_is_written_before_the_settle_delay() {
        let page = ScriptedPage::new()
            .present(&[CHECKOUT_CONTAINER, "#cvv", ORDER_TOTAL, PLACE_ORDER])
            .text(ORDER_TOTAL, "$649.99");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let mut ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), false);
        ctx.settings.settle_delay = Duration::from_secs(5);
        let guard = Arc::clone(&ctx.guard);
        let adapter = BestBuy::new(ctx, vec![product()]);

        // Drop the checkout while it waits for the confirmation page.
        let cut_short = tokio::time::timeout(Duration::from_secs(1), adapter.checkout()).await;

        assert!(cut_short.is_err(), "still settling after the click");
        assert!(page.did(&format!("click:{PLACE_ORDER}")));
        assert!(guard.exists(), "guard written as soon as the order is placed");
    }

    #[tokio::test(start_paused = true)]
    async fn checkout_queue_is_waited_out() {
        let page = ScriptedPage::new()
            .present(&[CHECKOUT_CONTAINER, "#cvv", ORDER_TOTAL, PLACE_ORDER])
            .text(ORDER_TOTAL, "$649.99")
            .lands_on(CHECKOUT_URL, "https://queue.bestbuy.ca/?c=bestbuycanada")
            .clears_after(2, CHECKOUT_URL);
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        let adapter = BestBuy::new(ctx, vec![product()]);

        assert_eq!(adapter.checkout().await.unwrap(), CheckoutOutcome::DryRun);
        assert!(notifier.texts()[0].starts_with("Held on checkout"));
    }

    #[tokio::test]
    async fn guest_checkout_fills_every_form() {
        let page = ScriptedPage::new()
            .present(&[
                CHECKOUT_CONTAINER,
                GUEST_FORM,
                "#email",
                "#phone",
                "#firstName",
                "#lastName",
                "#addressLine",
                "#city",
                "#regionCode",
                "#postalCode",
                "#shownCardNumber",
                "#expirationMonth",
                "#expirationYear",
                "#cvv",
                ".continue-to-payment",
                ORDER_TOTAL,
                PLACE_ORDER,
            ])
            .text(ORDER_TOTAL, "$649.99");
        let dir = tempfile::tempdir().unwrap();
        let notifier = RecordingNotifier::new();
        let mut ctx = adapter_context(Storefront::BestBuy, &page, &notifier, dir.path(), true);
        ctx.settings.guest_checkout = true;
        let adapter = BestBuy::new(ctx, vec![product()]);

        assert_eq!(adapter.checkout().await.unwrap(), CheckoutOutcome::DryRun);
        assert!(page.did("keys:#addressLine=1 Yonge St"));
        assert!(page.did("select:#regionCode=ON"));
        assert!(page.did("keys:#shownCardNumber=4111111111111111"));
        assert!(page.did("click:.continue-to-payment"));
        assert!(page.did(&format!("goto:{REVIEW_URL}")), "missing review button falls back to URL");
    }
}
