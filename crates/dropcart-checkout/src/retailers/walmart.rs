//! Walmart Canada.
//!
//! Product pages are verified by title. Adding a hot item often bounces the
//! session to a captcha; that is treated as an interstitial a human clears.
//! Signed-in checkouts sometimes ask for the password again.

use std::time::Duration;

use async_trait::async_trait;
use dropcart_core::{CustomerProfile, PaymentProfile, Product, Storefront};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::adapter::{AdapterContext, CheckoutOutcome, RetailerAdapter};
use crate::error::CheckoutError;
use crate::interstitial::InterstitialProbe;

const BASE_URL: &str = "https://www.walmart.ca";
const LOGIN_URL: &str = "https://www.walmart.ca/sign-in";
const CHECKOUT_URL: &str = "https://www.walmart.ca/checkout/";

const SIGN_IN_BUTTON: &str = r#"button[data-automation="form-btn"]"#;
const ADD_TO_CART: &str = r#"button[data-automation="checkout"]"#;
const CART_CONFIRMATION: &str = r#"#modal-root button[data-automation="checkout"]"#;
const PRODUCT_TITLE: &str = r#"h1[data-automation="product-title"]"#;
const CAPTCHA: &str = ".g-recaptcha";
const NEXT_BUTTON: &str = r#"button[data-automation="form-default-btn"]"#;
const SHIPPING_NEXT: &str = r#"button[data-automation="next-button"]"#;
const SAVE_ADDRESS: &str = r#"button[data-automation="btn-save"]"#;
const ADDRESS_SUGGESTION: &str = r#"div[data-automation="express-checkout-header-blurb"]"#;
const REPLACE_ADDRESS: &str = r#"input[data-automation="replace-address-radio"]"#;
const APPLY_PAYMENT: &str = r#"button[data-automation="apply-button"]"#;
const SECOND_SIGN_IN: &str = "#yes";
const SIGNED_IN_READY: &str = r#"#yes, div[data-automation="order-total"]"#;
const ORDER_TOTAL: &str = r#"div[data-automation="order-total"] div:nth-of-type(2)"#;
const PLACE_ORDER: &str = r#"button[data-automation="place-order-button"]"#;

const SUGGESTION_WAIT: Duration = Duration::from_secs(5);
const SAVED_CARD_WAIT: Duration = Duration::from_secs(2);

pub struct Walmart {
    ctx: AdapterContext,
    products: Vec<Product>,
}

impl Walmart {
    #[must_use]
    pub fn new(ctx: AdapterContext, products: Vec<Product>) -> Self {
        Self { ctx, products }
    }

    fn page_probe() -> InterstitialProbe {
        InterstitialProbe::new()
            .url_marker("blocked")
            .blocking_selector(CAPTCHA)
    }

    /// After add-to-cart the session must stay on the product page.
    fn captcha_probe(product: &Product) -> InterstitialProbe {
        let probe = Self::page_probe();
        match product.keys.product_id.as_deref() {
            Some(id) => probe.expect_url_fragment(id),
            None => probe,
        }
    }

    async fn second_sign_in(&self) -> Result<(), CheckoutError> {
        let page = self.ctx.page();
        if !page.is_present(SECOND_SIGN_IN).await? {
            return Ok(());
        }

        tracing::info!(storefront = %Storefront::Walmart, "checkout asked to sign in again");
        let credentials = self.ctx.credentials()?;
        let step = |e| CheckoutError::step("second sign-in", e);
        page.check(SECOND_SIGN_IN).await.map_err(step)?;
        self.ctx
            .fill_text_input("#email", &credentials.email)
            .await
            .map_err(step)?;
        self.ctx
            .fill_text_input("#password", &credentials.password)
            .await
            .map_err(step)?;
        page.force_click(NEXT_BUTTON).await.map_err(step)?;
        Ok(())
    }
}

#[async_trait]
impl RetailerAdapter for Walmart {
    fn storefront(&self) -> Storefront {
        Storefront::Walmart
    }

    fn products(&self) -> &[Product] {
        &self.products
    }

    async fn login(&self) -> Result<(), CheckoutError> {
        let credentials = self.ctx.credentials()?;
        let page = self.ctx.page();
        let fail = |e: dropcart_browser::PageError| CheckoutError::Login {
            storefront: Storefront::Walmart,
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

        tracing::info!(storefront = %Storefront::Walmart, "logged in");
        Ok(())
    }

    async fn locate_product(&self, product: &Product) -> Result<(), CheckoutError> {
        let url = format!("{BASE_URL}/en{}", product.page_path);
        tracing::info!(storefront = %Storefront::Walmart, %url, "navigating to product");
        self.ctx
            .open_page(&url, &Self::page_probe(), PRODUCT_TITLE, "product page")
            .await
    }

    async fn verify_match(&self, product: &Product) -> Result<(), CheckoutError> {
        self.ctx
            .compare_values("product name", PRODUCT_TITLE, &product.name)
            .await
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

        page.force_click(ADD_TO_CART).await?;
        self.ctx
            .await_interstitial(&Self::captcha_probe(product), "add to cart (captcha)")
            .await?;

        page.wait_for_selector(CART_CONFIRMATION, self.ctx.settings.cart_timeout)
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
        tracing::info!(storefront = %Storefront::Walmart, "checking out");
        let page = self.ctx.page();
        let guest = self.ctx.settings.guest_checkout;

        if !page.current_url().await?.contains("checkout") {
            let ready = if guest { "#email" } else { SIGNED_IN_READY };
            self.ctx
                .open_page(CHECKOUT_URL, &Self::page_probe(), ready, "checkout")
                .await?;
        }

        if guest {
            let step = |e| CheckoutError::step("guest email", e);
            self.ctx
                .fill_text_input("#email", &self.ctx.customer.email)
                .await
                .map_err(step)?;
            page.click(NEXT_BUTTON).await.map_err(step)?;
            page.wait_for_selector("#shipping-tab", self.ctx.settings.element_timeout)
                .await
                .map_err(step)?;
            page.click("#shipping-tab").await.map_err(step)?;

            self.enter_shipping_info(&self.ctx.customer).await?;
            page.click(SHIPPING_NEXT)
                .await
                .map_err(|e| CheckoutError::step("shipping", e))?;

            self.enter_payment_info(&self.ctx.payment).await?;
            self.ctx.notify("Payment info filled out.").await;
        } else {
            self.second_sign_in().await?;
        }

        self.validate_order_total(self.ctx.customer.budget).await
    }

    async fn place_order(&self) -> Result<CheckoutOutcome, CheckoutError> {
        self.ctx
            .notify_screenshot("placing-order", "Placing order...")
            .await;
        self.ctx.place_order(PLACE_ORDER, true).await
    }

    async fn enter_shipping_info(&self, customer: &CustomerProfile) -> Result<(), CheckoutError> {
        let ctx = &self.ctx;
        let page = ctx.page();
        let step = |e| CheckoutError::step("shipping", e);

        tracing::info!(storefront = %Storefront::Walmart, "filling shipping information");
        ctx.fill_text_input("#firstName", &customer.first_name)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#lastName", &customer.last_name)
            .await
            .map_err(step)?;

        // Canada Post auto-complete: type, then leave the field.
        ctx.fill_keys("#address1", &customer.address)
            .await
            .map_err(step)?;
        page.click("#postalCode").await.map_err(step)?;
        if let Some(second) = customer.address_second_line.as_deref() {
            ctx.fill_text_input("#address2", second).await.map_err(step)?;
        }

        // Upper case matches the address service exactly and avoids the
        // "possible match" prompt.
        ctx.fill_text_input("#city", &customer.city.to_uppercase())
            .await
            .map_err(step)?;
        page.select_option("#province", &customer.province)
            .await
            .map_err(step)?;
        ctx.fill_keys("#postalCode", &customer.postal_code)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#phoneNumber", &customer.phone)
            .await
            .map_err(step)?;
        page.click(SAVE_ADDRESS).await.map_err(step)?;

        match page.wait_for_selector(ADDRESS_SUGGESTION, SUGGESTION_WAIT).await {
            Ok(()) => {
                tracing::debug!(storefront = %Storefront::Walmart, "replacing suggested address");
                page.check(REPLACE_ADDRESS).await.map_err(step)?;
                page.click(SAVE_ADDRESS).await.map_err(step)?;
            }
            Err(e) if e.is_session_lost() => return Err(e.into()),
            Err(_) => {}
        }
        Ok(())
    }

    async fn enter_payment_info(&self, payment: &PaymentProfile) -> Result<(), CheckoutError> {
        let ctx = &self.ctx;
        let page = ctx.page();
        let step = |e| CheckoutError::step("payment", e);

        tracing::info!(storefront = %Storefront::Walmart, "filling payment information");
        page.wait_for_selector("#cardNumber", ctx.settings.nav_timeout)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#cardNumber", &payment.card_number)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#expiryMonth", &payment.expiration_month)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#expiryYear", payment.expiration_year_short())
            .await
            .map_err(step)?;
        ctx.fill_text_input("#securityCode", &payment.cvv)
            .await
            .map_err(step)?;
        page.click(APPLY_PAYMENT).await.map_err(step)?;

        let saved_card = format!("#payment-{}", payment.card_last_four());
        page.wait_for_selector(&saved_card, SAVED_CARD_WAIT)
            .await
            .map_err(step)?;
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
