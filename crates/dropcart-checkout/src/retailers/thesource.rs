//! The Source (Canada).
//!
//! Several checkout controls are rendered hidden or disabled until scripts
//! the automation does not trigger have run, so they are forced.

use std::time::Duration;

use async_trait::async_trait;
use dropcart_core::{CustomerProfile, PaymentProfile, Product, Storefront};
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::adapter::{AdapterContext, CheckoutOutcome, RetailerAdapter};
use crate::error::CheckoutError;
use crate::interstitial::InterstitialProbe;

const BASE_URL: &str = "https://www.thesource.ca";
const LOGIN_URL: &str = "https://www.thesource.ca/en-ca/login";
const CHECKOUT_URL: &str = "https://www.thesource.ca/en-ca/checkout/multi/delivery-mode/add";

const SIGN_IN_BUTTON: &str = "#sign-in";
const PRODUCT_NAME: &str = ".pdp-name";
const SKU: &str = ".identifier";
const ADD_TO_CART: &str = "#addToCartButton";
const CART_CONFIRMATION: &str = "#addToCartLayer .primary-button--big";
const GUEST_CONTINUE: &str = "#guestForm .primary-button";
const STANDARD_SHIPPING: &str = "#standard";
const CONTINUE_TO_SHIPPING: &str = "#store-button2";
const REVIEW_ORDER: &str = r#"button[aria-label="Review your order"]"#;
const CONTINUE_TO_PAYMENT: &str = r#"button[aria-label="Continue to payment"]"#;
const ADDRESS_SEARCH: &str = "#delivery-address-search-field";
const ADDRESS_PICK: &str = ".pcaselected";
const PAYMENT_SECTION: &str = "#Pay_form_section";
const CREDIT_CARD: &str = "#rdoCredit";
const ORDER_TOTAL: &str = ".cartValueEstimatedTotal";
const PLACE_ORDER: &str = "#payNow";

/// Time for the address lookup to offer its suggestion.
const ADDRESS_LOOKUP_DELAY: Duration = Duration::from_millis(500);

pub struct TheSource {
    ctx: AdapterContext,
    products: Vec<Product>,
}

impl TheSource {
    #[must_use]
    pub fn new(ctx: AdapterContext, products: Vec<Product>) -> Self {
        Self { ctx, products }
    }

    fn probe() -> InterstitialProbe {
        InterstitialProbe::new()
            .url_marker("queue-it")
            .url_marker("queue.thesource")
    }
}

#[async_trait]
impl RetailerAdapter for TheSource {
    fn storefront(&self) -> Storefront {
        Storefront::TheSource
    }

    fn products(&self) -> &[Product] {
        &self.products
    }

    async fn login(&self) -> Result<(), CheckoutError> {
        let credentials = self.ctx.credentials()?;
        let page = self.ctx.page();
        let fail = |e: dropcart_browser::PageError| CheckoutError::Login {
            storefront: Storefront::TheSource,
            reason: e.to_string(),
        };

        page.goto(LOGIN_URL, self.ctx.settings.nav_timeout)
            .await
            .map_err(fail)?;
        self.ctx
            .fill_text_input("#j_username", &credentials.email)
            .await
            .map_err(fail)?;
        self.ctx
            .fill_text_input("#j_password", &credentials.password)
            .await
            .map_err(fail)?;
        page.click(SIGN_IN_BUTTON).await.map_err(fail)?;

        tracing::info!(storefront = %Storefront::TheSource, "logged in");
        Ok(())
    }

    async fn locate_product(&self, product: &Product) -> Result<(), CheckoutError> {
        let url = format!("{BASE_URL}{}", product.page_path);
        tracing::info!(storefront = %Storefront::TheSource, %url, "navigating to product");
        self.ctx
            .open_page(&url, &Self::probe(), PRODUCT_NAME, "product page")
            .await
    }

    async fn verify_match(&self, product: &Product) -> Result<(), CheckoutError> {
        let sku = product.keys.sku.as_deref().unwrap_or_default();
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
                &format!("{} is in stock! Adding to cart...", product.name),
            )
            .await;

        page.force_click(ADD_TO_CART).await?;
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
        tracing::info!(storefront = %Storefront::TheSource, "checking out");
        let page = self.ctx.page();
        let guest = self.ctx.settings.guest_checkout;

        let ready = if guest { GUEST_CONTINUE } else { STANDARD_SHIPPING };
        self.ctx
            .open_page(CHECKOUT_URL, &Self::probe(), ready, "checkout")
            .await?;
        self.ctx
            .notify_screenshot("starting-checkout", "Attempting checkout.")
            .await;

        let step = |e| CheckoutError::step("delivery mode", e);
        if guest {
            tracing::info!(storefront = %Storefront::TheSource, "continuing as guest");
            page.click(GUEST_CONTINUE).await.map_err(step)?;
            page.wait_for_selector(STANDARD_SHIPPING, self.ctx.settings.element_timeout)
                .await
                .map_err(step)?;
        }

        page.check(STANDARD_SHIPPING).await.map_err(step)?;
        page.force_click(CONTINUE_TO_SHIPPING).await.map_err(step)?;

        if guest {
            self.enter_shipping_info(&self.ctx.customer).await?;
        }

        let step = |e| CheckoutError::step("review", e);
        page.force_click(REVIEW_ORDER).await.map_err(step)?;
        page.force_click(CONTINUE_TO_PAYMENT).await.map_err(step)?;

        self.enter_payment_info(&self.ctx.payment).await?;
        self.ctx.notify("Payment info filled out.").await;

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
        let step = |e| CheckoutError::step("shipping", e);

        tracing::info!(storefront = %Storefront::TheSource, "filling shipping information");
        ctx.fill_text_input("#email", &customer.email).await.map_err(step)?;
        ctx.fill_text_input("#deliveryaddressFirstName", &customer.first_name)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#deliveryaddressSurname", &customer.last_name)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#deliveryaddressPhoneNumber", &customer.phone)
            .await
            .map_err(step)?;

        let full_address = format!(
            "{}, {}, {}, {}",
            customer.address, customer.city, customer.province, customer.postal_code
        );
        ctx.fill_keys(ADDRESS_SEARCH, &full_address)
            .await
            .map_err(step)?;
        tokio::time::sleep(ADDRESS_LOOKUP_DELAY).await;
        ctx.page()
            .wait_for_selector(ADDRESS_PICK, ctx.settings.element_timeout)
            .await
            .map_err(step)?;
        ctx.page().click(ADDRESS_PICK).await.map_err(step)?;
        Ok(())
    }

    async fn enter_payment_info(&self, payment: &PaymentProfile) -> Result<(), CheckoutError> {
        let ctx = &self.ctx;
        let step = |e| CheckoutError::step("payment", e);

        tracing::info!(storefront = %Storefront::TheSource, "filling payment information");
        ctx.page()
            .wait_for_selector(PAYMENT_SECTION, ctx.settings.element_timeout)
            .await
            .map_err(step)?;
        ctx.page().check(CREDIT_CARD).await.map_err(step)?;
        ctx.fill_text_input("#card-number", &payment.card_number)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#expiry-month", &payment.expiration_month)
            .await
            .map_err(step)?;
        ctx.fill_text_input("#expiry-year", payment.expiration_year_short())
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
