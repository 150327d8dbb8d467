//! Customer, payment, login and notification settings loaded from the
//! profile YAML file. Immutable for the whole run.

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::tasks::Storefront;
use crate::ConfigError;

/// Shipping identity plus the budget ceiling for the final order total.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CustomerProfile {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    #[serde(default)]
    pub address_second_line: Option<String>,
    pub city: String,
    /// Province/region code as the storefront dropdowns expect it, e.g. `ON`.
    pub province: String,
    pub postal_code: String,
    pub phone: String,
    pub email: String,
    /// Upper bound on the order total; the checkout refuses anything above it.
    pub budget: Decimal,
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentProfile {
    pub card_number: String,
    /// Two digits, `01`..`12`.
    pub expiration_month: String,
    /// Four digits, e.g. `2027`.
    pub expiration_year: String,
    pub cvv: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

impl PaymentProfile {
    /// Last two digits of the expiry year, for storefronts that only take `YY`.
    #[must_use]
    pub fn expiration_year_short(&self) -> &str {
        let year = self.expiration_year.as_str();
        &year[year.len().saturating_sub(2)..]
    }

    /// Last four digits of the card number.
    #[must_use]
    pub fn card_last_four(&self) -> &str {
        let number = self.card_number.as_str();
        &number[number.len().saturating_sub(4)..]
    }
}

impl std::fmt::Debug for PaymentProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentProfile")
            .field("card_number", &"[redacted]")
            .field("expiration_month", &"[redacted]")
            .field("expiration_year", &"[redacted]")
            .field("cvv", &"[redacted]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &"[redacted]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Notification channels. Discord webhooks are keyed by channel key
/// (a storefront key or `default`).
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub discord: BTreeMap<String, String>,
    #[serde(default)]
    pub telegram: Option<TelegramSettings>,
}

impl NotificationSettings {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discord.is_empty() && self.telegram.is_none()
    }
}

impl std::fmt::Debug for NotificationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Webhook URLs carry their own secret token.
        let channels: Vec<&String> = self.discord.keys().collect();
        f.debug_struct("NotificationSettings")
            .field("discord", &channels)
            .field("telegram", &self.telegram)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileFile {
    pub customer: CustomerProfile,
    pub payment: PaymentProfile,
    #[serde(default)]
    pub logins: BTreeMap<Storefront, LoginCredentials>,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl ProfileFile {
    #[must_use]
    pub fn login_for(&self, storefront: Storefront) -> Option<&LoginCredentials> {
        self.logins.get(&storefront)
    }
}

/// Load and validate the profile YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_profile(path: &Path) -> Result<ProfileFile, ConfigError> {
    let profile: ProfileFile = crate::read_yaml(path)?;
    validate_profile(&profile)?;
    Ok(profile)
}

fn validate_profile(profile: &ProfileFile) -> Result<(), ConfigError> {
    let customer = &profile.customer;
    for (field, value) in [
        ("customer.first_name", &customer.first_name),
        ("customer.last_name", &customer.last_name),
        ("customer.address", &customer.address),
        ("customer.city", &customer.city),
        ("customer.province", &customer.province),
        ("customer.postal_code", &customer.postal_code),
        ("customer.email", &customer.email),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{field} must be non-empty")));
        }
    }

    if customer.budget <= Decimal::ZERO {
        return Err(ConfigError::Validation(format!(
            "customer.budget must be positive, got {}",
            customer.budget
        )));
    }

    let payment = &profile.payment;
    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if !all_digits(&payment.card_number) || payment.card_number.len() < 12 {
        return Err(ConfigError::Validation(
            "payment.card_number must be at least 12 digits".to_string(),
        ));
    }
    if !all_digits(&payment.cvv) || !(3..=4).contains(&payment.cvv.len()) {
        return Err(ConfigError::Validation(
            "payment.cvv must be 3 or 4 digits".to_string(),
        ));
    }
    let month_ok = payment
        .expiration_month
        .parse::<u8>()
        .is_ok_and(|m| (1..=12).contains(&m))
        && payment.expiration_month.len() == 2;
    if !month_ok {
        return Err(ConfigError::Validation(
            "payment.expiration_month must be two digits between 01 and 12".to_string(),
        ));
    }
    if !all_digits(&payment.expiration_year) || payment.expiration_year.len() != 4 {
        return Err(ConfigError::Validation(
            "payment.expiration_year must be four digits".to_string(),
        ));
    }

    for (storefront, login) in &profile.logins {
        if login.email.trim().is_empty() || login.password.is_empty() {
            return Err(ConfigError::Validation(format!(
                "login for {storefront} needs both email and password"
            )));
        }
    }

    Ok(())
}
