use std::path::PathBuf;

use crate::app_config::{AppConfig, RunMode};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if env values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if env values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_flag = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Ok(raw) => parse_bool(var, &raw),
            Err(_) => Ok(default),
        }
    };

    let tasks_path = PathBuf::from(or_default("DROPCART_TASKS_PATH", "./config/tasks.yaml"));
    let profile_path = PathBuf::from(or_default(
        "DROPCART_PROFILE_PATH",
        "./config/profile.yaml",
    ));
    let guard_path = PathBuf::from(or_default("DROPCART_GUARD_PATH", "./purchase.json"));
    let screenshot_dir = PathBuf::from(or_default("DROPCART_SCREENSHOT_DIR", "./screenshots"));
    let webdriver_url = or_default("DROPCART_WEBDRIVER_URL", "http://localhost:4444");
    let log_level = or_default("DROPCART_LOG_LEVEL", "info");

    let headless = parse_flag("DROPCART_HEADLESS", false)?;
    let test_mode = parse_flag("DROPCART_TEST_MODE", true)?;
    let guest_checkout = parse_flag("DROPCART_GUEST_CHECKOUT", false)?;
    let run_mode = if parse_flag("DROPCART_CONCURRENT", false)? {
        RunMode::Concurrent
    } else {
        RunMode::Sequential
    };

    let backoff_min_secs = parse_u64("DROPCART_BACKOFF_MIN_SECS", "30")?;
    let backoff_max_secs = parse_u64("DROPCART_BACKOFF_MAX_SECS", "120")?;
    if backoff_min_secs > backoff_max_secs {
        return Err(ConfigError::Validation(format!(
            "DROPCART_BACKOFF_MIN_SECS ({backoff_min_secs}) must not exceed DROPCART_BACKOFF_MAX_SECS ({backoff_max_secs})"
        )));
    }

    let antibot_cooldown_secs = parse_u64("DROPCART_ANTIBOT_COOLDOWN_SECS", "180")?;
    let queue_wait_secs = parse_u64("DROPCART_QUEUE_WAIT_SECS", "600")?;
    let queue_poll_secs = parse_u64("DROPCART_QUEUE_POLL_SECS", "5")?.max(1);
    let nav_timeout_secs = parse_u64("DROPCART_NAV_TIMEOUT_SECS", "60")?;
    let element_timeout_secs = parse_u64("DROPCART_ELEMENT_TIMEOUT_SECS", "10")?;
    let cart_timeout_secs = parse_u64("DROPCART_CART_TIMEOUT_SECS", "30")?;
    let notify_grace_secs = parse_u64("DROPCART_NOTIFY_GRACE_SECS", "5")?;

    let max_rounds = match lookup("DROPCART_MAX_ROUNDS") {
        Ok(raw) if !raw.trim().is_empty() => {
            let rounds = raw
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::InvalidEnvVar {
                    var: "DROPCART_MAX_ROUNDS".to_string(),
                    reason: e.to_string(),
                })?;
            if rounds == 0 {
                return Err(ConfigError::InvalidEnvVar {
                    var: "DROPCART_MAX_ROUNDS".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            Some(rounds)
        }
        _ => None,
    };

    Ok(AppConfig {
        tasks_path,
        profile_path,
        guard_path,
        screenshot_dir,
        webdriver_url,
        headless,
        log_level,
        test_mode,
        guest_checkout,
        run_mode,
        backoff_min_secs,
        backoff_max_secs,
        antibot_cooldown_secs,
        queue_wait_secs,
        queue_poll_secs,
        nav_timeout_secs,
        element_timeout_secs,
        cart_timeout_secs,
        notify_grace_secs,
        max_rounds,
    })
}

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
