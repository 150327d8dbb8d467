//! Anti-automation detection from the storefront's protection cookie.
//!
//! The bot-management cookie is issued on first contact and rewritten once
//! the sensor data validates. A cookie that is present but does not carry the
//! validated marker means the session has been flagged.

use std::sync::LazyLock;

use dropcart_browser::BrowserCookie;
use regex::Regex;

const PROTECTION_COOKIE: &str = "_abck";

static VALIDATED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~0~").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct AntiBotPolicy {
    cookie_name: String,
    validated: Regex,
}

impl Default for AntiBotPolicy {
    fn default() -> Self {
        Self {
            cookie_name: PROTECTION_COOKIE.to_owned(),
            validated: VALIDATED.clone(),
        }
    }
}

impl AntiBotPolicy {
    #[must_use]
    pub fn new(cookie_name: impl Into<String>, validated: Regex) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            validated,
        }
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// `true` when the protection cookie is present and not validated.
    /// An absent cookie is not a signal.
    #[must_use]
    pub fn is_flagged(&self, cookies: &[BrowserCookie]) -> bool {
        cookies
            .iter()
            .find(|c| c.name == self.cookie_name)
            .is_some_and(|c| !self.validated.is_match(&c.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, value: &str) -> BrowserCookie {
        BrowserCookie {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }

    #[test]
    fn validated_cookie_passes() {
        let policy = AntiBotPolicy::default();
        let cookies = [cookie("_abck", "3F2A9C~0~YAAQx1x~-1~-1")];
        assert!(!policy.is_flagged(&cookies));
    }

    #[test]
    fn unvalidated_cookie_is_flagged() {
        let policy = AntiBotPolicy::default();
        let cookies = [
            cookie("session", "abc"),
            cookie("_abck", "3F2A9C~-1~YAAQx1x~-1~-1"),
        ];
        assert!(policy.is_flagged(&cookies));
    }

    #[test]
    fn missing_cookie_is_not_a_signal() {
        let policy = AntiBotPolicy::default();
        assert!(!policy.is_flagged(&[cookie("session", "abc")]));
        assert!(!policy.is_flagged(&[]));
    }

    #[test]
    fn custom_policy() {
        let policy = AntiBotPolicy::new("bm_sv", Regex::new("^ok").unwrap());
        assert_eq!(policy.cookie_name(), "bm_sv");
        assert!(policy.is_flagged(&[cookie("bm_sv", "flagged")]));
        assert!(!policy.is_flagged(&[cookie("bm_sv", "ok:1")]));
    }
}
