//! Scripted page session and recording notifier for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dropcart_browser::{BrowserCookie, ObservedResponse, PageError, PageSession, ResponseMatcher};
use dropcart_core::{CustomerProfile, LoginCredentials, PaymentProfile, Storefront};
use dropcart_notify::{Notification, Notifier, NotifyError};
use rust_decimal::Decimal;

use crate::adapter::{AdapterContext, CheckoutSettings};
use crate::antibot::AntiBotPolicy;
use crate::guard::PurchaseGuard;
use crate::interstitial::QueueWait;
use crate::reporter::Reporter;

/// Reaction to a click on a scripted selector.
#[derive(Debug, Clone)]
pub(crate) enum Effect {
    Reveal(&'static str),
    Navigate(String),
    Respond(ObservedResponse),
}

#[derive(Default)]
struct PageState {
    url: String,
    present: HashSet<String>,
    disabled: HashSet<String>,
    texts: HashMap<String, String>,
    cookies: Vec<BrowserCookie>,
    landings: HashMap<String, String>,
    clears_after: Option<(u32, String)>,
    on_click: HashMap<String, Vec<Effect>>,
    responses: Vec<ObservedResponse>,
    actions: Vec<String>,
    screenshot_fails: bool,
    goto_fails: Option<String>,
}

/// In-memory [`PageSession`]: every wait resolves immediately against the
/// scripted state, and every interaction is recorded.
#[derive(Clone, Default)]
pub(crate) struct ScriptedPage {
    state: Arc<Mutex<PageState>>,
}

impl ScriptedPage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn present(self, selectors: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.present.extend(selectors.iter().map(|s| (*s).to_owned()));
        }
        self
    }

    pub(crate) fn disabled(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .disabled
            .insert(selector.to_owned());
        self
    }

    pub(crate) fn text(self, selector: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(selector.to_owned(), text.to_owned());
        self
    }

    pub(crate) fn cookie(self, name: &str, value: &str) -> Self {
        self.state.lock().unwrap().cookies.push(BrowserCookie {
            name: name.to_owned(),
            value: value.to_owned(),
        });
        self
    }

    /// The next `goto(requested)` lands on `landed` instead.
    pub(crate) fn lands_on(self, requested: &str, landed: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .landings
            .insert(requested.to_owned(), landed.to_owned());
        self
    }

    /// After `polls` reads of the current URL the page moves to `url`.
    pub(crate) fn clears_after(self, polls: u32, url: &str) -> Self {
        self.state.lock().unwrap().clears_after = Some((polls, url.to_owned()));
        self
    }

    pub(crate) fn on_click(self, selector: &str, effect: Effect) -> Self {
        self.state
            .lock()
            .unwrap()
            .on_click
            .entry(selector.to_owned())
            .or_default()
            .push(effect);
        self
    }

    pub(crate) fn screenshot_fails(self) -> Self {
        self.state.lock().unwrap().screenshot_fails = true;
        self
    }

    /// Every `goto` lands but reports `reason`, like a page that never
    /// finishes loading.
    pub(crate) fn goto_fails(self, reason: &str) -> Self {
        self.state.lock().unwrap().goto_fails = Some(reason.to_owned());
        self
    }

    pub(crate) fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    pub(crate) fn did(&self, action: &str) -> bool {
        self.actions().iter().any(|a| a == action)
    }

    fn record(&self, action: String) {
        self.state.lock().unwrap().actions.push(action);
    }

    fn require(&self, selector: &str) -> Result<(), PageError> {
        if self.state.lock().unwrap().present.contains(selector) {
            Ok(())
        } else {
            Err(PageError::ElementNotFound {
                selector: selector.to_owned(),
            })
        }
    }

    fn apply_click(&self, selector: &str) {
        let mut state = self.state.lock().unwrap();
        let effects = state.on_click.get(selector).cloned().unwrap_or_default();
        for effect in effects {
            match effect {
                Effect::Reveal(sel) => {
                    state.present.insert(sel.to_owned());
                }
                Effect::Navigate(url) => state.url = url,
                Effect::Respond(response) => state.responses.push(response),
            }
        }
    }
}

#[async_trait]
impl PageSession for ScriptedPage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), PageError> {
        self.record(format!("goto:{url}"));
        let mut state = self.state.lock().unwrap();
        let landed = state.landings.remove(url).unwrap_or_else(|| url.to_owned());
        state.url = landed;
        match &state.goto_fails {
            Some(reason) => Err(PageError::Navigation {
                url: url.to_owned(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn current_url(&self) -> Result<String, PageError> {
        let mut state = self.state.lock().unwrap();
        if let Some((polls, next)) = state.clears_after.take() {
            if polls == 0 {
                state.url = next;
            } else {
                state.clears_after = Some((polls - 1, next));
            }
        }
        Ok(state.url.clone())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        self.require(selector).map_err(|_| PageError::Timeout {
            what: selector.to_owned(),
            after: timeout,
        })
    }

    async fn is_present(&self, selector: &str) -> Result<bool, PageError> {
        Ok(self.require(selector).is_ok())
    }

    async fn is_enabled(&self, selector: &str) -> Result<bool, PageError> {
        self.require(selector)?;
        Ok(!self.state.lock().unwrap().disabled.contains(selector))
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("click:{selector}"));
        self.apply_click(selector);
        Ok(())
    }

    async fn force_click(&self, selector: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("force_click:{selector}"));
        self.apply_click(selector);
        Ok(())
    }

    async fn check(&self, selector: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("check:{selector}"));
        Ok(())
    }

    async fn focus(&self, selector: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("focus:{selector}"));
        Ok(())
    }

    async fn clear(&self, selector: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("clear:{selector}"));
        Ok(())
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("type:{selector}={value}"));
        Ok(())
    }

    async fn type_keys(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("keys:{selector}={value}"));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.require(selector)?;
        self.record(format!("select:{selector}={value}"));
        Ok(())
    }

    async fn eval_text(&self, selector: &str) -> Result<Option<String>, PageError> {
        Ok(self.state.lock().unwrap().texts.get(selector).cloned())
    }

    async fn reset_network_log(&self) -> Result<(), PageError> {
        self.state.lock().unwrap().responses.clear();
        Ok(())
    }

    async fn wait_for_response(
        &self,
        matcher: &ResponseMatcher,
        timeout: Duration,
    ) -> Result<ObservedResponse, PageError> {
        self.state
            .lock()
            .unwrap()
            .responses
            .iter()
            .find(|r| matcher.matches(r))
            .cloned()
            .ok_or_else(|| PageError::Timeout {
                what: matcher.to_string(),
                after: timeout,
            })
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        if self.state.lock().unwrap().screenshot_fails {
            return Err(PageError::Command("screenshot unavailable".to_owned()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, PageError> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn close(&self) -> Result<(), PageError> {
        self.record("close".to_owned());
        Ok(())
    }
}

/// Notifier that records every notification it is asked to deliver.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::default(),
            fail: true,
        })
    }

    pub(crate) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.text).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.fail {
            return Err(NotifyError::Rejected {
                transport: "test",
                status: 500,
                body: String::new(),
            });
        }
        Ok(())
    }
}

pub(crate) fn customer() -> CustomerProfile {
    CustomerProfile {
        first_name: "Ada".to_owned(),
        last_name: "Lovelace".to_owned(),
        address: "1 Yonge St".to_owned(),
        address_second_line: Some("Unit 4".to_owned()),
        city: "Toronto".to_owned(),
        province: "ON".to_owned(),
        postal_code: "M5E1E5".to_owned(),
        phone: "4165550100".to_owned(),
        email: "ada@example.com".to_owned(),
        budget: Decimal::new(1000, 0),
    }
}

pub(crate) fn payment() -> PaymentProfile {
    PaymentProfile {
        card_number: "4111111111111111".to_owned(),
        expiration_month: "09".to_owned(),
        expiration_year: "2029".to_owned(),
        cvv: "123".to_owned(),
        first_name: "Ada".to_owned(),
        last_name: "Lovelace".to_owned(),
        address: "1 Yonge St".to_owned(),
        city: "Toronto".to_owned(),
        province: "ON".to_owned(),
        postal_code: "M5E1E5".to_owned(),
    }
}

/// Context over a scripted page with a guard under `dir`. Waits are short
/// and there is no settle delay after "place order".
pub(crate) fn adapter_context(
    storefront: Storefront,
    page: &ScriptedPage,
    notifier: &Arc<RecordingNotifier>,
    dir: &Path,
    test_mode: bool,
) -> AdapterContext {
    AdapterContext {
        storefront,
        session: Box::new(page.clone()),
        reporter: Reporter::new(notifier.clone()),
        guard: Arc::new(PurchaseGuard::new(dir.join("purchase.json"))),
        customer: Arc::new(customer()),
        payment: Arc::new(payment()),
        login: Some(LoginCredentials {
            email: "ada@example.com".to_owned(),
            password: "hunter2".to_owned(),
        }),
        settings: CheckoutSettings {
            test_mode,
            guest_checkout: false,
            nav_timeout: Duration::from_secs(60),
            element_timeout: Duration::from_secs(10),
            cart_timeout: Duration::from_secs(30),
            queue: QueueWait {
                ceiling: Duration::from_secs(120),
                poll: Duration::from_secs(5),
            },
            settle_delay: Duration::ZERO,
        },
        antibot: AntiBotPolicy::default(),
        queue_state: tokio::sync::watch::channel(false).0,
    }
}
