//! [`PageDriver`] over the W3C WebDriver protocol, backed by `fantoccini`.
//!
//! Expects a chromedriver/geckodriver (or a grid) listening at the configured
//! URL. Each [`WebDriverDriver::new_session`] call opens a fresh browser
//! session, so cookies and page state never leak between adapters.

use std::time::Duration;

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Value};

use crate::error::PageError;
use crate::port::{BrowserCookie, ObservedResponse, PageDriver, PageSession, ResponseMatcher};

const WINDOW_WIDTH: u32 = 1920;
const WINDOW_HEIGHT: u32 = 1080;

/// Pause between keystrokes for [`PageSession::type_keys`].
const KEYSTROKE_DELAY: Duration = Duration::from_millis(40);

/// Polling interval for [`PageSession::wait_for_response`].
const RESPONSE_POLL: Duration = Duration::from_millis(250);

const FORCE_CLICK_JS: &str = r"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
el.setAttribute('style', 'visibility:visible');
el.removeAttribute('disabled');
el.click();
return true;
";

const CHECK_JS: &str = r"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
el.setAttribute('style', 'visibility:visible');
if (!el.checked) { el.click(); }
if (!el.checked) {
  el.checked = true;
  el.dispatchEvent(new Event('change', { bubbles: true }));
}
return true;
";

const FOCUS_JS: &str = r"
const el = document.querySelector(arguments[0]);
if (!el) { return false; }
el.focus();
return true;
";

const TEXT_CONTENT_JS: &str = r"
const el = document.querySelector(arguments[0]);
return el ? el.textContent : null;
";

const RESOURCE_ENTRIES_JS: &str = r"
return performance.getEntriesByType('resource').map(function (e) {
  return { url: e.name, status: e.responseStatus || 0 };
});
";

const CLEAR_RESOURCES_JS: &str = "performance.clearResourceTimings(); return true;";

/// Opens WebDriver sessions against a running driver endpoint.
#[derive(Debug, Clone)]
pub struct WebDriverDriver {
    webdriver_url: String,
    headless: bool,
}

impl WebDriverDriver {
    #[must_use]
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, Value> {
        let mut args = vec![format!("--window-size={WINDOW_WIDTH},{WINDOW_HEIGHT}")];
        if self.headless {
            args.push("--headless=new".to_owned());
        }
        let mut caps = serde_json::Map::new();
        caps.insert("acceptInsecureCerts".to_owned(), json!(true));
        caps.insert("goog:chromeOptions".to_owned(), json!({ "args": args }));
        caps
    }
}

#[async_trait]
impl PageDriver for WebDriverDriver {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, PageError> {
        tracing::info!(headless = self.headless, "opening WebDriver session");
        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| PageError::SessionStart(e.to_string()))?;

        if let Err(e) = client.set_window_size(WINDOW_WIDTH, WINDOW_HEIGHT).await {
            tracing::debug!(error = %e, "could not resize browser window");
        }

        Ok(Box::new(WebDriverSession { client }))
    }
}

/// One browser session.
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    async fn run_script(&self, script: &str, selector: &str) -> Result<Value, PageError> {
        self.client
            .execute(script, vec![json!(selector)])
            .await
            .map_err(|e| map_cmd_error(e, selector))
    }

    async fn run_script_on_element(&self, script: &str, selector: &str) -> Result<(), PageError> {
        match self.run_script(script, selector).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(PageError::ElementNotFound {
                selector: selector.to_owned(),
            }),
        }
    }

    async fn find(&self, selector: &str) -> Result<fantoccini::elements::Element, PageError> {
        self.client
            .find(Locator::Css(selector))
            .await
            .map_err(|e| map_cmd_error(e, selector))
    }

    async fn observed_responses(&self) -> Result<Vec<ObservedResponse>, PageError> {
        let value = self
            .client
            .execute(RESOURCE_ENTRIES_JS, Vec::new())
            .await
            .map_err(|e| map_cmd_error(e, "performance entries"))?;
        Ok(parse_resource_entries(&value))
    }
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), PageError> {
        tracing::debug!(url, "navigating");
        match tokio::time::timeout(timeout, self.client.goto(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => match map_cmd_error(e, url) {
                PageError::Command(reason) => Err(PageError::Navigation {
                    url: url.to_owned(),
                    reason,
                }),
                other => Err(other),
            },
            Err(_) => Err(PageError::Timeout {
                what: format!("navigation to {url}"),
                after: timeout,
            }),
        }
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| map_cmd_error(e, "current url"))
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), PageError> {
        match self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::Css(selector))
            .await
        {
            Ok(_) => Ok(()),
            Err(CmdError::WaitTimeout) => Err(PageError::Timeout {
                what: selector.to_owned(),
                after: timeout,
            }),
            Err(e) => Err(map_cmd_error(e, selector)),
        }
    }

    async fn is_present(&self, selector: &str) -> Result<bool, PageError> {
        match self.client.find(Locator::Css(selector)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_no_such_element() => Ok(false),
            Err(e) => Err(map_cmd_error(e, selector)),
        }
    }

    async fn is_enabled(&self, selector: &str) -> Result<bool, PageError> {
        match self.client.find(Locator::Css(selector)).await {
            Ok(element) => element
                .is_enabled()
                .await
                .map_err(|e| map_cmd_error(e, selector)),
            Err(e) if e.is_no_such_element() => Ok(false),
            Err(e) => Err(map_cmd_error(e, selector)),
        }
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        self.find(selector)
            .await?
            .click()
            .await
            .map_err(|e| map_cmd_error(e, selector))
    }

    async fn force_click(&self, selector: &str) -> Result<(), PageError> {
        self.run_script_on_element(FORCE_CLICK_JS, selector).await
    }

    async fn check(&self, selector: &str) -> Result<(), PageError> {
        self.run_script_on_element(CHECK_JS, selector).await
    }

    async fn focus(&self, selector: &str) -> Result<(), PageError> {
        self.run_script_on_element(FOCUS_JS, selector).await
    }

    async fn clear(&self, selector: &str) -> Result<(), PageError> {
        self.find(selector)
            .await?
            .clear()
            .await
            .map_err(|e| map_cmd_error(e, selector))
    }

    async fn type_text(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.find(selector)
            .await?
            .send_keys(value)
            .await
            .map_err(|e| map_cmd_error(e, selector))
    }

    async fn type_keys(&self, selector: &str, value: &str) -> Result<(), PageError> {
        let element = self.find(selector).await?;
        let mut buf = [0u8; 4];
        for ch in value.chars() {
            element
                .send_keys(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| map_cmd_error(e, selector))?;
            tokio::time::sleep(KEYSTROKE_DELAY).await;
        }
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.find(selector)
            .await?
            .select_by_value(value)
            .await
            .map_err(|e| map_cmd_error(e, selector))
    }

    async fn eval_text(&self, selector: &str) -> Result<Option<String>, PageError> {
        let value = self.run_script(TEXT_CONTENT_JS, selector).await?;
        Ok(value.as_str().map(str::to_owned))
    }

    async fn reset_network_log(&self) -> Result<(), PageError> {
        self.client
            .execute(CLEAR_RESOURCES_JS, Vec::new())
            .await
            .map(|_| ())
            .map_err(|e| map_cmd_error(e, "performance entries"))
    }

    async fn wait_for_response(
        &self,
        matcher: &ResponseMatcher,
        timeout: Duration,
    ) -> Result<ObservedResponse, PageError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let responses = self.observed_responses().await?;
            if let Some(hit) = responses.into_iter().find(|r| matcher.matches(r)) {
                return Ok(hit);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    what: matcher.to_string(),
                    after: timeout,
                });
            }
            tokio::time::sleep(RESPONSE_POLL).await;
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>, PageError> {
        self.client
            .screenshot()
            .await
            .map_err(|e| map_cmd_error(e, "screenshot"))
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>, PageError> {
        let cookies = self
            .client
            .get_all_cookies()
            .await
            .map_err(|e| map_cmd_error(e, "cookies"))?;
        Ok(cookies
            .iter()
            .map(|c| BrowserCookie {
                name: c.name().to_owned(),
                value: c.value().to_owned(),
            })
            .collect())
    }

    async fn close(&self) -> Result<(), PageError> {
        self.client
            .clone()
            .close()
            .await
            .map_err(|e| map_cmd_error(e, "close"))
    }
}

fn map_cmd_error(err: CmdError, target: &str) -> PageError {
    if err.is_no_such_element() {
        return PageError::ElementNotFound {
            selector: target.to_owned(),
        };
    }
    match err {
        CmdError::WaitTimeout => PageError::Timeout {
            what: target.to_owned(),
            after: Duration::ZERO,
        },
        CmdError::Lost(e) => PageError::SessionLost(e.to_string()),
        other => PageError::Command(other.to_string()),
    }
}

/// Converts the array returned by [`RESOURCE_ENTRIES_JS`].
fn parse_resource_entries(value: &Value) -> Vec<ObservedResponse> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let url = entry.get("url")?.as_str()?.to_owned();
            let status = entry
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok())
                .filter(|s| *s != 0);
            Some(ObservedResponse { url, status })
        })
        .collect()
}
