use std::path::PathBuf;

/// How adapters are driven within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One adapter after the other, in configuration order.
    Sequential,
    /// Every adapter at once, each on its own browsing session.
    Concurrent,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Sequential => write!(f, "sequential"),
            RunMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub tasks_path: PathBuf,
    pub profile_path: PathBuf,
    pub guard_path: PathBuf,
    pub screenshot_dir: PathBuf,
    pub webdriver_url: String,
    pub headless: bool,
    pub log_level: String,
    /// Stop right before the final "place order" action.
    pub test_mode: bool,
    pub guest_checkout: bool,
    pub run_mode: RunMode,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
    pub antibot_cooldown_secs: u64,
    pub queue_wait_secs: u64,
    pub queue_poll_secs: u64,
    pub nav_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub cart_timeout_secs: u64,
    pub notify_grace_secs: u64,
    /// `None` keeps retrying until a purchase or a terminal condition.
    pub max_rounds: Option<u32>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("tasks_path", &self.tasks_path)
            .field("profile_path", &self.profile_path)
            .field("guard_path", &self.guard_path)
            .field("screenshot_dir", &self.screenshot_dir)
            // WebDriver URLs may embed grid credentials.
            .field("webdriver_url", &"[redacted]")
            .field("headless", &self.headless)
            .field("log_level", &self.log_level)
            .field("test_mode", &self.test_mode)
            .field("guest_checkout", &self.guest_checkout)
            .field("run_mode", &self.run_mode)
            .field("backoff_min_secs", &self.backoff_min_secs)
            .field("backoff_max_secs", &self.backoff_max_secs)
            .field("antibot_cooldown_secs", &self.antibot_cooldown_secs)
            .field("queue_wait_secs", &self.queue_wait_secs)
            .field("queue_poll_secs", &self.queue_poll_secs)
            .field("nav_timeout_secs", &self.nav_timeout_secs)
            .field("element_timeout_secs", &self.element_timeout_secs)
            .field("cart_timeout_secs", &self.cart_timeout_secs)
            .field("notify_grace_secs", &self.notify_grace_secs)
            .field("max_rounds", &self.max_rounds)
            .finish()
    }
}
