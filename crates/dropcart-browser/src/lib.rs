//! Page-automation port for dropcart and its WebDriver implementation.

pub mod error;
pub mod port;
pub mod webdriver;

pub use error::PageError;
pub use port::{BrowserCookie, ObservedResponse, PageDriver, PageSession, ResponseMatcher};
pub use webdriver::{WebDriverDriver, WebDriverSession};
