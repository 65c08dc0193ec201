//! Browser collaborator contracts.
//!
//! The core never drives a browser itself. A `SessionProvider` hands out
//! one `BrowserSession` per task; tools call the session and map its
//! errors onto the dispatcher's error codes. Real automation (CDP,
//! WebDriver, ...) lives outside this crate.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::codes;
use crate::model::{BrowserHealth, KeyElement};

/// Failures reported by the browser collaborator.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("network error: {0}")]
    Net(String),

    #[error("stale DOM: {0}")]
    StaleDom(String),

    #[error("browser operation timed out: {0}")]
    Timeout(String),

    #[error("bad argument: {0}")]
    BadArg(String),

    #[error("browser disconnected: {0}")]
    Disconnected(String),
}

impl BrowserError {
    /// Wire-level error code for feedback envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            BrowserError::Net(_) | BrowserError::Disconnected(_) => codes::E_NET,
            BrowserError::StaleDom(_) => codes::E_STALE_DOM,
            BrowserError::Timeout(_) => codes::E_TIMEOUT,
            BrowserError::BadArg(_) => codes::E_BAD_ARG,
        }
    }
}

/// Scroll direction for the `scroll` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            _ => None,
        }
    }
}

/// A text link surfaced by `find_link_by_text`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LinkHit {
    pub text: String,
    pub href: String,
}

/// What the collaborator can report about the current page without any
/// tool-specific work. The dispatcher turns this into a `WebObservation`.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub http_status: Option<u16>,
    pub load_time_ms: u64,
    pub authenticated: bool,
    pub key_elements: Vec<KeyElement>,
    pub health: BrowserHealth,
}

/// One live browser session, exclusively owned by one decision loop.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to a full URL; resolves once the main document committed.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// Click the element at `xpath`.
    async fn click(&self, xpath: &str) -> Result<(), BrowserError>;

    /// Click the `index`-th (0-based) match of a CSS selector.
    async fn click_nth(&self, selector: &str, index: usize) -> Result<(), BrowserError>;

    /// Type into the element at `xpath`, optionally pressing Enter after.
    async fn type_text(&self, xpath: &str, text: &str, press_enter: bool)
        -> Result<(), BrowserError>;

    /// Scroll the page; `amount` is in pixels for Up/Down.
    async fn scroll(&self, direction: ScrollDirection, amount: Option<i64>)
        -> Result<(), BrowserError>;

    /// Block until a predicate such as "networkidle" or "selector:#x" holds.
    async fn wait_for(&self, condition: &str) -> Result<(), BrowserError>;

    /// Extract one attribute from every match of `selector`.
    async fn extract(
        &self,
        selector: Option<&str>,
        attribute: &str,
        limit: Option<usize>,
    ) -> Result<Vec<String>, BrowserError>;

    /// Read one attribute from the element at `xpath`.
    async fn attribute(&self, xpath: &str, attribute: &str) -> Result<String, BrowserError>;

    /// PNG-encoded screenshot of the viewport or the full page.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>, BrowserError>;

    /// Links whose visible text contains `keyword`.
    async fn links_by_text(
        &self,
        keyword: &str,
        limit: Option<usize>,
    ) -> Result<Vec<LinkHit>, BrowserError>;

    /// Cheap snapshot of the current page for observation building.
    async fn page_state(&self) -> PageState;
}

/// Hands out browser sessions, one per task.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Acquire the session for `task_id`. Called once per task.
    async fn acquire(
        &self,
        task_id: &str,
        headless: bool,
    ) -> Result<std::sync::Arc<dyn BrowserSession>, BrowserError>;

    /// Release whatever `acquire` allocated. Called from finalization.
    async fn release(&self, task_id: &str);

    /// DevTools URL for live viewing, when the collaborator exposes one.
    fn cdp_url(&self, task_id: &str) -> Option<String>;
}
