//! Port traits the scanner and agent loop drive the browser through.
//!
//! The concrete implementation lives in the host crate (CDP adapter); tests
//! substitute scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure categories surfaced by a page backend.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("execution context destroyed")]
    ContextDestroyed,
    #[error("target element not found: {0}")]
    TargetNotFound(String),
    #[error("page i/o failure: {0}")]
    Io(String),
}

impl PageError {
    /// Context destruction is the expected side effect of a navigating
    /// action; callers treat it as "re-observe on the next iteration".
    pub fn is_context_destroyed(&self) -> bool {
        matches!(self, PageError::ContextDestroyed)
    }
}

pub type PageResult<T> = Result<T, PageError>;

/// Scroll measurements sampled from the live document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollGeometry {
    pub scroll_y: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollGeometry {
    /// A page that cannot scroll at all: no offset and content fits the
    /// viewport (within a small tolerance).
    pub fn is_unscrollable(&self) -> bool {
        self.scroll_y == 0.0 && self.scroll_height - self.viewport_height <= 10.0
    }

    pub fn at_bottom(&self) -> bool {
        self.scroll_y + self.viewport_height >= self.scroll_height - 5.0
    }
}

/// How long a `wait` action should block.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUntil {
    Load,
    Domcontentloaded,
    Networkidle,
}

/// Single-tab browser surface: everything the scanner and the agent loop
/// need from the toolkit, nothing more.
#[async_trait]
pub trait PageOps: Send + Sync {
    /// Evaluate a JS expression in the page and return its JSON value.
    async fn eval(&self, js: &str) -> PageResult<Value>;

    async fn current_url(&self) -> PageResult<String>;

    async fn title(&self) -> PageResult<String>;

    /// Rendered text (innerText semantics: hidden and script text excluded),
    /// truncated to `max_chars`.
    async fn visible_text(&self, max_chars: usize) -> PageResult<String>;

    /// Instant programmatic click on the first element matching `selector`.
    async fn click_selector(&self, selector: &str) -> PageResult<()>;

    /// Trusted cursor click at viewport coordinates.
    async fn click_point(&self, x: f64, y: f64) -> PageResult<()>;

    /// Clear and type into the first element matching `selector`.
    async fn fill_selector(&self, selector: &str, value: &str) -> PageResult<()>;

    /// Press a key, optionally focusing `selector` first.
    async fn press_key(&self, key: &str, selector: Option<&str>) -> PageResult<()>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> PageResult<()>;

    async fn scroll_into_view(&self, selector: &str) -> PageResult<()>;

    async fn navigate(&self, url: &str) -> PageResult<()>;

    /// Block until network goes quiet, bounded by `cap_ms`. Never fails on
    /// timeout; noisy pages simply use the full budget.
    async fn wait_for_network_idle(&self, cap_ms: u64) -> PageResult<()>;

    async fn wait_until(&self, until: WaitUntil, cap_ms: u64) -> PageResult<()>;

    async fn screenshot_png(&self) -> PageResult<Vec<u8>>;

    /// Sample live scroll geometry. Default goes through `eval`.
    async fn scroll_geometry(&self) -> PageResult<ScrollGeometry> {
        let value = self
            .eval(
                "JSON.stringify({y: window.scrollY, h: document.documentElement.scrollHeight, v: window.innerHeight})",
            )
            .await?;
        let raw = value.as_str().unwrap_or("{}");
        let parsed: Value =
            serde_json::from_str(raw).map_err(|err| PageError::Io(err.to_string()))?;
        Ok(ScrollGeometry {
            scroll_y: parsed["y"].as_f64().unwrap_or(0.0),
            scroll_height: parsed["h"].as_f64().unwrap_or(0.0),
            viewport_height: parsed["v"].as_f64().unwrap_or(0.0),
        })
    }
}
