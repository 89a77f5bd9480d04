//! `PageOps` implementation over a CDP page.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::Page;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use webpilot_page_scanner::{PageError, PageOps, PageResult, WaitUntil};

/// Bound on the navigation-or-domcontentloaded race.
const NAV_RACE: Duration = Duration::from_secs(3);
/// Grace after the document settles in a network-idle wait.
const IDLE_GRACE: Duration = Duration::from_millis(250);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CdpSurface {
    page: Arc<Page>,
}

impl CdpSurface {
    pub fn new(page: Page) -> Self {
        Self {
            page: Arc::new(page),
        }
    }

    fn classify(err: impl std::fmt::Display) -> PageError {
        let message = err.to_string();
        let lowered = message.to_lowercase();
        if lowered.contains("context") && lowered.contains("destroyed") {
            PageError::ContextDestroyed
        } else if lowered.contains("timeout") {
            PageError::NavTimeout
        } else {
            PageError::Io(message)
        }
    }

    async fn ready_state(&self) -> String {
        self.eval("document.readyState")
            .await
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageOps for CdpSurface {
    async fn eval(&self, js: &str) -> PageResult<Value> {
        let result = self.page.evaluate(js).await.map_err(Self::classify)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn current_url(&self) -> PageResult<String> {
        self.page
            .url()
            .await
            .map_err(Self::classify)
            .map(|url| url.unwrap_or_default())
    }

    async fn title(&self) -> PageResult<String> {
        self.page
            .get_title()
            .await
            .map_err(Self::classify)
            .map(|title| title.unwrap_or_default())
    }

    async fn visible_text(&self, max_chars: usize) -> PageResult<String> {
        let js = format!(
            "(document.body ? document.body.innerText : '').slice(0, {max_chars})"
        );
        let value = self.eval(&js).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click_selector(&self, selector: &str) -> PageResult<()> {
        let encoded = serde_json::to_string(selector)
            .map_err(|err| PageError::Io(err.to_string()))?;
        let js = format!(
            "(() => {{ const el = document.querySelector({encoded}); if (!el) return false; el.click(); return true; }})()"
        );
        match self.eval(&js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(PageError::TargetNotFound(selector.to_string())),
        }
    }

    async fn click_point(&self, x: f64, y: f64) -> PageResult<()> {
        let down = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MousePressed)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(PageError::Io)?;
        self.page.execute(down).await.map_err(Self::classify)?;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let up = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseReleased)
            .x(x)
            .y(y)
            .button(MouseButton::Left)
            .click_count(1)
            .build()
            .map_err(PageError::Io)?;
        self.page.execute(up).await.map_err(Self::classify)?;
        Ok(())
    }

    async fn fill_selector(&self, selector: &str, value: &str) -> PageResult<()> {
        let encoded_selector =
            serde_json::to_string(selector).map_err(|err| PageError::Io(err.to_string()))?;
        let encoded_value =
            serde_json::to_string(value).map_err(|err| PageError::Io(err.to_string()))?;
        // The native value setter keeps framework-controlled inputs (React,
        // Vue) in sync with the dispatched input event.
        let js = format!(
            r#"(() => {{
  const el = document.querySelector({encoded_selector});
  if (!el) return false;
  el.focus();
  const proto = el.tagName === 'TEXTAREA'
    ? HTMLTextAreaElement.prototype
    : HTMLInputElement.prototype;
  const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
  if (descriptor && descriptor.set) {{
    descriptor.set.call(el, {encoded_value});
  }} else {{
    el.value = {encoded_value};
  }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return true;
}})()"#
        );
        match self.eval(&js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(PageError::TargetNotFound(selector.to_string())),
        }
    }

    async fn press_key(&self, key: &str, selector: Option<&str>) -> PageResult<()> {
        if let Some(selector) = selector {
            let encoded = serde_json::to_string(selector)
                .map_err(|err| PageError::Io(err.to_string()))?;
            let js = format!(
                "(() => {{ const el = document.querySelector({encoded}); if (el) el.focus(); return !!el; }})()"
            );
            if self.eval(&js).await?.as_bool() != Some(true) {
                return Err(PageError::TargetNotFound(selector.to_string()));
            }
        }

        let (code, text, virtual_key) = match key {
            "Enter" => ("Enter", Some("\r"), Some(13)),
            "Tab" => ("Tab", Some("\t"), Some(9)),
            "Escape" => ("Escape", None, Some(27)),
            "Backspace" => ("Backspace", None, Some(8)),
            "ArrowUp" => ("ArrowUp", None, Some(38)),
            "ArrowDown" => ("ArrowDown", None, Some(40)),
            other => (other, None, None),
        };

        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key.to_string())
            .code(code.to_string());
        if let Some(vk) = virtual_key {
            down = down.windows_virtual_key_code(vk).native_virtual_key_code(vk);
        }
        self.page
            .execute(down.build().map_err(PageError::Io)?)
            .await
            .map_err(Self::classify)?;

        if let Some(text) = text {
            let char_event = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(text.to_string())
                .build()
                .map_err(PageError::Io)?;
            self.page.execute(char_event).await.map_err(Self::classify)?;
        }

        let mut up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key.to_string())
            .code(code.to_string());
        if let Some(vk) = virtual_key {
            up = up.windows_virtual_key_code(vk).native_virtual_key_code(vk);
        }
        self.page
            .execute(up.build().map_err(PageError::Io)?)
            .await
            .map_err(Self::classify)?;
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> PageResult<()> {
        let js = format!("window.scrollBy({dx}, {dy})");
        self.eval(&js).await.map(|_| ())
    }

    async fn scroll_into_view(&self, selector: &str) -> PageResult<()> {
        let encoded = serde_json::to_string(selector)
            .map_err(|err| PageError::Io(err.to_string()))?;
        let js = format!(
            "(() => {{ const el = document.querySelector({encoded}); if (!el) return false; el.scrollIntoView({{ block: 'center' }}); return true; }})()"
        );
        match self.eval(&js).await?.as_bool() {
            Some(true) => Ok(()),
            _ => Err(PageError::TargetNotFound(selector.to_string())),
        }
    }

    async fn navigate(&self, url: &str) -> PageResult<()> {
        // Race navigation against a bounded clock; a slow page is left to
        // keep loading and the next observation reads whatever arrived.
        match tokio::time::timeout(NAV_RACE, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(Self::classify(err)),
            Err(_) => {
                debug!(%url, "navigation still in flight after race window");
                Ok(())
            }
        }
    }

    async fn wait_for_network_idle(&self, cap_ms: u64) -> PageResult<()> {
        self.wait_until(WaitUntil::Networkidle, cap_ms).await
    }

    async fn wait_until(&self, until: WaitUntil, cap_ms: u64) -> PageResult<()> {
        let deadline = Instant::now() + Duration::from_millis(cap_ms);
        loop {
            let state = self.ready_state().await;
            let settled = match until {
                WaitUntil::Load | WaitUntil::Networkidle => state == "complete",
                WaitUntil::Domcontentloaded => state == "interactive" || state == "complete",
            };
            if settled {
                if matches!(until, WaitUntil::Networkidle) {
                    let grace = IDLE_GRACE.min(deadline.saturating_duration_since(Instant::now()));
                    tokio::time::sleep(grace).await;
                }
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn screenshot_png(&self) -> PageResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.map_err(Self::classify)
    }
}
