//! Live URL verification for the planner: a visible auxiliary browser
//! searches a public engine and scrapes the top result links. Never shares
//! a profile or cookies with the main session browser.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

use webpilot_agent_core::{AgentError, AgentResult, ScoutSearch, VerifiedUrl};
use webpilot_core_types::Phase;

use crate::browser::CdpSurface;
use crate::channel::ClientChannel;
use webpilot_page_scanner::PageOps;

/// Upper bound on waiting for the user to solve a CAPTCHA.
const CAPTCHA_WAIT: Duration = Duration::from_secs(120);
const CAPTCHA_POLL: Duration = Duration::from_secs(5);

const PROBE_JS: &str = r#"
(() => {
  const marker = document.querySelector(
    '#captcha-form, form[action*="sorry"], iframe[src*="recaptcha"]'
  );
  const text = (document.body ? document.body.innerText : '').slice(0, 2000);
  return JSON.stringify({
    captcha: !!marker || /unusual traffic/i.test(text),
    hasResults: !!document.querySelector('#search'),
  });
})()
"#;

const EXTRACT_JS: &str = r#"
(() => {
  const out = [];
  const seen = new Set();
  for (const h3 of Array.from(document.querySelectorAll('#search a h3'))) {
    const a = h3.closest('a');
    if (!a || !a.href || seen.has(a.href)) continue;
    seen.add(a.href);
    out.push({ title: (h3.innerText || '').trim(), url: a.href });
    if (out.length >= 3) break;
  }
  return JSON.stringify(out);
})()
"#;

pub struct SearchScout {
    channel: ClientChannel,
}

impl SearchScout {
    pub fn new(channel: ClientChannel) -> Self {
        Self { channel }
    }

    fn log(&self, message: &str) {
        self.channel.log(0, Phase::Planning, message, None);
    }
}

#[async_trait]
impl ScoutSearch for SearchScout {
    async fn verify_urls(&self, query: &str) -> AgentResult<Vec<VerifiedUrl>> {
        self.log(&format!("scout: verifying URL via live search for \"{query}\""));

        // Always headful: the user may need to solve a CAPTCHA in it.
        let browser_config = BrowserConfig::builder()
            .with_head()
            .build()
            .map_err(|err| AgentError::transport(err))?;
        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let result = self.run_search(&browser, query).await;

        if let Err(err) = browser.close().await {
            warn!(%err, "scout browser close failed");
        }
        handler_task.abort();
        result
    }
}

impl SearchScout {
    async fn run_search(&self, browser: &Browser, query: &str) -> AgentResult<Vec<VerifiedUrl>> {
        let search_url = Url::parse_with_params("https://www.google.com/search", &[("q", query)])
            .map_err(|err| AgentError::transport(err.to_string()))?;
        let page = browser
            .new_page(search_url.as_str())
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;
        let surface = CdpSurface::new(page);
        surface
            .wait_for_network_idle(5_000)
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;

        // CAPTCHA gate: tell the user, then wait up to the cap for either
        // the results container or the challenge to clear.
        let deadline = Instant::now() + CAPTCHA_WAIT;
        let mut announced = false;
        loop {
            let probe = self.probe(&surface).await?;
            if probe.has_results {
                break;
            }
            if probe.captcha {
                if !announced {
                    self.log(
                        "scout: the search engine is showing a CAPTCHA; please solve it in the \
                         scout browser window",
                    );
                    announced = true;
                }
            } else {
                break;
            }
            if Instant::now() >= deadline {
                self.log("scout: CAPTCHA wait timed out; planning without verified URLs");
                return Err(AgentError::transport("captcha wait timed out"));
            }
            tokio::time::sleep(CAPTCHA_POLL).await;
        }

        let value = surface
            .eval(EXTRACT_JS)
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;
        let raw = value.as_str().unwrap_or("[]");
        let urls: Vec<VerifiedUrl> = serde_json::from_str(raw)
            .map_err(|err| AgentError::schema(err.to_string()))?;
        let urls: Vec<VerifiedUrl> = urls
            .into_iter()
            .filter(|entry| !entry.title.is_empty())
            .take(3)
            .collect();
        info!(count = urls.len(), "scout extracted verified URLs");
        for entry in &urls {
            self.log(&format!("scout: verified {} -> {}", entry.title, entry.url));
        }
        if urls.is_empty() {
            return Err(AgentError::transport("no results scraped"));
        }
        Ok(urls)
    }

    async fn probe(&self, surface: &CdpSurface) -> AgentResult<ProbeResult> {
        let value = surface
            .eval(PROBE_JS)
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;
        let raw = value.as_str().unwrap_or("{}");
        let parsed: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| AgentError::schema(err.to_string()))?;
        Ok(ProbeResult {
            captcha: parsed["captcha"].as_bool().unwrap_or(false),
            has_results: parsed["hasResults"].as_bool().unwrap_or(false),
        })
    }
}

struct ProbeResult {
    captcha: bool,
    has_results: bool,
}
