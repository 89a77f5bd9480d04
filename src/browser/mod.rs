//! Browser host: launches Chromium through CDP and exposes the surfaces
//! the agent loop drives. The newest-tab snapshot is the zombie-tab fix:
//! a click that opened a fresh tab makes that tab the active surface.

mod page;
pub mod scout;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use webpilot_page_scanner::{PageError, PageOps, PageResult};

use crate::config::Config;

pub use page::CdpSurface;

#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Surface for the most recently opened tab.
    async fn newest_surface(&self) -> PageResult<Arc<dyn PageOps>>;

    async fn close(&self);
}

/// Launches one browser per session. Injectable so tests can substitute a
/// scripted host.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserHost>>;
}

pub struct ChromeHost {
    browser: Mutex<Browser>,
    handler_task: JoinHandle<()>,
}

impl ChromeHost {
    pub async fn launch(config: &Config) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(config.viewport_width, config.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(|err| anyhow!(err))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("failed to launch browser")?;
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let host = Self {
            browser: Mutex::new(browser),
            handler_task,
        };
        // One blank page so the first newest-tab snapshot always resolves.
        let browser = host.browser.lock().await;
        browser
            .new_page("about:blank")
            .await
            .context("failed to open initial page")?;
        drop(browser);
        Ok(host)
    }
}

#[async_trait]
impl BrowserHost for ChromeHost {
    async fn newest_surface(&self) -> PageResult<Arc<dyn PageOps>> {
        let browser = self.browser.lock().await;
        let pages = browser
            .pages()
            .await
            .map_err(|err| PageError::Io(err.to_string()))?;
        let page = match pages.into_iter().last() {
            Some(page) => page,
            None => {
                debug!("no open tabs, opening a blank one");
                browser
                    .new_page("about:blank")
                    .await
                    .map_err(|err| PageError::Io(err.to_string()))?
            }
        };
        Ok(Arc::new(CdpSurface::new(page)))
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!(%err, "browser close failed");
        }
        self.handler_task.abort();
    }
}

pub struct ChromeFactory {
    config: Config,
}

impl ChromeFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserFactory for ChromeFactory {
    async fn launch(&self) -> Result<Arc<dyn BrowserHost>> {
        Ok(Arc::new(ChromeHost::launch(&self.config).await?))
    }
}
