//! Interactive-element scanner.
//!
//! A scan rewrites identity attributes on the live document and returns the
//! regions it tagged. No region survives a scan: the in-memory map is
//! cleared first, and a later action resolves its target by querying the
//! attribute again, never by position.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use webpilot_core_types::{BoundingBox, Region, RegionRole};

use crate::ports::{PageError, PageOps, PageResult};
use crate::{js, IDENTITY_ATTR};

/// Wait applied before the single SPA rescan, after network idle.
const SPA_SETTLE: Duration = Duration::from_secs(3);
/// Network-idle budget for the SPA rescan.
const SPA_IDLE_CAP_MS: u64 = 5_000;
/// Below this region count the cursor:pointer sweep kicks in.
const POINTER_SWEEP_THRESHOLD: usize = 5;

/// Shape emitted by the in-page scripts.
#[derive(Debug, Deserialize)]
struct RawRegion {
    id: String,
    label: String,
    tag: String,
    role: Option<String>,
    #[serde(rename = "type")]
    input_type: Option<String>,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    href: Option<String>,
}

impl RawRegion {
    fn into_region(self, confidence: f64) -> Region {
        let role = self
            .role
            .as_deref()
            .and_then(RegionRole::from_aria)
            .unwrap_or_else(|| match (self.tag.as_str(), self.input_type.as_deref()) {
                ("input", Some("checkbox")) => RegionRole::Checkbox,
                ("input", Some("radio")) => RegionRole::Radio,
                _ => RegionRole::from_tag(&self.tag),
            });
        Region {
            id: self.id,
            label: self.label,
            role,
            bbox: BoundingBox {
                x: self.x,
                y: self.y,
                width: self.w,
                height: self.h,
            },
            confidence,
            href: self.href,
        }
    }
}

/// Scanner bound to one page surface.
pub struct RegionScanner {
    page: Arc<dyn PageOps>,
    regions: Mutex<HashMap<String, Region>>,
}

impl RegionScanner {
    pub fn new(page: Arc<dyn PageOps>) -> Self {
        Self {
            page,
            regions: Mutex::new(HashMap::new()),
        }
    }

    /// Attribute selector addressing a tagged element.
    pub fn selector_for(identity: &str) -> String {
        format!("[{}=\"{}\"]", IDENTITY_ATTR, identity)
    }

    /// Run a full scan cycle. `quick` skips the SPA retry (used for
    /// screenshot-only rescans after ACT so delays do not compound).
    pub async fn scan(&self, quick: bool) -> PageResult<Vec<Region>> {
        self.regions.lock().clear();

        let mut regions = self.scan_once().await?;

        if regions.is_empty() && !quick {
            let url = self.page.current_url().await.unwrap_or_default();
            if is_real_page(&url) {
                debug!(%url, "scan found nothing on a real page, waiting for SPA hydration");
                self.page.wait_for_network_idle(SPA_IDLE_CAP_MS).await?;
                tokio::time::sleep(SPA_SETTLE).await;
                regions = self.scan_once().await?;
            }
        }

        if regions.len() < POINTER_SWEEP_THRESHOLD {
            match self.pointer_sweep().await {
                Ok(extra) => regions.extend(extra),
                Err(err) => warn!(%err, "cursor:pointer sweep failed"),
            }
        }

        let mut map = self.regions.lock();
        for region in &regions {
            map.insert(region.id.clone(), region.clone());
        }
        Ok(regions)
    }

    async fn scan_once(&self) -> PageResult<Vec<Region>> {
        let value = self.page.eval(js::SCAN_JS).await?;
        Ok(parse_regions(&value)?
            .into_iter()
            .map(|raw| raw.into_region(1.0))
            .collect())
    }

    async fn pointer_sweep(&self) -> PageResult<Vec<Region>> {
        let value = self.page.eval(js::POINTER_SWEEP_JS).await?;
        Ok(parse_regions(&value)?
            .into_iter()
            .map(|raw| raw.into_region(0.7))
            .collect())
    }

    /// Region from the most recent scan, if the identity is known.
    pub fn region(&self, identity: &str) -> Option<Region> {
        self.regions.lock().get(identity).cloned()
    }

    pub fn regions(&self) -> Vec<Region> {
        self.regions.lock().values().cloned().collect()
    }

    /// Instant programmatic click on a tagged element.
    pub async fn click_region(&self, identity: &str) -> PageResult<()> {
        self.page
            .click_selector(&Self::selector_for(identity))
            .await
    }

    /// Cursor-physics click at the current center of a tagged element. The
    /// center is re-read at click time, so layout shifts between scan and
    /// act cannot land the cursor on a sibling.
    pub async fn click_region_at_point(&self, identity: &str) -> PageResult<()> {
        let value = self.page.eval(&js::center_of(identity)).await?;
        let raw = value.as_str().unwrap_or("null");
        let center: Option<Value> =
            serde_json::from_str(raw).map_err(|err| PageError::Io(err.to_string()))?;
        let center = center.ok_or_else(|| PageError::TargetNotFound(identity.to_string()))?;
        let x = center["x"].as_f64().unwrap_or(0.0);
        let y = center["y"].as_f64().unwrap_or(0.0);
        self.page.click_point(x, y).await
    }

    pub async fn fill_region(&self, identity: &str, value: &str) -> PageResult<()> {
        self.page
            .fill_selector(&Self::selector_for(identity), value)
            .await
    }

    pub async fn press_key_on_region(&self, identity: &str, key: &str) -> PageResult<()> {
        self.page
            .press_key(key, Some(&Self::selector_for(identity)))
            .await
    }

    pub async fn press_key(&self, key: &str) -> PageResult<()> {
        self.page.press_key(key, None).await
    }

    pub async fn scroll_region_into_view(&self, identity: &str) -> PageResult<()> {
        self.page
            .scroll_into_view(&Self::selector_for(identity))
            .await
    }
}

fn is_real_page(url: &str) -> bool {
    !url.is_empty() && url != "about:blank"
}

fn parse_regions(value: &Value) -> PageResult<Vec<RawRegion>> {
    let parsed: Vec<RawRegion> = match value {
        Value::String(raw) => {
            serde_json::from_str(raw).map_err(|err| PageError::Io(err.to_string()))?
        }
        Value::Array(_) => serde_json::from_value(value.clone())
            .map_err(|err| PageError::Io(err.to_string()))?,
        Value::Null => Vec::new(),
        other => return Err(PageError::Io(format!("unexpected scan payload: {other}"))),
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Scripted page: queued eval results, recorded interactions.
    struct FakePage {
        evals: Mutex<VecDeque<Value>>,
        calls: Mutex<Vec<String>>,
        url: String,
    }

    impl FakePage {
        fn new(url: &str, evals: Vec<Value>) -> Self {
            Self {
                evals: Mutex::new(evals.into()),
                calls: Mutex::new(Vec::new()),
                url: url.to_string(),
            }
        }
    }

    #[async_trait]
    impl PageOps for FakePage {
        async fn eval(&self, js: &str) -> PageResult<Value> {
            self.calls.lock().push(format!("eval:{}", &js[..24.min(js.len())]));
            Ok(self.evals.lock().pop_front().unwrap_or(Value::Null))
        }
        async fn current_url(&self) -> PageResult<String> {
            Ok(self.url.clone())
        }
        async fn title(&self) -> PageResult<String> {
            Ok("fake".into())
        }
        async fn visible_text(&self, _max_chars: usize) -> PageResult<String> {
            Ok(String::new())
        }
        async fn click_selector(&self, selector: &str) -> PageResult<()> {
            self.calls.lock().push(format!("click:{selector}"));
            Ok(())
        }
        async fn click_point(&self, x: f64, y: f64) -> PageResult<()> {
            self.calls.lock().push(format!("point:{x},{y}"));
            Ok(())
        }
        async fn fill_selector(&self, selector: &str, value: &str) -> PageResult<()> {
            self.calls.lock().push(format!("fill:{selector}={value}"));
            Ok(())
        }
        async fn press_key(&self, key: &str, selector: Option<&str>) -> PageResult<()> {
            self.calls
                .lock()
                .push(format!("key:{key}@{}", selector.unwrap_or("page")));
            Ok(())
        }
        async fn scroll_by(&self, _dx: f64, _dy: f64) -> PageResult<()> {
            Ok(())
        }
        async fn scroll_into_view(&self, selector: &str) -> PageResult<()> {
            self.calls.lock().push(format!("scrollto:{selector}"));
            Ok(())
        }
        async fn navigate(&self, _url: &str) -> PageResult<()> {
            Ok(())
        }
        async fn wait_for_network_idle(&self, _cap_ms: u64) -> PageResult<()> {
            self.calls.lock().push("idle".into());
            Ok(())
        }
        async fn wait_until(
            &self,
            _until: crate::ports::WaitUntil,
            _cap_ms: u64,
        ) -> PageResult<()> {
            Ok(())
        }
        async fn screenshot_png(&self) -> PageResult<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn raw(id: &str, label: &str, tag: &str) -> Value {
        json!({
            "id": id, "label": label, "tag": tag, "role": null, "type": null,
            "x": 10.0, "y": 20.0, "w": 100.0, "h": 30.0, "href": null
        })
    }

    #[tokio::test]
    async fn scan_parses_regions_and_roles() {
        let payload = json!([
            raw("element-0a0a0a0a", "Search", "input"),
            {"id": "element-0b0b0b0b", "label": "Go", "tag": "div", "role": "button",
             "type": null, "x": 1.0, "y": 2.0, "w": 50.0, "h": 20.0, "href": null},
            {"id": "element-0c0c0c0c", "label": "Agree", "tag": "input", "role": null,
             "type": "checkbox", "x": 1.0, "y": 2.0, "w": 20.0, "h": 20.0, "href": null},
        ]);
        // Main scan plus pointer sweep (fewer than five regions found).
        let page = Arc::new(FakePage::new(
            "https://example.com",
            vec![payload, json!([])],
        ));
        let scanner = RegionScanner::new(page);
        let regions = scanner.scan(false).await.unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].role, RegionRole::Input);
        assert_eq!(regions[1].role, RegionRole::Button);
        assert_eq!(regions[2].role, RegionRole::Checkbox);
        assert!(regions.iter().all(|r| (r.confidence - 1.0).abs() < 1e-9));
        assert!(scanner.region("element-0a0a0a0a").is_some());
    }

    #[tokio::test]
    async fn scan_clears_previous_map() {
        let page = Arc::new(FakePage::new(
            "https://example.com",
            vec![
                json!([raw("element-11111111", "One", "button")]),
                json!([]),
                json!([raw("element-22222222", "Two", "button")]),
                json!([]),
            ],
        ));
        let scanner = RegionScanner::new(page);
        scanner.scan(false).await.unwrap();
        assert!(scanner.region("element-11111111").is_some());
        scanner.scan(false).await.unwrap();
        assert!(scanner.region("element-11111111").is_none());
        assert!(scanner.region("element-22222222").is_some());
    }

    #[tokio::test]
    async fn pointer_sweep_regions_carry_lower_confidence() {
        let page = Arc::new(FakePage::new(
            "https://example.com",
            vec![
                json!([raw("element-11111111", "One", "button")]),
                json!([raw("element-33333333", "Card", "div")]),
            ],
        ));
        let scanner = RegionScanner::new(page);
        let regions = scanner.scan(false).await.unwrap();
        assert_eq!(regions.len(), 2);
        let card = regions.iter().find(|r| r.id == "element-33333333").unwrap();
        assert!((card.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_scan_on_real_page_retries_once_after_idle() {
        let page = Arc::new(FakePage::new(
            "https://spa.example.com/app",
            vec![
                json!([]),
                json!([raw("element-44444444", "Loaded", "button")]),
                json!([]),
            ],
        ));
        let scanner = RegionScanner::new(Arc::clone(&page) as Arc<dyn PageOps>);
        tokio::time::pause();
        let handle = tokio::spawn(async move { scanner.scan(false).await });
        tokio::time::advance(SPA_SETTLE).await;
        let regions = handle.await.unwrap().unwrap();
        assert_eq!(regions.len(), 1);
        assert!(page.calls.lock().iter().any(|c| c == "idle"));
    }

    #[tokio::test]
    async fn quick_scan_never_retries() {
        let page = Arc::new(FakePage::new(
            "https://spa.example.com/app",
            vec![json!([]), json!([])],
        ));
        let scanner = RegionScanner::new(Arc::clone(&page) as Arc<dyn PageOps>);
        let regions = scanner.scan(true).await.unwrap();
        assert!(regions.is_empty());
        assert!(!page.calls.lock().iter().any(|c| c == "idle"));
    }

    #[tokio::test]
    async fn region_actions_address_by_identity_attribute() {
        let page = Arc::new(FakePage::new(
            "https://example.com",
            vec![
                json!([raw("element-55555555", "Search", "input")]),
                json!([]),
                json!({"x": 60.0, "y": 35.0}).to_string().into(),
            ],
        ));
        let scanner = RegionScanner::new(Arc::clone(&page) as Arc<dyn PageOps>);
        scanner.scan(false).await.unwrap();
        scanner.fill_region("element-55555555", "hello").await.unwrap();
        scanner.click_region_at_point("element-55555555").await.unwrap();
        let calls = page.calls.lock().clone();
        assert!(calls
            .iter()
            .any(|c| c == "fill:[data-webpilot-id=\"element-55555555\"]=hello"));
        assert!(calls.iter().any(|c| c == "point:60,35"));
    }
}
