//! Action executor: maps a validated action onto scanner/page operations.
//! Also used by the orchestrator to run a user-approved pending action.

use std::sync::Arc;
use std::time::Duration;

use webpilot_core_types::Region;
use webpilot_page_scanner::{PageError, PageOps, PageResult, RegionScanner, WaitUntil};

use crate::action::{Action, ScrollDirection, DEFAULT_SCROLL_PX};

/// Cap for load/domcontentloaded waits.
const NAV_WAIT_CAP_MS: u64 = 3_000;
/// Strict cap for network-idle waits.
const IDLE_WAIT_CAP_MS: u64 = 1_500;

pub async fn execute_action(
    page: &Arc<dyn PageOps>,
    scanner: &RegionScanner,
    action: &Action,
) -> PageResult<()> {
    match action {
        Action::VisionClick { region_id, .. } => scanner.click_region_at_point(region_id).await,
        Action::DomClick {
            region_id,
            role,
            name,
            selector,
            ..
        } => {
            if let Some(id) = region_id {
                scanner.click_region(id).await
            } else if let Some(selector) = selector {
                page.click_selector(selector).await
            } else {
                let target = resolve_role_name(scanner, role.as_deref(), name.as_deref())?;
                scanner.click_region(&target.id).await
            }
        }
        Action::VisionFill {
            region_id, value, ..
        } => {
            scanner.click_region_at_point(region_id).await?;
            scanner.fill_region(region_id, value).await
        }
        Action::DomFill {
            region_id,
            role,
            name,
            selector,
            value,
            ..
        } => {
            if let Some(id) = region_id {
                scanner.fill_region(id, value).await
            } else if let Some(selector) = selector {
                page.fill_selector(selector, value).await
            } else {
                let target = resolve_role_name(scanner, role.as_deref(), name.as_deref())?;
                scanner.fill_region(&target.id, value).await
            }
        }
        Action::KeyPress { key, region_id, .. } => match region_id {
            Some(id) => scanner.press_key_on_region(id, key).await,
            None => scanner.press_key(key).await,
        },
        Action::Scroll { direction, amount } => {
            let px = amount.unwrap_or(DEFAULT_SCROLL_PX);
            let dy = match direction {
                ScrollDirection::Down => px,
                ScrollDirection::Up => -px,
            };
            page.scroll_by(0.0, dy).await
        }
        Action::Wait { duration, until } => {
            if let Some(ms) = duration {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if let Some(until) = until {
                let cap = match until {
                    WaitUntil::Networkidle => IDLE_WAIT_CAP_MS,
                    _ => NAV_WAIT_CAP_MS,
                };
                page.wait_until(*until, cap).await?;
            }
            Ok(())
        }
        // Terminal actions never reach the executor; the loop exits first.
        Action::AskUser { .. } | Action::Confirm { .. } | Action::Done { .. } => Ok(()),
    }
}

fn resolve_role_name(
    scanner: &RegionScanner,
    role: Option<&str>,
    name: Option<&str>,
) -> PageResult<Region> {
    let (role, name) = match (role, name) {
        (Some(role), Some(name)) => (role.to_lowercase(), name.to_lowercase()),
        _ => {
            return Err(PageError::TargetNotFound(
                "DOM action without region, selector, or role+name".to_string(),
            ))
        }
    };
    scanner
        .regions()
        .into_iter()
        .find(|region| {
            region.role.as_str() == role && region.label.to_lowercase().contains(&name)
        })
        .ok_or_else(|| PageError::TargetNotFound(format!("no {role} region labeled \"{name}\"")))
}
