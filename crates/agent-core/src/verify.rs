//! Post-action sanity check. Produces a human-readable observation for
//! logs; it never gates continuation, the captured outcome does.

use std::sync::Arc;

use webpilot_page_scanner::PageOps;

use crate::action::Action;

/// Describe what the page looks like after `action`. A destroyed execution
/// context is the normal signature of a navigating click; the message says
/// so and the next observation re-reads state.
pub async fn verify(page: &Arc<dyn PageOps>, action: &Action) -> String {
    let url = match page.current_url().await {
        Ok(url) => url,
        Err(err) if err.is_context_destroyed() => {
            return format!(
                "{} triggered a navigation; state will be re-read on the next observation",
                action.kind()
            );
        }
        Err(err) => return format!("could not verify {}: {err}", action.kind()),
    };
    match page.title().await {
        Ok(title) if !title.is_empty() => {
            format!("after {}: \"{title}\" at {url}", action.kind())
        }
        _ => format!("after {}: {url}", action.kind()),
    }
}
