//! Tunables for the per-objective loop.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Hard cap of iterations per objective.
    pub max_steps: u32,
    /// Auto-scroll attempts per URL before the gate gives up.
    pub scroll_cap: u32,
    /// Pixels per auto-scroll.
    pub scroll_step_px: f64,
    /// Network-idle budget after an action; noisy sites never truly idle,
    /// so this is a strict upper bound.
    pub settle_cap_ms: u64,
    /// Raw text characters sampled for before/after snapshots.
    pub snapshot_text_chars: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            scroll_cap: 5,
            scroll_step_px: 600.0,
            settle_cap_ms: 1_500,
            snapshot_text_chars: 800,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_caps() {
        let config = AgentLoopConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.scroll_cap, 5);
        assert!((config.scroll_step_px - 600.0).abs() < 1e-9);
    }
}
