//! Environment-first configuration with sane defaults. Every knob can be
//! overridden with a `WEBPILOT_*` variable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use webpilot_agent_core::DEFAULT_CONFIRM_KEYWORDS;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub start_url: String,
    /// Empty means every domain is allowed.
    pub allowed_domains: Vec<String>,
    pub confirm_keywords: Vec<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub llm_api_key: Option<String>,
    pub llm_base_url: String,
    pub llm_model: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_url: "https://www.google.com".to_string(),
            allowed_domains: Vec::new(),
            confirm_keywords: DEFAULT_CONFIRM_KEYWORDS
                .iter()
                .map(|kw| kw.to_string())
                .collect(),
            headless: true,
            viewport_width: 1_280,
            viewport_height: 800,
            llm_api_key: None,
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_model: "gpt-4o".to_string(),
            port: 8_700,
            db_path: PathBuf::from("webpilot.db"),
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolution against an arbitrary lookup, so tests stay hermetic.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup("WEBPILOT_START_URL") {
            config.start_url = value;
        }
        if let Some(value) = lookup("WEBPILOT_ALLOWED_DOMAINS") {
            config.allowed_domains = split_list(&value);
        }
        if let Some(value) = lookup("WEBPILOT_CONFIRM_KEYWORDS") {
            config.confirm_keywords = split_list(&value);
        }
        if let Some(value) = lookup("WEBPILOT_HEADLESS") {
            config.headless = parse_bool(&value).unwrap_or(config.headless);
        }
        if let Some(value) = lookup("WEBPILOT_VIEWPORT_WIDTH") {
            config.viewport_width = value.parse().unwrap_or(config.viewport_width);
        }
        if let Some(value) = lookup("WEBPILOT_VIEWPORT_HEIGHT") {
            config.viewport_height = value.parse().unwrap_or(config.viewport_height);
        }
        if let Some(value) = lookup("WEBPILOT_LLM_API_KEY") {
            if !value.trim().is_empty() {
                config.llm_api_key = Some(value);
            }
        }
        if let Some(value) = lookup("WEBPILOT_LLM_BASE_URL") {
            config.llm_base_url = value;
        }
        if let Some(value) = lookup("WEBPILOT_LLM_MODEL") {
            config.llm_model = value;
        }
        if let Some(value) = lookup("WEBPILOT_PORT") {
            config.port = value.parse().unwrap_or(config.port);
        }
        if let Some(value) = lookup("WEBPILOT_DB_PATH") {
            config.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("WEBPILOT_ARTIFACTS_DIR") {
            config.artifacts_dir = PathBuf::from(value);
        }
        config
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
