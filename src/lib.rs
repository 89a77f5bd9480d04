//! Webpilot: drives a real browser through natural-language tasks via a
//! plan-then-act loop, streaming progress to an observing client.

pub mod browser;
pub mod channel;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod screenshots;
pub mod server;
pub mod storage;

pub use config::Config;
pub use orchestrator::Orchestrator;
