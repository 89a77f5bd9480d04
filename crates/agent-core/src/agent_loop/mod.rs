//! Per-objective observe/auto-recover/auto-scroll/decide/act/verify loop.

mod config;
mod controller;
mod types;

pub use config::AgentLoopConfig;
pub use controller::AgentLoop;
pub use types::{
    LoopState, NullSink, ObjectiveContext, ObjectiveOutcome, ScrollState, StepCounter, StepSink,
};
