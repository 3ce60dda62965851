pub mod bridge;
pub mod config;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod telemetry;
pub mod util;

pub use error::{Error, Result};
pub use orchestration::{Orchestrator, OrchestratorResult, RunContext, RunId, RunInput};
