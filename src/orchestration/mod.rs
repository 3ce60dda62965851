//! Agent orchestration layer.
//!
//! This module converts one analysis request into a consolidated report:
//! the mood gate consults the classifier bridge, the fast path and the
//! budget gate decide admission, and the fan-out runs the full agent
//! roster concurrently before the deterministic merge pass.

mod agents;
mod budget;
mod fastpath;
mod memory;
mod merge;
mod mood;
mod runner;
mod types;

pub use agents::{build_roster, AgentSpec};
pub use budget::{estimate, Admission, BudgetGate, CostEstimate};
pub use fastpath::{FastPath, FastPattern, FASTPATH_EST_USD};
pub use memory::{InteractionRecord, MemoryStore, NoopMemory};
pub use merge::{post_process, recompute_safety, MergedReport};
pub use mood::{
    MoodGate, MoodLevel, MoodOutcome, MoodResult, DEFAULT_RED_CONFIDENCE_FLOOR,
};
pub use runner::Orchestrator;
pub use types::{
    AgentResult, AgentStatus, CostInfo, OrchestratorResult, RoutingInfo, RunContext, RunId,
    RunInput, Span, Tier,
};
