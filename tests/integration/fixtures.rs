//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Fake classifier workers and analysis agents built from `/bin/sh`
//!   one-liners
//! - A harness bundling pool, telemetry sink, and orchestrator

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use triage::bridge::BridgePool;
use triage::config::{AgentConfig, BreakerConfig, BudgetConfig, PoolConfig, WorkerSpec};
use triage::orchestration::{
    build_roster, BudgetGate, Orchestrator, OrchestratorResult, RunContext, RunInput,
};
use triage::telemetry::Telemetry;

/// A worker spec running an inline shell script.
pub fn sh_spec(script: &str) -> WorkerSpec {
    WorkerSpec {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        working_dir: None,
    }
}

/// A classifier that answers every request line with a calm verdict.
pub fn green_classifier() -> WorkerSpec {
    sh_spec(r#"while read line; do echo '{"level":"green","confidence":0.95}'; done"#)
}

/// A classifier that reports a critical mood with high confidence.
pub fn red_classifier() -> WorkerSpec {
    sh_spec(r#"while read line; do echo '{"level":"red","confidence":0.97}'; done"#)
}

/// A classifier that never answers within any sane budget.
pub fn silent_classifier() -> WorkerSpec {
    sh_spec("sleep 600")
}

pub fn pool_config() -> PoolConfig {
    PoolConfig {
        size: 2,
        call_timeout_ms: 2_000,
        respawn_backoff_ms: 50,
        breaker: BreakerConfig {
            threshold: 5,
            reset_ms: 30_000,
        },
    }
}

pub fn neutral_fallback() -> Value {
    json!({"level": "green", "confidence": 0.0})
}

/// An agent whose job consumes its payload and emits the given JSON.
pub fn ok_agent(name: &str, output: &str) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            format!("cat > /dev/null; echo '{}'", output),
        ],
        timeout_ms: 5_000,
    }
}

/// An agent whose job always fails with a non-zero exit.
pub fn failing_agent(name: &str) -> AgentConfig {
    AgentConfig {
        name: name.to_string(),
        version: "1.0.0".to_string(),
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            "cat > /dev/null; echo 'forced failure' >&2; exit 1".to_string(),
        ],
        timeout_ms: 5_000,
    }
}

/// A harness bundling pool, telemetry sink, and orchestrator for one test.
pub struct OrchestratorHarness {
    pub telemetry_dir: TempDir,
    pub telemetry: Arc<Telemetry>,
    pub pool: Arc<BridgePool>,
    pub orchestrator: Orchestrator,
}

impl OrchestratorHarness {
    pub fn new(classifier: WorkerSpec, agents: Vec<AgentConfig>) -> Self {
        Self::build(classifier, pool_config(), agents, BudgetConfig::default())
    }

    pub fn with_pool_config(
        classifier: WorkerSpec,
        pool: PoolConfig,
        agents: Vec<AgentConfig>,
    ) -> Self {
        Self::build(classifier, pool, agents, BudgetConfig::default())
    }

    pub fn build(
        classifier: WorkerSpec,
        pool_config: PoolConfig,
        agents: Vec<AgentConfig>,
        budget: BudgetConfig,
    ) -> Self {
        let telemetry_dir = TempDir::new().expect("temp telemetry dir");
        let telemetry = Arc::new(Telemetry::new(telemetry_dir.path()));
        let pool = BridgePool::spawn(
            pool_config,
            classifier,
            Path::new("."),
            neutral_fallback(),
        )
        .expect("bridge pool");
        let roster = build_roster(&agents, Path::new(".")).expect("agent roster");
        let orchestrator = Orchestrator::new(
            Arc::clone(&pool),
            roster,
            BudgetGate::new(budget),
            Arc::clone(&telemetry),
        );
        Self {
            telemetry_dir,
            telemetry,
            pool,
            orchestrator,
        }
    }

    /// Run a request with default participants and no consent flag.
    pub async fn run(&self, text: &str) -> OrchestratorResult {
        self.run_input(RunInput {
            text: text.to_string(),
            participants: vec!["alex".to_string(), "sam".to_string()],
            consent: None,
        })
        .await
    }

    pub async fn run_input(&self, input: RunInput) -> OrchestratorResult {
        let ctx = RunContext::generate(Some("en".to_string()));
        self.orchestrator.run_all_agents(input, ctx).await
    }
}
