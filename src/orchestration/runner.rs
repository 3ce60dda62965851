//! The agent orchestrator: one request in, one consolidated report out.
//!
//! Per-request state machine:
//!
//! `START → EMPTY_CHECK → MOOD_CHECK → (SAFETY_BLOCK | FASTPATH |
//! FULL_FANOUT) → POST_PROCESS → MEMORY_INGEST → DONE`
//!
//! `run_all_agents` is infallible at the boundary: every failure mode is
//! represented inside the returned structure, nothing below it escapes
//! as an unhandled fault. The safety short-circuit is unconditional; it
//! takes precedence over fast-path matchability and budget state.

use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::bridge::BridgePool;
use crate::orchestration::agents::AgentSpec;
use crate::orchestration::budget::BudgetGate;
use crate::orchestration::fastpath::{FastPath, FASTPATH_EST_USD};
use crate::orchestration::memory::{InteractionRecord, MemoryStore, NoopMemory};
use crate::orchestration::merge;
use crate::orchestration::mood::{MoodGate, MoodOutcome};
use crate::orchestration::types::{
    AgentResult, AgentStatus, CostInfo, OrchestratorResult, RoutingInfo, RunContext, RunInput,
    Tier,
};
use crate::telemetry::{now_iso, RouterLogEntry, Telemetry};
use crate::{tlog_debug, tlog_warn};

/// The one agent with an override in the merge logic: an explicit
/// consent flag on the request substitutes for a failed consent check.
const CONSENT_AGENT: &str = "consent";

/// Converts one incoming request into a consolidated report.
pub struct Orchestrator {
    mood: MoodGate,
    fastpath: FastPath,
    budget: BudgetGate,
    agents: Vec<AgentSpec>,
    telemetry: Arc<Telemetry>,
    memory: Arc<dyn MemoryStore>,
}

impl Orchestrator {
    /// Wire the orchestrator from its collaborators.
    ///
    /// The pool and telemetry sink are injected; lifecycle belongs to
    /// the service bootstrap, not to a process-wide singleton.
    pub fn new(
        pool: Arc<BridgePool>,
        agents: Vec<AgentSpec>,
        budget: BudgetGate,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            mood: MoodGate::new(pool),
            fastpath: FastPath::with_defaults(),
            budget,
            agents,
            telemetry,
            memory: Arc::new(NoopMemory),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_fastpath(mut self, table: FastPath) -> Self {
        self.fastpath = table;
        self
    }

    pub fn with_mood_gate(mut self, mood: MoodGate) -> Self {
        self.mood = mood;
        self
    }

    /// Number of agents on the full fan-out roster.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Run one request to completion. Never fails, never panics.
    pub async fn run_all_agents(&self, input: RunInput, ctx: RunContext) -> OrchestratorResult {
        // EMPTY_CHECK: blank input terminates immediately.
        if input.text.trim().is_empty() {
            return self.short_circuit(
                &input,
                &ctx,
                Vec::new(),
                RoutingInfo {
                    tier: Tier::Empty,
                    fastpath: false,
                    fastpath_pattern: None,
                    model: None,
                    reason: Some("empty_input".to_string()),
                    confidence: None,
                },
                CostInfo::blocked("empty_input"),
            );
        }

        // MOOD_CHECK: the safety short-circuit precedes everything,
        // including the fast path and the budget gate.
        let mood = self.mood.check(&input.text, ctx.language.as_deref()).await;
        if self.mood.is_red(&mood) {
            let confidence = match &mood {
                MoodOutcome::Classified(result) => Some(result.confidence),
                _ => None,
            };
            tlog_debug!("run {}: safety short-circuit", ctx.run_id.short());
            return self.short_circuit(
                &input,
                &ctx,
                Vec::new(),
                RoutingInfo {
                    tier: Tier::SafetyPath,
                    fastpath: false,
                    fastpath_pattern: None,
                    model: None,
                    reason: Some("emotion_red".to_string()),
                    confidence,
                },
                CostInfo::blocked("emotion_red"),
            );
        }

        // FASTPATH: trivial intents skip the paid fan-out entirely.
        if let Some(hit) = self.fastpath.matches(&input.text) {
            let agent = AgentResult::success(
                "fastpath",
                "1.0.0",
                json!({"reply": hit.reply, "pattern": hit.name}),
                0,
            );
            return self.short_circuit(
                &input,
                &ctx,
                vec![agent],
                RoutingInfo {
                    tier: Tier::Fastpath,
                    fastpath: true,
                    fastpath_pattern: Some(hit.name.clone()),
                    model: None,
                    reason: None,
                    confidence: mood_confidence(&mood),
                },
                CostInfo::estimated(FASTPATH_EST_USD),
            );
        }

        // Admission control decides the tier before committing to the
        // expensive path; a degraded tier is recorded, not an error.
        let admission = self.budget.admit(&input.text);

        // FULL_FANOUT: every agent runs concurrently as an independent
        // one-shot job; the join barrier waits for all of them.
        let base = build_payload(&input, &ctx);
        let jobs = self.agents.iter().map(|agent| {
            let payload = payload_for_agent(&base, agent);
            async move { agent.run(&payload).await }
        });
        let mut results = join_all(jobs).await;
        apply_consent_override(&mut results, &input);

        // POST_PROCESS: deterministic merge, then sequential enrichment.
        let merged = merge::post_process(&input.text, results);
        let persona_hints = match self.memory.persona_hints(&input.participants).await {
            Ok(hints) => hints,
            Err(e) => {
                tlog_warn!("persona hint lookup failed: {}", e);
                Vec::new()
            }
        };

        let success_count = merged.results.iter().filter(|r| r.is_success()).count();
        let error_count = merged
            .results
            .iter()
            .filter(|r| r.status == AgentStatus::Error)
            .count();

        let routing = RoutingInfo {
            tier: admission.tier,
            fastpath: false,
            fastpath_pattern: None,
            model: Some(model_for(admission.tier).to_string()),
            reason: admission.reason.clone().or_else(|| mood_note(&mood)),
            confidence: mood_confidence(&mood),
        };
        let cost = CostInfo {
            est_usd: admission.est_usd,
            blocked: false,
            reason: admission.reason,
        };
        self.write_audit(&input, &ctx, &routing, &cost);

        let result = OrchestratorResult {
            run_id: ctx.run_id,
            agents: merged.results,
            routing,
            cost,
            success_count,
            error_count,
            text: merged.text,
            spans: merged.spans,
            persona_hints,
        };

        // MEMORY_INGEST: best-effort, failures logged and swallowed.
        let record = InteractionRecord {
            run_id: ctx.run_id.to_string(),
            ts: ctx.timestamp.to_rfc3339(),
            text: result.text.clone(),
            participants: input.participants.clone(),
            tier: result.routing.tier.as_str().to_string(),
        };
        if let Err(e) = self.memory.ingest(record).await {
            tlog_warn!("memory ingest failed: {}", e);
        }

        result
    }

    /// Terminal routing decision: build the result, write the audit
    /// entry, return without running the fan-out.
    fn short_circuit(
        &self,
        input: &RunInput,
        ctx: &RunContext,
        agents: Vec<AgentResult>,
        routing: RoutingInfo,
        cost: CostInfo,
    ) -> OrchestratorResult {
        self.write_audit(input, ctx, &routing, &cost);
        let success_count = agents.iter().filter(|r| r.is_success()).count();
        let error_count = agents
            .iter()
            .filter(|r| r.status == AgentStatus::Error)
            .count();
        OrchestratorResult {
            run_id: ctx.run_id,
            agents,
            routing,
            cost,
            success_count,
            error_count,
            text: input.text.clone(),
            spans: Vec::new(),
            persona_hints: Vec::new(),
        }
    }

    /// One audit entry per request, on every path.
    fn write_audit(
        &self,
        input: &RunInput,
        ctx: &RunContext,
        routing: &RoutingInfo,
        cost: &CostInfo,
    ) {
        let entry = RouterLogEntry {
            run_id: ctx.run_id.to_string(),
            ts: now_iso(),
            tier: routing.tier.as_str().to_string(),
            model: routing.model.clone(),
            fastpath: routing.fastpath,
            fastpath_pattern: routing.fastpath_pattern.clone(),
            est_usd: cost.est_usd,
            confidence: routing.confidence,
            reason: routing.reason.clone().or_else(|| cost.reason.clone()),
            input_len: input.text.chars().count(),
            language: ctx.language.clone(),
        };
        self.telemetry.log(&entry);
    }
}

/// The shared fan-out payload: `data.*` from the request, `meta.*` from
/// the context. Agents receive it verbatim plus their own version.
fn build_payload(input: &RunInput, ctx: &RunContext) -> Value {
    json!({
        "data": {
            "text": input.text,
            "participants": input.participants,
            "language": ctx.language,
            "consent": input.consent,
        },
        "meta": {
            "run_id": ctx.run_id.to_string(),
            "ts": ctx.timestamp.to_rfc3339(),
        },
    })
}

fn payload_for_agent(base: &Value, agent: &AgentSpec) -> Value {
    let mut payload = base.clone();
    if let Some(meta) = payload.get_mut("meta") {
        meta["agent_version"] = json!(agent.version);
    }
    payload
}

/// The consent override: a failed consent agent counts as a success when
/// the request already carried an explicit consent flag. This is the
/// only agent-specific special case in the merge logic.
fn apply_consent_override(results: &mut [AgentResult], input: &RunInput) {
    if input.consent != Some(true) {
        return;
    }
    if let Some(result) = results
        .iter_mut()
        .find(|r| r.agent == CONSENT_AGENT && r.status == AgentStatus::Error)
    {
        let version = result.version.clone();
        let latency_ms = result.latency_ms;
        *result = AgentResult::success(
            CONSENT_AGENT,
            &version,
            json!({"consent": "explicit", "source": "request_flag"}),
            latency_ms,
        );
    }
}

fn mood_confidence(mood: &MoodOutcome) -> Option<f64> {
    match mood {
        MoodOutcome::Classified(result) => Some(result.confidence),
        _ => None,
    }
}

fn mood_note(mood: &MoodOutcome) -> Option<String> {
    match mood {
        MoodOutcome::Classified(_) => None,
        MoodOutcome::Degraded(reason) => Some(format!("mood_degraded: {}", reason)),
        MoodOutcome::Unavailable => Some("mood_unavailable".to_string()),
    }
}

fn model_for(tier: Tier) -> &'static str {
    match tier {
        Tier::Base => "analysis-base",
        Tier::Mid => "analysis-mid",
        Tier::Top => "analysis-top",
        // Short-circuit tiers never reach a model.
        Tier::Empty | Tier::SafetyPath | Tier::Fastpath => "none",
    }
}
