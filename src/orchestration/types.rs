//! Core orchestration type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique identifier for one orchestrated request.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Routing tier taken for one request.
///
/// The short-circuit tiers (`Empty`, `SafetyPath`, `Fastpath`) terminate
/// before the fan-out; the model tiers (`Base`, `Mid`, `Top`) are decided
/// by the budget gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Empty,
    SafetyPath,
    Fastpath,
    Base,
    Mid,
    Top,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Empty => "empty",
            Tier::SafetyPath => "safety_path",
            Tier::Fastpath => "fastpath",
            Tier::Base => "base",
            Tier::Mid => "mid",
            Tier::Top => "top",
        }
    }

    /// True for the tiers that run the full agent fan-out.
    pub fn is_fanout(&self) -> bool {
        matches!(self, Tier::Base | Tier::Mid | Tier::Top)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of one agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Success,
    Error,
    Skipped,
}

/// Outcome of one analysis agent invocation. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// Agent identifier (e.g. "safety", "consent", "normalize").
    pub agent: String,
    /// Semantic version of the agent.
    pub version: String,
    pub status: AgentStatus,
    /// Agent-defined output payload.
    #[serde(default)]
    pub output: Value,
    /// Error message when `status` is `Error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub latency_ms: u64,
}

impl AgentResult {
    pub fn success(agent: &str, version: &str, output: Value, latency_ms: u64) -> Self {
        Self {
            agent: agent.to_string(),
            version: version.to_string(),
            status: AgentStatus::Success,
            output,
            error: None,
            latency_ms,
        }
    }

    pub fn error(agent: &str, version: &str, message: String, latency_ms: u64) -> Self {
        Self {
            agent: agent.to_string(),
            version: version.to_string(),
            status: AgentStatus::Error,
            output: Value::Null,
            error: Some(message),
            latency_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// An evidence span: a (start, end) offset range into the input text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            label: None,
        }
    }

    pub fn labeled(start: usize, end: usize, label: &str) -> Self {
        Self {
            start,
            end,
            label: Some(label.to_string()),
        }
    }
}

/// Routing metadata recorded for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub tier: Tier,
    pub fastpath: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fastpath_pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Cost record for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostInfo {
    pub est_usd: f64,
    /// True when a policy short-circuit blocked the paid path.
    pub blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CostInfo {
    pub fn blocked(reason: &str) -> Self {
        Self {
            est_usd: 0.0,
            blocked: true,
            reason: Some(reason.to_string()),
        }
    }

    pub fn estimated(est_usd: f64) -> Self {
        Self {
            est_usd,
            blocked: false,
            reason: None,
        }
    }
}

/// The consolidated report for one request.
///
/// On the full fan-out path `success_count + error_count == agents.len()`;
/// on a short-circuit path `agents` is a singleton or empty and
/// `routing` records which short-circuit fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub run_id: RunId,
    pub agents: Vec<AgentResult>,
    pub routing: RoutingInfo,
    pub cost: CostInfo,
    pub success_count: usize,
    pub error_count: usize,
    /// Effective input text after the merge pass (normalized when the
    /// normalization agent succeeded).
    pub text: String,
    /// Deduplicated union of evidence spans.
    pub spans: Vec<Span>,
    /// Persona hints fetched during sequential enrichment.
    pub persona_hints: Vec<String>,
}

/// One incoming analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInput {
    pub text: String,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Explicit consent flag supplied with the request, when present.
    pub consent: Option<bool>,
}

/// Per-request context supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    pub language: Option<String>,
}

impl RunContext {
    /// Fresh context with a new run id and the current time.
    pub fn generate(language: Option<String>) -> Self {
        Self {
            run_id: RunId::new(),
            timestamp: Utc::now(),
            language,
        }
    }
}
