//! Mood/risk classification gate.
//!
//! The orchestrator's first routing decision rides on the low-latency
//! mood classifier reached through the bridge pool. Classifier output is
//! parsed into the strict [`MoodOutcome`] union: a call either yields a
//! typed classification, arrives malformed (`Degraded`), or never gets a
//! real reply at all (`Unavailable`). Routing code matches on the union
//! instead of probing optional fields.

use serde_json::{json, Value};
use std::sync::Arc;

use crate::bridge::BridgePool;
use crate::tlog_debug;

/// Default confidence floor for the safety short-circuit.
pub const DEFAULT_RED_CONFIDENCE_FLOOR: f64 = 0.85;

/// Classifier mood level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoodLevel {
    Green,
    Yellow,
    Red,
}

impl MoodLevel {
    /// Map the classifier's level string. Unknown labels are a parse
    /// failure, not a guess.
    fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "green" | "calm" | "neutral" => Some(MoodLevel::Green),
            "yellow" | "elevated" => Some(MoodLevel::Yellow),
            "red" | "critical" => Some(MoodLevel::Red),
            _ => None,
        }
    }
}

/// A successful classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodResult {
    pub level: MoodLevel,
    pub confidence: f64,
}

/// Outcome of one classifier call.
#[derive(Debug, Clone, PartialEq)]
pub enum MoodOutcome {
    /// A well-formed classification arrived.
    Classified(MoodResult),
    /// A reply arrived but could not be parsed into a classification.
    Degraded(String),
    /// The bridge could not serve the call (breaker open, timeout,
    /// crash, unwritable stream).
    Unavailable,
}

/// Gate over the bridge pool for the mood classifier endpoint.
pub struct MoodGate {
    pool: Arc<BridgePool>,
    red_confidence_floor: f64,
}

impl MoodGate {
    pub fn new(pool: Arc<BridgePool>) -> Self {
        Self {
            pool,
            red_confidence_floor: DEFAULT_RED_CONFIDENCE_FLOOR,
        }
    }

    pub fn with_red_confidence_floor(mut self, floor: f64) -> Self {
        self.red_confidence_floor = floor;
        self
    }

    /// Classify one input with a short budget.
    pub async fn check(&self, text: &str, language: Option<&str>) -> MoodOutcome {
        let request = json!({
            "task": "classify_mood",
            "text": text,
            "lang": language,
        });
        let reply = self.pool.call(&request).await;
        if let Some(reason) = reply.fallback {
            tlog_debug!("mood check unavailable: {:?}", reason);
            return MoodOutcome::Unavailable;
        }
        Self::parse_reply(&reply.payload)
    }

    /// True iff the outcome demands the unconditional safety short-circuit.
    pub fn is_red(&self, outcome: &MoodOutcome) -> bool {
        match outcome {
            MoodOutcome::Classified(result) => {
                result.level == MoodLevel::Red && result.confidence >= self.red_confidence_floor
            }
            _ => false,
        }
    }

    fn parse_reply(payload: &Value) -> MoodOutcome {
        let label = payload
            .get("level")
            .or_else(|| payload.get("label"))
            .and_then(Value::as_str);
        let confidence = payload.get("confidence").and_then(Value::as_f64);

        match (label.and_then(MoodLevel::parse), confidence) {
            (Some(level), Some(confidence)) if (0.0..=1.0).contains(&confidence) => {
                MoodOutcome::Classified(MoodResult { level, confidence })
            }
            _ => MoodOutcome::Degraded("malformed classifier reply".to_string()),
        }
    }
}
