//! Deterministic post-processing merge over completed agent results.
//!
//! The merge never trusts agent output blindly: the safety verdict is
//! recomputed independently over the effective text and overwrites the
//! safety agent's emitted fields. Evidence spans are unioned across all
//! agents that produce them, deduplicated by identical (start, end)
//! offsets in first-seen order. The pass is idempotent: running it twice
//! over the same result set yields the same report.

use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::orchestration::types::{AgentResult, Span};

/// Agent whose non-empty `normalized` output replaces the input text.
const NORMALIZE_AGENT: &str = "normalize";

/// Agent whose emitted fields are overwritten by the recomputation.
const SAFETY_AGENT: &str = "safety";

/// The merged report produced by the pass.
#[derive(Debug, Clone)]
pub struct MergedReport {
    /// Effective text: normalized when the normalization agent succeeded.
    pub text: String,
    /// Deduplicated union of evidence spans.
    pub spans: Vec<Span>,
    /// The result set, with the safety agent's output overwritten.
    pub results: Vec<AgentResult>,
}

fn safety_patterns() -> &'static Vec<(&'static str, Regex)> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let rows = [
            (
                "threat",
                r"\b(i('| wi)ll (hurt|kill|ruin|destroy)|you('| wi)ll (regret|pay))\b",
            ),
            (
                "self_harm",
                r"\b(hurt myself|end it all|kill myself|no reason to live)\b",
            ),
            (
                "abuse",
                r"\b(worthless|pathetic excuse|you always ruin)\b",
            ),
        ];
        rows.iter()
            .filter_map(|(label, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|re| (*label, re))
            })
            .collect()
    })
}

/// Independent safety re-scan over the effective text.
///
/// Returns the recomputed verdict object and the spans of every match.
pub fn recompute_safety(text: &str) -> (Value, Vec<Span>) {
    let mut flags: Vec<&str> = Vec::new();
    let mut spans = Vec::new();
    for (label, pattern) in safety_patterns() {
        let mut matched = false;
        for found in pattern.find_iter(text) {
            matched = true;
            spans.push(Span::labeled(found.start(), found.end(), label));
        }
        if matched {
            flags.push(label);
        }
    }

    let risk_level = if flags.iter().any(|f| *f == "threat" || *f == "self_harm") {
        "high"
    } else if !flags.is_empty() {
        "elevated"
    } else {
        "none"
    };

    let verdict = json!({
        "risk_level": risk_level,
        "flags": flags,
        "spans": spans.clone(),
        "recomputed": true,
    });
    (verdict, spans)
}

/// Run the merge pass over one request's completed results.
pub fn post_process(input_text: &str, mut results: Vec<AgentResult>) -> MergedReport {
    let text = adopt_normalized(input_text, &results);

    // Recompute the safety verdict and overwrite the safety agent's
    // emitted fields with it.
    let (verdict, _) = recompute_safety(&text);
    if let Some(result) = results.iter_mut().find(|r| r.agent == SAFETY_AGENT) {
        result.output = verdict;
    }

    let mut spans = union_spans(&results);
    if spans.is_empty() {
        // Synthesized fallback: one span covering the whole input.
        spans.push(Span::labeled(0, text.len(), "input"));
    }

    MergedReport {
        text,
        spans,
        results,
    }
}

fn adopt_normalized(input_text: &str, results: &[AgentResult]) -> String {
    results
        .iter()
        .find(|r| r.agent == NORMALIZE_AGENT && r.is_success())
        .and_then(|r| r.output.get("normalized"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| input_text.to_string())
}

/// Union of every agent's `spans` list, deduplicated by identical
/// (start, end) offsets. First occurrence wins, order is stable.
fn union_spans(results: &[AgentResult]) -> Vec<Span> {
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    let mut union = Vec::new();
    for result in results {
        for span in spans_from_value(&result.output) {
            if seen.insert((span.start, span.end)) {
                union.push(span);
            }
        }
    }
    union
}

fn spans_from_value(output: &Value) -> Vec<Span> {
    let Some(items) = output.get("spans").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let start = item.get("start").and_then(Value::as_u64)? as usize;
            let end = item.get("end").and_then(Value::as_u64)? as usize;
            if end < start {
                return None;
            }
            let label = item
                .get("label")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(Span { start, end, label })
        })
        .collect()
}
