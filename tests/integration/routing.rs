//! Routing tier tests: short circuits, safety precedence, audit trail.

use triage::orchestration::{RunInput, Tier, FASTPATH_EST_USD};
use triage::telemetry::aggregate;

use crate::fixtures::{
    failing_agent, green_classifier, ok_agent, pool_config, red_classifier, silent_classifier,
    OrchestratorHarness,
};

/// Test: empty input short-circuit
/// Given a blank input
/// When the orchestrator runs
/// Then tier is "empty" with zero agents and a blocked cost record
#[tokio::test]
async fn test_empty_input_short_circuits() {
    let harness = OrchestratorHarness::new(green_classifier(), vec![ok_agent("tone", "{}")]);

    let result = harness.run("   ").await;
    assert_eq!(result.routing.tier, Tier::Empty);
    assert!(result.agents.is_empty());
    assert_eq!(result.success_count, 0);
    assert_eq!(result.error_count, 0);
    assert!(result.cost.blocked);
    assert_eq!(result.cost.reason.as_deref(), Some("empty_input"));
    harness.pool.shutdown();
}

/// Test: fast path serves trivial intents
/// Given a greeting and a non-red mood
/// When the orchestrator runs
/// Then a single synthetic agent result carries the canned reply at
/// near-zero cost
#[tokio::test]
async fn test_greeting_takes_fastpath() {
    let harness = OrchestratorHarness::new(green_classifier(), vec![ok_agent("tone", "{}")]);

    let result = harness.run("Hello!").await;
    assert_eq!(result.routing.tier, Tier::Fastpath);
    assert!(result.routing.fastpath);
    assert_eq!(result.routing.fastpath_pattern.as_deref(), Some("greeting"));
    assert_eq!(result.agents.len(), 1);
    assert_eq!(result.success_count, 1);
    assert!(result.agents[0].output["reply"].is_string());
    assert!((result.cost.est_usd - FASTPATH_EST_USD).abs() < 1e-9);
    harness.pool.shutdown();
}

/// Test: safety precedence
/// Given an input the classifier flags red with high confidence
/// When the input would also match the fast path
/// Then the safety short-circuit wins with zero fanned-out agents
#[tokio::test]
async fn test_safety_path_precedes_fastpath() {
    let harness = OrchestratorHarness::new(red_classifier(), vec![ok_agent("tone", "{}")]);

    let result = harness.run("Hello!").await;
    assert_eq!(result.routing.tier, Tier::SafetyPath);
    assert!(result.agents.is_empty());
    assert!(result.cost.blocked);
    assert_eq!(result.cost.reason.as_deref(), Some("emotion_red"));
    assert_eq!(result.routing.confidence, Some(0.97));
    harness.pool.shutdown();
}

/// Test: an unavailable classifier forfeits the short-circuit only
/// Given a classifier that never answers
/// When a normal request runs
/// Then the fan-out proceeds on a degraded mood signal
#[tokio::test]
async fn test_mood_unavailable_still_runs_fanout() {
    let mut pool = pool_config();
    pool.call_timeout_ms = 100;
    let harness = OrchestratorHarness::with_pool_config(
        silent_classifier(),
        pool,
        vec![ok_agent("tone", r#"{"summary":"calm"}"#)],
    );

    let result = harness.run("we need to sort out the pickup schedule").await;
    assert_eq!(result.routing.tier, Tier::Base);
    assert_eq!(result.success_count, 1);
    assert_eq!(
        result.routing.reason.as_deref(),
        Some("mood_unavailable")
    );
    harness.pool.shutdown();
}

/// Test: one audit entry per request, on every path
/// Given a mix of short-circuit and full-path requests
/// When the telemetry directory is aggregated offline
/// Then per-tier counts and the distribution line up
#[tokio::test]
async fn test_audit_trail_covers_every_path() {
    let harness = OrchestratorHarness::new(
        green_classifier(),
        vec![ok_agent("tone", "{}"), failing_agent("spans")],
    );

    harness.run("").await;
    harness.run("Hello!").await;
    harness.run("a normal message that runs the full roster").await;

    let report = aggregate(harness.telemetry_dir.path()).unwrap();
    assert_eq!(report.total_entries, 3);
    assert_eq!(report.per_tier["empty"].count, 1);
    assert_eq!(report.per_tier["fastpath"].count, 1);
    assert_eq!(report.per_tier["base"].count, 1);
    let pct_sum: f64 = report.per_tier.values().map(|t| t.pct).sum();
    assert!((pct_sum - 100.0).abs() < 1e-6);
    assert!(report.total_est_usd > 0.0);

    let stats = harness.telemetry.stats();
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.drops, 0);
    harness.pool.shutdown();
}

/// Test: fanout counts invariant
/// Given the full path with a mixed roster
/// Then success_count + error_count equals the roster size
#[tokio::test]
async fn test_fanout_counts_are_exhaustive() {
    let harness = OrchestratorHarness::new(
        green_classifier(),
        vec![
            ok_agent("tone", "{}"),
            failing_agent("spans"),
            ok_agent("summary", "{}"),
        ],
    );

    let result = harness
        .run_input(RunInput {
            text: "please analyse this exchange".to_string(),
            participants: vec!["alex".to_string()],
            consent: None,
        })
        .await;
    assert_eq!(result.agents.len(), 3);
    assert_eq!(result.success_count + result.error_count, 3);
    harness.pool.shutdown();
}
