//! Fan-out correctness tests: isolation, join barrier, merge pass.

use std::time::Instant;

use serde_json::json;
use triage::config::AgentConfig;
use triage::orchestration::{AgentStatus, RunInput, Span, Tier};

use crate::fixtures::{failing_agent, green_classifier, ok_agent, OrchestratorHarness};

fn consent_input(consent: Option<bool>) -> RunInput {
    RunInput {
        text: "a long enough disagreement about the holiday schedule".to_string(),
        participants: vec!["alex".to_string(), "sam".to_string()],
        consent,
    }
}

/// Test: 30 agents, 3 forced failures
/// Given a roster of 30 agents where exactly 3 fail
/// When the full path runs
/// Then success_count == 27, error_count == 3, agents.len() == 30
#[tokio::test]
async fn test_thirty_agents_three_failures() {
    let mut agents: Vec<AgentConfig> = (0..27)
        .map(|i| ok_agent(&format!("agent-{:02}", i), "{}"))
        .collect();
    agents.push(failing_agent("agent-27"));
    agents.push(failing_agent("agent-28"));
    agents.push(failing_agent("agent-29"));

    let harness = OrchestratorHarness::new(green_classifier(), agents);
    let result = harness.run("run the whole roster on this exchange").await;

    assert_eq!(result.agents.len(), 30);
    assert_eq!(result.success_count, 27);
    assert_eq!(result.error_count, 3);
    assert_eq!(result.routing.tier, Tier::Base);
    harness.pool.shutdown();
}

/// Test: fan-out isolation
/// Given one agent forced to fail among healthy ones
/// When the full path runs
/// Then the other agents' status and output are unchanged
#[tokio::test]
async fn test_failure_is_isolated() {
    let harness = OrchestratorHarness::new(
        green_classifier(),
        vec![
            ok_agent("tone", r#"{"summary":"tense"}"#),
            failing_agent("spans"),
            ok_agent("summary", r#"{"summary":"scheduling dispute"}"#),
        ],
    );

    let result = harness.run("the disagreement keeps going in circles").await;
    let by_name = |name: &str| {
        result
            .agents
            .iter()
            .find(|r| r.agent == name)
            .expect("agent present")
    };

    assert_eq!(by_name("tone").status, AgentStatus::Success);
    assert_eq!(by_name("tone").output["summary"], "tense");
    assert_eq!(by_name("spans").status, AgentStatus::Error);
    assert_eq!(by_name("spans").error.as_deref(), Some("forced failure"));
    assert_eq!(by_name("summary").status, AgentStatus::Success);
    harness.pool.shutdown();
}

/// Test: the fan-out is a join barrier, not a race
/// Given one slow agent among fast ones
/// When the full path runs
/// Then the result contains every agent, including the slow one
#[tokio::test]
async fn test_join_waits_for_slowest_agent() {
    let slow = AgentConfig {
        name: "slow".to_string(),
        version: "1.0.0".to_string(),
        command: "sh".to_string(),
        args: vec![
            "-c".to_string(),
            r#"cat > /dev/null; sleep 0.3; echo '{"late":true}'"#.to_string(),
        ],
        timeout_ms: 5_000,
    };
    let harness = OrchestratorHarness::new(
        green_classifier(),
        vec![ok_agent("fast", "{}"), slow],
    );

    let started = Instant::now();
    let result = harness.run("wait for everyone before merging").await;
    assert!(started.elapsed().as_millis() >= 300);
    assert_eq!(result.agents.len(), 2);

    let slow = result.agents.iter().find(|r| r.agent == "slow").unwrap();
    assert_eq!(slow.status, AgentStatus::Success);
    assert!(slow.latency_ms >= 300);
    harness.pool.shutdown();
}

/// Test: consent override
/// Given a failing consent agent and an explicit consent flag
/// When the full path runs
/// Then the consent result is synthesized as a success
#[tokio::test]
async fn test_consent_override_with_flag() {
    let harness =
        OrchestratorHarness::new(green_classifier(), vec![failing_agent("consent")]);

    let result = harness.run_input(consent_input(Some(true))).await;
    assert_eq!(result.success_count, 1);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.agents[0].output["consent"], "explicit");
    harness.pool.shutdown();
}

/// Test: consent override requires the flag
/// Given a failing consent agent and no consent flag
/// Then the failure stands
#[tokio::test]
async fn test_consent_failure_without_flag_stands() {
    let harness =
        OrchestratorHarness::new(green_classifier(), vec![failing_agent("consent")]);

    let result = harness.run_input(consent_input(None)).await;
    assert_eq!(result.error_count, 1);
    assert_eq!(result.agents[0].status, AgentStatus::Error);
    harness.pool.shutdown();
}

/// Test: merge adopts normalized text and unions spans
/// Given a normalization agent and two span producers with one duplicate
/// When the full path runs
/// Then the report carries the normalized text and a deduplicated union
#[tokio::test]
async fn test_merge_normalization_and_span_union() {
    let harness = OrchestratorHarness::new(
        green_classifier(),
        vec![
            ok_agent("normalize", r#"{"normalized":"We keep arguing about pickup times."}"#),
            ok_agent(
                "tone",
                r#"{"spans":[{"start":3,"end":7,"label":"tone"},{"start":12,"end":18}]}"#,
            ),
            ok_agent("escalation", r#"{"spans":[{"start":3,"end":7,"label":"dup"}]}"#),
        ],
    );

    let result = harness.run("we keep arguing about pickup times!!").await;
    assert_eq!(result.text, "We keep arguing about pickup times.");
    assert_eq!(result.spans.len(), 2);
    assert_eq!(result.spans[0].label.as_deref(), Some("tone"));
    assert_eq!(result.spans[1], Span::new(12, 18));
    harness.pool.shutdown();
}

/// Test: the recomputed safety verdict overwrites the agent's fields
/// Given a safety agent that reports no risk for a threatening input
/// When the merge pass runs
/// Then the emitted fields reflect the independent recomputation
#[tokio::test]
async fn test_safety_recomputation_overrides_agent() {
    let harness = OrchestratorHarness::new(
        green_classifier(),
        vec![ok_agent("safety", r#"{"risk_level":"none","flags":[]}"#)],
    );

    let result = harness
        .run("if you take the kids again I will ruin you")
        .await;
    let safety = result.agents.iter().find(|r| r.agent == "safety").unwrap();
    assert_eq!(safety.output["risk_level"], "high");
    assert_eq!(safety.output["recomputed"], true);
    assert_eq!(safety.output["flags"], json!(["threat"]));
    // The recomputed spans feed the union.
    assert!(result.spans.iter().any(|s| s.label.as_deref() == Some("threat")));
    harness.pool.shutdown();
}
