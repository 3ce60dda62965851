//! Analysis agent registry and one-shot job execution.
//!
//! Each analysis agent is an external executable spawned fresh per
//! request (never pooled: these are high-latency, high-variance jobs,
//! unlike the classifier). The job receives a single JSON payload on
//! stdin and must emit exactly one JSON object on stdout before exiting;
//! a non-zero exit code, unparsable output, or a timeout is an agent
//! failure, captured in the result rather than propagated.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::AgentConfig;
use crate::orchestration::types::AgentResult;
use crate::{tlog_trace, Result};

/// A resolved, runnable agent.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub name: String,
    pub version: String,
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl AgentSpec {
    /// Resolve an agent's executable once, at registry construction.
    pub fn from_config(config: &AgentConfig, base_dir: &Path) -> Result<Self> {
        let spec = crate::config::WorkerSpec {
            command: config.command.clone(),
            args: config.args.clone(),
            working_dir: None,
        };
        Ok(Self {
            name: config.name.clone(),
            version: config.version.clone(),
            program: spec.resolve(base_dir)?,
            args: config.args.clone(),
            timeout: config.timeout(),
        })
    }

    /// Build a spec directly, for tests and embedded rosters.
    pub fn new(name: &str, version: &str, program: PathBuf, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            program,
            args,
            timeout,
        }
    }

    /// Run one job against the shared payload.
    ///
    /// Always returns an `AgentResult`; every failure mode maps to
    /// `status: error` with a message and the observed latency.
    pub async fn run(&self, payload: &Value) -> AgentResult {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.execute(payload)).await {
            Ok(Ok(output)) => AgentResult::success(
                &self.name,
                &self.version,
                output,
                crate::util::elapsed_ms(started),
            ),
            Ok(Err(message)) => AgentResult::error(
                &self.name,
                &self.version,
                message,
                crate::util::elapsed_ms(started),
            ),
            // Dropping the in-flight future kills the child via
            // kill_on_drop; the process does not outlive its budget.
            Err(_) => AgentResult::error(
                &self.name,
                &self.version,
                format!("timed out after {:?}", self.timeout),
                crate::util::elapsed_ms(started),
            ),
        }
    }

    async fn execute(&self, payload: &Value) -> std::result::Result<Value, String> {
        let serialized =
            serde_json::to_vec(payload).map_err(|e| format!("payload serialization: {}", e))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("spawn failed: {}", e))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A job may exit without reading its payload; a broken pipe
            // here is its failure to report, not ours.
            let _ = stdin.write_all(&serialized).await;
            let _ = stdin.shutdown().await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("wait failed: {}", e))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tlog_trace!("agent {} stdout: {}", self.name, stdout.trim());

        if !output.status.success() {
            let message = if stderr.trim().is_empty() {
                format!(
                    "exited with code {}",
                    output.status.code().unwrap_or(-1)
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(message);
        }

        serde_json::from_str::<Value>(stdout.trim())
            .map_err(|_| "unparsable agent output".to_string())
    }
}

/// Build the agent roster from configuration, resolving each executable.
pub fn build_roster(configs: &[AgentConfig], base_dir: &Path) -> Result<Vec<AgentSpec>> {
    configs
        .iter()
        .map(|config| AgentSpec::from_config(config, base_dir))
        .collect()
}
