use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;

use triage::bridge::BridgePool;
use triage::config::Config;
use triage::orchestration::{build_roster, BudgetGate, Orchestrator, RunContext, RunId, RunInput};
use triage::telemetry::Telemetry;
use triage::{tlog, Result};

/// Triage - analysis request dispatch and aggregation service
#[derive(Parser, Debug)]
#[command(name = "triage")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    TRIAGE_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.triage/triage.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Configuration file (defaults to ~/.triage/triage.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one analysis request and print the consolidated report
    Run {
        /// Path to the request JSON (reads stdin when omitted)
        input: Option<PathBuf>,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Aggregate the telemetry sink: per-tier counts, distribution, cost
    Report,
}

/// One request as accepted on the CLI surface.
#[derive(Debug, Deserialize)]
struct RunRequest {
    text: String,
    #[serde(default)]
    participants: Vec<String>,
    consent: Option<bool>,
    language: Option<String>,
    /// Caller-supplied run id; generated when omitted.
    run_id: Option<RunId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    triage::log::init_with_debug(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.ensure_dirs()?;

    match cli.command {
        Command::Run { input, pretty } => run(&config, input, pretty).await,
        Command::Report => report(&config).await,
    }
}

async fn run(config: &Config, input: Option<PathBuf>, pretty: bool) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let request: RunRequest = serde_json::from_str(&raw)?;

    let base_dir = std::env::current_dir()?;
    let telemetry = Arc::new(Telemetry::new(config.effective_telemetry_dir()?));

    // The classifier's neutral payload: every degraded bridge call
    // resolves to this instead of an error.
    let fallback = json!({"level": "green", "confidence": 0.0});
    let pool = BridgePool::spawn(
        config.pool.clone(),
        config.effective_classifier(),
        &base_dir,
        fallback,
    )?;
    let agents = build_roster(&config.agents, &base_dir)?;

    let orchestrator = Orchestrator::new(
        Arc::clone(&pool),
        agents,
        BudgetGate::new(config.budget.clone()),
        Arc::clone(&telemetry),
    );

    let ctx = RunContext {
        run_id: request.run_id.unwrap_or_default(),
        timestamp: chrono::Utc::now(),
        language: request.language.clone(),
    };
    let run_input = RunInput {
        text: request.text,
        participants: request.participants,
        consent: request.consent,
    };

    tlog!("run {} started ({} agents)", ctx.run_id.short(), orchestrator.agent_count());
    let result = orchestrator.run_all_agents(run_input, ctx).await;
    tlog!(
        "run {} finished: tier={} ok={} err={}",
        result.run_id.short(),
        result.routing.tier,
        result.success_count,
        result.error_count
    );

    let rendered = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", rendered);

    pool.shutdown();
    Ok(())
}

async fn report(config: &Config) -> Result<()> {
    let dir = config.effective_telemetry_dir()?;
    let report = triage::util::blocking_with_timeout(std::time::Duration::from_secs(10), move || {
        triage::telemetry::aggregate(&dir)
    })
    .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
