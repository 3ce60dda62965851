//! Append-only telemetry sink, partitioned by UTC date.
//!
//! Every request produces exactly one [`RouterLogEntry`] audit record,
//! written as one JSON object per line to `events-YYYY-MM-DD.jsonl`.
//! The sink is fail-safe: validation or I/O failures bump a drop counter
//! and return, they never raise or block the caller's critical path.
//!
//! The offline consumer ([`aggregate`]) folds the day files into per-tier
//! counts, percentage distribution, and total estimated cost.

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::{tlog_warn, Result};

/// Audit record written once per request. Never mutated after writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterLogEntry {
    /// Run identifier for the request.
    pub run_id: String,
    /// ISO 8601 timestamp (UTC).
    pub ts: String,
    /// Routing tier taken ("empty", "safety_path", "fastpath", "base", "mid", "top").
    pub tier: String,
    /// Model identifier, when a model-backed tier was taken.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Whether the fast path fired.
    pub fastpath: bool,
    /// Name of the matched fast-path pattern, when it fired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fastpath_pattern: Option<String>,
    /// Estimated cost of the request in USD.
    pub est_usd: f64,
    /// Routing confidence, when the classifier contributed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Routing reason (e.g. "emotion_red", "budget_exceeded").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Length of the input text in characters.
    pub input_len: usize,
    /// Request language, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RouterLogEntry {
    /// Schema validation applied before every append.
    fn is_valid(&self) -> bool {
        !self.run_id.is_empty()
            && !self.tier.is_empty()
            && self.est_usd.is_finite()
            && self.est_usd >= 0.0
    }
}

/// Operational counters for the sink.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryStats {
    pub attempts: u64,
    pub drops: u64,
    pub drop_rate: f64,
}

/// Durable, fail-safe, append-only event sink.
pub struct Telemetry {
    dir: PathBuf,
    /// Active output target, keyed by UTC date. The first log call after
    /// midnight closes the old handle and opens the new day's file.
    active: Mutex<Option<(NaiveDate, File)>>,
    attempts: AtomicU64,
    drops: AtomicU64,
}

impl Telemetry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: Mutex::new(None),
            attempts: AtomicU64::new(0),
            drops: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one entry to the current day's file.
    ///
    /// Never raises: a validation failure or I/O error increments the
    /// drop counter and returns.
    pub fn log(&self, entry: &RouterLogEntry) {
        self.log_on(Utc::now().date_naive(), entry);
    }

    fn log_on(&self, date: NaiveDate, entry: &RouterLogEntry) {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        if !entry.is_valid() {
            self.drops.fetch_add(1, Ordering::Relaxed);
            tlog_warn!("telemetry: dropped invalid entry run_id={}", entry.run_id);
            return;
        }

        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(_) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let mut active = match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Rotate when the UTC date moved past the cached handle.
        let needs_open = match active.as_ref() {
            Some((open_date, _)) => *open_date != date,
            None => true,
        };
        if needs_open {
            match self.open_for(date) {
                Ok(file) => *active = Some((date, file)),
                Err(_) => {
                    *active = None;
                    self.drops.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        }

        let write_failed = match active.as_mut() {
            Some((_, file)) => writeln!(file, "{}", line).is_err(),
            None => true,
        };
        if write_failed {
            // Drop the handle so the next call retries a fresh open.
            *active = None;
            self.drops.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn open_for(&self, date: NaiveDate) -> std::io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file_name_for(date)))
    }

    pub fn stats(&self) -> TelemetryStats {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let drops = self.drops.load(Ordering::Relaxed);
        let drop_rate = if attempts == 0 {
            0.0
        } else {
            drops as f64 / attempts as f64
        };
        TelemetryStats {
            attempts,
            drops,
            drop_rate,
        }
    }
}

fn file_name_for(date: NaiveDate) -> String {
    format!("events-{}.jsonl", date.format("%Y-%m-%d"))
}

/// ISO 8601 UTC timestamp for audit entries.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Per-tier slice of the aggregated report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierSummary {
    pub count: u64,
    pub pct: f64,
    pub est_usd: f64,
}

/// Offline aggregation over every day file in a telemetry directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryReport {
    pub total_entries: u64,
    pub skipped_lines: u64,
    pub per_tier: BTreeMap<String, TierSummary>,
    pub total_est_usd: f64,
}

/// Fold all `events-*.jsonl` files under `dir` into per-tier counts,
/// percentage distribution, and total estimated cost. Unparsable lines
/// are counted and skipped, matching the sink's fail-safe posture.
pub fn aggregate(dir: &Path) -> Result<TelemetryReport> {
    let mut report = TelemetryReport::default();
    if !dir.exists() {
        return Ok(report);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("events-") && n.ends_with(".jsonl"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    for path in paths {
        let contents = std::fs::read_to_string(&path)?;
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RouterLogEntry>(line) {
                Ok(entry) => {
                    report.total_entries += 1;
                    report.total_est_usd += entry.est_usd;
                    let slot = report.per_tier.entry(entry.tier).or_default();
                    slot.count += 1;
                    slot.est_usd += entry.est_usd;
                }
                Err(_) => report.skipped_lines += 1,
            }
        }
    }

    if report.total_entries > 0 {
        let total = report.total_entries as f64;
        for slot in report.per_tier.values_mut() {
            slot.pct = 100.0 * slot.count as f64 / total;
        }
    }

    Ok(report)
}
