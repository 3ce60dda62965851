//! Cost estimation and budget admission control.
//!
//! The gate is consulted once per request, before the fan-out commits to
//! expensive work. Exceeding a ceiling never fails the request: it
//! degrades the routing tier, and the degradation is recorded in the
//! audit log for the caller to react to.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::config::BudgetConfig;
use crate::orchestration::types::Tier;
use crate::tlog_debug;

/// Input length boundaries for tier selection, in characters.
const MID_TIER_LEN: usize = 280;
const TOP_TIER_LEN: usize = 1_200;

/// Estimated cost per tier, in USD.
const BASE_EST_USD: f64 = 0.02;
const MID_EST_USD: f64 = 0.06;
const TOP_EST_USD: f64 = 0.15;

/// Rolling budget window.
const WINDOW_DAYS: i64 = 7;

/// A tier choice with its estimated cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub tier: Tier,
    pub est_usd: f64,
}

/// Estimate the cost of full analysis from input length.
pub fn estimate(text: &str) -> CostEstimate {
    let len = text.chars().count();
    if len >= TOP_TIER_LEN {
        CostEstimate {
            tier: Tier::Top,
            est_usd: TOP_EST_USD,
        }
    } else if len >= MID_TIER_LEN {
        CostEstimate {
            tier: Tier::Mid,
            est_usd: MID_EST_USD,
        }
    } else {
        CostEstimate {
            tier: Tier::Base,
            est_usd: BASE_EST_USD,
        }
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub tier: Tier,
    pub est_usd: f64,
    /// True when a ceiling forced the tier down.
    pub degraded: bool,
    pub reason: Option<String>,
}

/// Budget gate with per-run and rolling-window ceilings.
pub struct BudgetGate {
    config: BudgetConfig,
    /// Spend ledger: (timestamp, estimated USD), pruned to the window.
    ledger: Mutex<VecDeque<(DateTime<Utc>, f64)>>,
}

impl BudgetGate {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            config,
            ledger: Mutex::new(VecDeque::new()),
        }
    }

    /// Decide the tier for one request and record its estimated spend.
    pub fn admit(&self, text: &str) -> Admission {
        self.admit_at(Utc::now(), text)
    }

    fn admit_at(&self, now: DateTime<Utc>, text: &str) -> Admission {
        let preferred = estimate(text);
        let mut ledger = match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let cutoff = now - ChronoDuration::days(WINDOW_DAYS);
        while ledger.front().map(|(ts, _)| *ts < cutoff).unwrap_or(false) {
            ledger.pop_front();
        }
        let spent: f64 = ledger.iter().map(|(_, usd)| usd).sum();

        let mut admission = Admission {
            tier: preferred.tier,
            est_usd: preferred.est_usd,
            degraded: false,
            reason: None,
        };

        if preferred.est_usd > self.config.per_run_usd {
            admission = Admission {
                tier: Tier::Base,
                est_usd: BASE_EST_USD,
                degraded: true,
                reason: Some("per_run_budget_exceeded".to_string()),
            };
        } else if spent + preferred.est_usd > self.config.weekly_usd {
            admission = Admission {
                tier: Tier::Base,
                est_usd: BASE_EST_USD,
                degraded: true,
                reason: Some("weekly_budget_exceeded".to_string()),
            };
        }

        if admission.degraded {
            tlog_debug!(
                "budget gate degraded tier to {} ({})",
                admission.tier,
                admission.reason.as_deref().unwrap_or("")
            );
        }

        ledger.push_back((now, admission.est_usd));
        admission
    }

    /// Estimated spend inside the rolling window.
    pub fn spent_in_window(&self) -> f64 {
        let ledger = match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cutoff = Utc::now() - ChronoDuration::days(WINDOW_DAYS);
        ledger
            .iter()
            .filter(|(ts, _)| *ts >= cutoff)
            .map(|(_, usd)| usd)
            .sum()
    }
}
