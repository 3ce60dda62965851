//! Fast-path matcher for trivial, low-risk intents.
//!
//! Before paying for full analysis, the orchestrator checks the input
//! against a small table of canned intents (greetings and the like). A
//! hit short-circuits the request with a synthetic agent result at
//! near-zero cost.

use regex::{Regex, RegexBuilder};

use crate::{Error, Result};

/// Cost estimate recorded for a fast-path hit, in USD.
pub const FASTPATH_EST_USD: f64 = 0.0001;

/// One canned intent: a named pattern and its reply.
#[derive(Debug)]
pub struct FastPattern {
    pub name: String,
    pub pattern: Regex,
    pub reply: String,
}

/// Table of trivial intents, checked in order.
#[derive(Debug)]
pub struct FastPath {
    patterns: Vec<FastPattern>,
}

impl FastPath {
    /// Build a table from (name, pattern, reply) rows. Patterns are
    /// compiled case-insensitive.
    pub fn from_table(rows: &[(&str, &str, &str)]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(rows.len());
        for (name, pattern, reply) in rows {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Validation(format!("fastpath pattern `{}`: {}", name, e)))?;
            patterns.push(FastPattern {
                name: name.to_string(),
                pattern: compiled,
                reply: reply.to_string(),
            });
        }
        Ok(Self { patterns })
    }

    /// The default shipped table.
    pub fn with_defaults() -> Self {
        // These patterns are anchored: a greeting embedded in a longer
        // message is not trivial and must not short-circuit.
        let rows = [
            (
                "greeting",
                r"^\s*(hi|hiya|hello|hey|good\s+(morning|afternoon|evening))[\s!,.?]*$",
                "Hello! How can I help you today?",
            ),
            (
                "thanks",
                r"^\s*(thanks|thank\s+you|thx|much\s+appreciated)[\s!,.?]*$",
                "You're welcome!",
            ),
            (
                "farewell",
                r"^\s*(bye|goodbye|good\s+night|see\s+you(\s+later)?)[\s!,.?]*$",
                "Goodbye! Take care.",
            ),
        ];
        match Self::from_table(&rows) {
            Ok(table) => table,
            // Static rows; compilation cannot fail.
            Err(_) => Self {
                patterns: Vec::new(),
            },
        }
    }

    /// First matching pattern, if any.
    pub fn matches(&self, text: &str) -> Option<&FastPattern> {
        self.patterns.iter().find(|p| p.pattern.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for FastPath {
    fn default() -> Self {
        Self::with_defaults()
    }
}
