//! Integration test suite for triage.
//!
//! These tests exercise the full request path from routing decision to
//! merged report, including the process bridge pool and the agent
//! fan-out. They verify that all components work together correctly.
//!
//! # Test Categories
//!
//! - `bridge_pool`: worker supervision, timeouts, breaker, respawn
//! - `routing`: short-circuit tiers and safety precedence
//! - `fanout`: fan-out isolation, join barrier, merge pass
//!
//! # CI Compatibility
//!
//! Workers and agents are small `/bin/sh` scripts; no external service
//! or network access is required.

mod fixtures;

mod bridge_pool;
mod fanout;
mod routing;
