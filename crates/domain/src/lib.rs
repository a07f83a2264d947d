//! # ruleflow-domain
//!
//! Pure domain model for the ruleflow automation core.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Automation rules** (trigger → condition → action bindings)
//! - Define **Conditions** and their left-to-right evaluation over trigger data
//! - Define **Execution records** (context, per-action results, statistics)
//! - Define **Events** (immutable domain facts emitted by producers) and event keys
//! - Define **Schedules** (simplified cron computation and scheduled jobs)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod automation;
pub mod event;
pub mod execution;
pub mod schedule;
