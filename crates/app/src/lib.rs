//! # ruleflow-app
//!
//! Application layer — the automation core and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `RuleRepository` — load and save automation rules
//!   - `EventLog` — append & query emitted events
//!   - `ActionExecutor` — perform the side effect behind an action
//! - Provide the automation core:
//!   - `RuleEngine` — rule registry, condition evaluation, action execution, statistics
//!   - `EventDispatcher` — event-key subscriptions, bounded event history, fan-out
//!   - `Scheduler` — scheduled jobs and the minute-boundary background loop
//!   - `AutomationRuntime` — one owned context wiring the three together
//! - Provide use-case services (`RuleService`) over the ports
//!
//! ## Dependency rule
//! Depends on `ruleflow-domain` only (plus `tokio` for locks, channels and timers).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod event_dispatcher;
pub mod ports;
pub mod rule_engine;
pub mod runtime;
pub mod scheduler;
pub mod services;
