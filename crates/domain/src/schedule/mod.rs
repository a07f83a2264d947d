//! Schedules — time-based triggers and the jobs that track them.
//!
//! A [`ScheduledJob`] is derived from a rule with a
//! [`Trigger::Schedule`](crate::automation::Trigger::Schedule); it is never
//! authored directly. Its lifecycle is `Inactive → Active → Due → Executed
//! → Active`, or `Active → Inactive` when disabled or removed.

mod cron;

pub use cron::{CronError, CronExpression, CronField, Schedule, describe};

use serde::Serialize;

use crate::automation::{AutomationRule, Trigger};
use crate::error::{RuleflowError, ValidationError};
use crate::execution::ExecutionResult;
use crate::id::RuleId;
use crate::time::Timestamp;

/// Runtime record of a schedule-triggered rule's next fire time.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub rule_id: RuleId,
    pub cron_expression: String,
    pub timezone: String,
    pub next_run: Timestamp,
    pub is_active: bool,
    pub last_run: Option<Timestamp>,
    pub last_result: Option<ExecutionResult>,
    #[serde(skip)]
    schedule: Schedule,
}

impl ScheduledJob {
    /// Derive a job from `rule`, scheduling its first run after `now`.
    ///
    /// The job starts active iff the rule is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnexpectedTrigger`] when the rule is not
    /// schedule-triggered, or [`RuleflowError::Cron`] for an unusable
    /// expression or timezone.
    pub fn for_rule(rule: &AutomationRule, now: Timestamp) -> Result<Self, RuleflowError> {
        let Trigger::Schedule { cron, timezone } = &rule.trigger else {
            return Err(ValidationError::UnexpectedTrigger {
                expected: "schedule",
                actual: rule.trigger.kind(),
            }
            .into());
        };
        let schedule = Schedule::new(cron, timezone)?;
        Ok(Self {
            rule_id: rule.id,
            cron_expression: cron.clone(),
            timezone: timezone.clone(),
            next_run: schedule.next_after(now),
            is_active: rule.enabled,
            last_run: None,
            last_result: None,
            schedule,
        })
    }

    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Whether the job should fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.is_active && self.next_run <= now
    }

    /// Record a run that happened at `at` and schedule the next one.
    pub fn record_run(&mut self, at: Timestamp, result: Option<ExecutionResult>) {
        self.last_run = Some(at);
        self.last_result = result;
        self.next_run = self.schedule.next_after(at);
    }

    /// Activate or deactivate the job. Reactivation reschedules from `now`
    /// so a long-inactive job does not fire immediately for a stale slot.
    pub fn set_active(&mut self, active: bool, now: Timestamp) {
        if active && !self.is_active {
            self.next_run = self.schedule.next_after(now);
        }
        self.is_active = active;
    }

    /// Next `count` run times starting at the current `next_run`.
    #[must_use]
    pub fn upcoming_runs(&self, count: usize) -> Vec<Timestamp> {
        self.schedule.upcoming(self.next_run, count)
    }

    #[must_use]
    pub fn describe(&self) -> String {
        self.schedule.describe()
    }
}
