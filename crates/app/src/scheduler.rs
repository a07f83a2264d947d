//! Scheduler — fires schedule-triggered rules on their cron timetable.
//!
//! Each schedule rule gets a [`ScheduledJob`]. A single background task
//! sleeps until the next minute boundary, runs every active job whose
//! `next_run` has passed, one after the other, then goes back to sleep.
//! A run's outcome never disables a job; only deactivation does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Timelike;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use ruleflow_domain::automation::AutomationRule;
use ruleflow_domain::error::RuleflowError;
use ruleflow_domain::execution::{ExecutionContext, ExecutionResult};
use ruleflow_domain::id::RuleId;
use ruleflow_domain::schedule::ScheduledJob;
use ruleflow_domain::time::{Timestamp, now};

use crate::ports::ActionExecutor;
use crate::rule_engine::RuleEngine;

struct SchedulerInner<X> {
    engine: Arc<RuleEngine<X>>,
    jobs: RwLock<HashMap<RuleId, ScheduledJob>>,
}

struct Runner {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Owns the scheduled jobs and the background task that fires them.
pub struct Scheduler<X> {
    inner: Arc<SchedulerInner<X>>,
    runner: Mutex<Option<Runner>>,
}

impl<X> Scheduler<X>
where
    X: ActionExecutor + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(engine: Arc<RuleEngine<X>>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                engine,
                jobs: RwLock::new(HashMap::new()),
            }),
            runner: Mutex::new(None),
        }
    }

    /// Create or replace the job for a schedule-triggered rule.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the rule is not schedule-triggered,
    /// or [`RuleflowError::Cron`] for an unusable expression or timezone.
    #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
    pub async fn add_job(&self, rule: &AutomationRule) -> Result<ScheduledJob, RuleflowError> {
        let job = ScheduledJob::for_rule(rule, now())?;
        tracing::debug!(
            next_run = %job.next_run,
            schedule = %job.describe(),
            "job scheduled"
        );
        self.inner.jobs.write().await.insert(rule.id, job.clone());
        Ok(job)
    }

    /// Drop a rule's job, returning it if there was one.
    #[tracing::instrument(skip(self))]
    pub async fn remove_job(&self, rule_id: RuleId) -> Option<ScheduledJob> {
        self.inner.jobs.write().await.remove(&rule_id)
    }

    /// Re-derive the job after the rule changed.
    ///
    /// The previous job is dropped first, so a rule whose trigger is no
    /// longer a schedule simply ends up without a job.
    ///
    /// # Errors
    ///
    /// Same as [`Scheduler::add_job`].
    pub async fn update_job(
        &self,
        rule: &AutomationRule,
    ) -> Result<Option<ScheduledJob>, RuleflowError> {
        self.remove_job(rule.id).await;
        if rule.trigger.is_schedule() {
            self.add_job(rule).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Activate or deactivate a job. Returns `false` if there is none.
    pub async fn set_job_active(&self, rule_id: RuleId, active: bool) -> bool {
        match self.inner.jobs.write().await.get_mut(&rule_id) {
            Some(job) => {
                job.set_active(active, now());
                true
            }
            None => false,
        }
    }

    pub async fn get_job(&self, rule_id: RuleId) -> Option<ScheduledJob> {
        self.inner.jobs.read().await.get(&rule_id).cloned()
    }

    /// Every job, soonest first.
    pub async fn list_jobs(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<_> = self.inner.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|job| job.next_run);
        jobs
    }

    /// The next `count` fire times of a job, empty if it does not exist.
    pub async fn get_upcoming_runs(&self, rule_id: RuleId, count: usize) -> Vec<Timestamp> {
        self.inner
            .jobs
            .read()
            .await
            .get(&rule_id)
            .map(|job| job.upcoming_runs(count))
            .unwrap_or_default()
    }

    /// Run every job due at `now`. This is one tick of the background loop.
    pub async fn run_due_jobs(&self, now: Timestamp) -> Vec<(RuleId, ExecutionResult)> {
        self.inner.run_due_jobs(now).await
    }

    /// Spawn the background loop. Calling it while running does nothing.
    pub async fn start(&self) {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            tracing::debug!("scheduler already running");
            return;
        }
        let (shutdown, receiver) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run(receiver).await });
        *runner = Some(Runner { shutdown, handle });
        tracing::info!("scheduler started");
    }

    /// Stop the background loop. A tick already in progress completes first.
    pub async fn stop(&self) {
        let Some(runner) = self.runner.lock().await.take() else {
            return;
        };
        let _ = runner.shutdown.send(true);
        if let Err(err) = runner.handle.await {
            tracing::error!(error = %err, "scheduler task ended abnormally");
        }
        tracing::info!("scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.runner.lock().await.is_some()
    }
}

impl<X> SchedulerInner<X>
where
    X: ActionExecutor + Send + Sync + 'static,
{
    async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(until_next_minute(now())) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            self.run_due_jobs(now()).await;
        }
    }

    async fn run_due_jobs(&self, now: Timestamp) -> Vec<(RuleId, ExecutionResult)> {
        let due: Vec<RuleId> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.is_due(now))
            .map(|job| job.rule_id)
            .collect();

        let mut results = Vec::with_capacity(due.len());
        for rule_id in due {
            let context = ExecutionContext::new(rule_id, scheduled_trigger_data(now));
            let result = self.engine.execute(rule_id, Some(context)).await;
            if !result.success {
                tracing::warn!(rule_id = %rule_id, message = %result.message, "scheduled run failed");
            }

            if let Some(job) = self.jobs.write().await.get_mut(&rule_id) {
                job.record_run(now, Some(result.clone()));
                tracing::debug!(rule_id = %rule_id, next_run = %job.next_run, "job rescheduled");
            }
            results.push((rule_id, result));
        }
        results
    }
}

fn scheduled_trigger_data(at: Timestamp) -> serde_json::Value {
    serde_json::json!({
        "trigger": "schedule",
        "scheduled_at": at.to_rfc3339(),
    })
}

/// Time left until the next whole minute.
fn until_next_minute(now: Timestamp) -> Duration {
    let elapsed_ms =
        u64::from(now.second()) * 1000 + u64::from(now.timestamp_subsec_millis().min(999));
    Duration::from_millis(60_000 - elapsed_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ActionError, ActionOutcome};
    use chrono::TimeDelta;
    use ruleflow_domain::automation::{Action, ActionType, Trigger};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        calls: AtomicUsize,
    }

    impl ActionExecutor for CountingExecutor {
        fn execute(
            &self,
            action: &Action,
            _context: &ExecutionContext,
        ) -> impl Future<Output = Result<ActionOutcome, ActionError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = action.config.get("fail").is_some();
            async move {
                if fail {
                    Ok(ActionOutcome::failed("export target unavailable"))
                } else {
                    Ok(ActionOutcome::ok("exported"))
                }
            }
        }
    }

    fn utc(s: &str) -> Timestamp {
        chrono::DateTime::parse_from_rfc3339(s).unwrap().to_utc()
    }

    fn schedule_rule(cron: &str, config: serde_json::Value) -> AutomationRule {
        AutomationRule::builder()
            .name("Nightly export")
            .trigger(Trigger::Schedule {
                cron: cron.to_string(),
                timezone: "UTC".to_string(),
            })
            .action(Action::new(ActionType::ExportData, config))
            .build()
            .unwrap()
    }

    async fn scheduler_with(rule: &AutomationRule) -> Scheduler<CountingExecutor> {
        let engine = Arc::new(RuleEngine::new(CountingExecutor::default()));
        engine.add_rule(rule.clone()).await;
        let scheduler = Scheduler::new(engine);
        scheduler.add_job(rule).await.unwrap();
        scheduler
    }

    async fn make_due(scheduler: &Scheduler<CountingExecutor>, rule_id: RuleId, at: Timestamp) {
        scheduler
            .inner
            .jobs
            .write()
            .await
            .get_mut(&rule_id)
            .unwrap()
            .next_run = at;
    }

    #[test]
    fn should_wait_until_next_minute_boundary() {
        assert_eq!(
            until_next_minute(utc("2024-03-12T08:00:15Z")),
            Duration::from_secs(45)
        );
        assert_eq!(
            until_next_minute(utc("2024-03-12T08:00:59.500Z")),
            Duration::from_millis(500)
        );
        assert_eq!(
            until_next_minute(utc("2024-03-12T08:00:00Z")),
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn should_reject_job_when_rule_not_schedule_triggered() {
        let engine = Arc::new(RuleEngine::new(CountingExecutor::default()));
        let scheduler = Scheduler::new(engine);
        let rule = AutomationRule::builder()
            .name("manual")
            .action(Action::new(ActionType::RunQuery, serde_json::json!({})))
            .build()
            .unwrap();
        assert!(scheduler.add_job(&rule).await.is_err());
        assert!(scheduler.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn should_run_due_job_and_reschedule() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;
        let tick = utc("2024-03-12T09:00:00Z");
        make_due(&scheduler, rule.id, tick).await;

        let results = scheduler.run_due_jobs(tick).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].1.success);
        let job = scheduler.get_job(rule.id).await.unwrap();
        assert_eq!(job.last_run, Some(tick));
        assert_eq!(job.next_run, utc("2024-03-13T09:00:00Z"));
        assert!(job.last_result.unwrap().success);
    }

    #[tokio::test]
    async fn should_keep_job_active_when_run_fails() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({"fail": true}));
        let scheduler = scheduler_with(&rule).await;
        let tick = utc("2024-03-12T09:00:00Z");
        make_due(&scheduler, rule.id, tick).await;

        let results = scheduler.run_due_jobs(tick).await;

        assert!(!results[0].1.success);
        let job = scheduler.get_job(rule.id).await.unwrap();
        assert!(job.is_active);
        assert_eq!(job.next_run, utc("2024-03-13T09:00:00Z"));
    }

    #[tokio::test]
    async fn should_skip_jobs_not_yet_due() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;
        make_due(&scheduler, rule.id, utc("2024-03-12T09:00:00Z")).await;

        let results = scheduler.run_due_jobs(utc("2024-03-12T08:59:00Z")).await;

        assert!(results.is_empty());
        assert_eq!(scheduler.inner.engine.executor().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_skip_inactive_jobs() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;
        let tick = utc("2024-03-12T09:00:00Z");
        make_due(&scheduler, rule.id, tick).await;

        assert!(scheduler.set_job_active(rule.id, false).await);
        assert!(scheduler.run_due_jobs(tick).await.is_empty());
        assert!(!scheduler.set_job_active(RuleId::new(), false).await);
    }

    #[tokio::test]
    async fn should_drop_job_when_rule_no_longer_scheduled() {
        let mut rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;

        rule.trigger = Trigger::Manual;
        let job = scheduler.update_job(&rule).await.unwrap();

        assert!(job.is_none());
        assert!(scheduler.get_job(rule.id).await.is_none());
    }

    #[tokio::test]
    async fn should_recompute_job_when_cron_changes() {
        let mut rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;

        rule.trigger = Trigger::Schedule {
            cron: "30 * * * *".to_string(),
            timezone: "UTC".to_string(),
        };
        let job = scheduler.update_job(&rule).await.unwrap().unwrap();

        assert_eq!(job.cron_expression, "30 * * * *");
        assert_eq!(job.next_run.minute(), 30);
    }

    #[tokio::test]
    async fn should_list_upcoming_runs_for_job() {
        let rule = schedule_rule("0 * * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;

        let runs = scheduler.get_upcoming_runs(rule.id, 3).await;

        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1] - runs[0], TimeDelta::hours(1));
        assert!(scheduler.get_upcoming_runs(RuleId::new(), 3).await.is_empty());
    }

    #[tokio::test]
    async fn should_start_and_stop_background_loop() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;

        scheduler.start().await;
        scheduler.start().await;
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_due_job_from_background_loop() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;
        make_due(&scheduler, rule.id, now() - TimeDelta::minutes(1)).await;

        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        scheduler.stop().await;

        let job = scheduler.get_job(rule.id).await.unwrap();
        assert!(job.last_run.is_some());
        assert_eq!(scheduler.inner.engine.executor().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_fire_due_job_when_stopped_before_tick() {
        let rule = schedule_rule("0 9 * * *", serde_json::json!({}));
        let scheduler = scheduler_with(&rule).await;
        make_due(&scheduler, rule.id, now() - TimeDelta::minutes(1)).await;

        scheduler.start().await;
        scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(121)).await;

        let job = scheduler.get_job(rule.id).await.unwrap();
        assert!(job.last_run.is_none());
        assert_eq!(scheduler.inner.engine.executor().calls.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_running().await);
    }
}
