//! Cooperative task scheduler
//!
//! Polls on a fixed interval and runs every due task to completion, in
//! due-time order, before sleeping again. Tasks are never preempted and
//! shutdown is only observed between polls.

use crate::clock::{Clock, SystemClock};
use crate::error::{LifecycleError, LifecycleResult};
use crate::health::{components, ComponentHealth, ComponentStatus, HealthRegistry};
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// When a task becomes due again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Once a day at a UTC wall-clock time
    DailyAt { hour: u32, minute: u32 },
    /// Fixed period from the previous run
    Every(Duration),
}

impl Cadence {
    pub fn daily_at(hour: u32, minute: u32) -> LifecycleResult<Self> {
        if hour > 23 || minute > 59 {
            return Err(LifecycleError::InvalidInput(format!(
                "invalid time of day {:02}:{:02}",
                hour, minute
            )));
        }
        Ok(Cadence::DailyAt { hour, minute })
    }

    pub fn every(period: Duration) -> LifecycleResult<Self> {
        if period.is_zero() {
            return Err(LifecycleError::InvalidInput(
                "task period must be positive".to_string(),
            ));
        }
        Ok(Cadence::Every(period))
    }

    /// First due time strictly after `t`
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Cadence::DailyAt { hour, minute } => {
                let Some(at) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                    return t + ChronoDuration::days(1);
                };
                let today = t.date_naive().and_time(at).and_utc();
                if today > t {
                    today
                } else {
                    today + ChronoDuration::days(1)
                }
            }
            Cadence::Every(period) => {
                let step = ChronoDuration::from_std(period)
                    .unwrap_or_else(|_| ChronoDuration::days(1));
                if step <= ChronoDuration::zero() {
                    t + ChronoDuration::seconds(1)
                } else {
                    t + step
                }
            }
        }
    }
}

/// A problem a task observed with one health component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentIssue {
    pub component: &'static str,
    pub status: ComponentStatus,
    pub message: String,
}

impl ComponentIssue {
    pub fn degraded(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            status: ComponentStatus::Degraded,
            message: message.into(),
        }
    }

    pub fn unhealthy(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            status: ComponentStatus::Unhealthy,
            message: message.into(),
        }
    }
}

/// What one task run reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub issues: Vec<ComponentIssue>,
}

impl TaskReport {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_issue(issue: ComponentIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A unit of recurring work
pub trait Task: Send {
    fn name(&self) -> &str;

    /// Health components this task exercises; each is reset to healthy
    /// after a run that reports no issue for it
    fn components(&self) -> &'static [&'static str];

    /// Run to completion. Failures are reported, never raised.
    fn run(&mut self, now: DateTime<Utc>) -> TaskReport;
}

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Sleep between polls (default: 60 seconds)
    pub poll_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Record of one task execution
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRun {
    pub task: String,
    pub due_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub report: TaskReport,
    components: &'static [&'static str],
}

struct ScheduledTask {
    task: Box<dyn Task>,
    cadence: Cadence,
    next_due: DateTime<Utc>,
}

/// Single-threaded cooperative scheduler
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    tasks: Vec<ScheduledTask>,
    health: Option<HealthRegistry>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            tasks: Vec::new(),
            health: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Schedule `task`, first due at the cadence's next slot after now
    pub fn add(&mut self, task: Box<dyn Task>, cadence: Cadence) {
        let next_due = cadence.next_after(self.clock.now());
        self.add_at(task, cadence, next_due);
    }

    /// Schedule `task` with an explicit first due time
    pub fn add_at(&mut self, task: Box<dyn Task>, cadence: Cadence, first_due: DateTime<Utc>) {
        info!(task = task.name(), first_due = %first_due, cadence = ?cadence, "Task scheduled");
        self.tasks.push(ScheduledTask {
            task,
            cadence,
            next_due: first_due,
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Earliest pending due time
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.tasks.iter().map(|t| t.next_due).min()
    }

    /// Due times keyed by task name
    pub fn schedule(&self) -> Vec<(String, DateTime<Utc>)> {
        self.tasks
            .iter()
            .map(|t| (t.task.name().to_string(), t.next_due))
            .collect()
    }

    /// Run every task due at the current time, earliest first, then
    /// reschedule each from the time it finished
    pub fn run_pending(&mut self) -> Vec<TaskRun> {
        let now = self.clock.now();
        let mut due: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| self.tasks[i].next_due <= now)
            .collect();
        due.sort_by_key(|&i| self.tasks[i].next_due);

        let mut runs = Vec::with_capacity(due.len());
        for i in due {
            let started_at = self.clock.now();
            let entry = &mut self.tasks[i];
            debug!(task = entry.task.name(), due_at = %entry.next_due, "Running task");

            let report = entry.task.run(started_at);
            let finished_at = self.clock.now();
            for issue in &report.issues {
                warn!(
                    task = entry.task.name(),
                    component = issue.component,
                    status = ?issue.status,
                    message = %issue.message,
                    "Task reported a problem"
                );
            }

            runs.push(TaskRun {
                task: entry.task.name().to_string(),
                due_at: entry.next_due,
                started_at,
                report,
                components: entry.task.components(),
            });
            entry.next_due = entry.cadence.next_after(finished_at);
        }
        runs
    }

    /// Poll until a shutdown signal arrives.
    ///
    /// Tasks run inline on this loop; the signal is checked between polls.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            tasks = self.tasks.len(),
            "Starting scheduler loop"
        );

        let mut ticker = interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let runs = self.run_pending();
                    if !runs.is_empty() {
                        debug!(runs = runs.len(), next_due = ?self.next_due(), "Poll complete");
                    }
                    if let Some(health) = self.health.clone() {
                        publish_health(&health, &runs).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scheduler loop");
                    break;
                }
            }
        }
    }
}

/// Apply each run's issues to the components it exercises
async fn publish_health(health: &HealthRegistry, runs: &[TaskRun]) {
    for run in runs {
        for component in run.components {
            let issue = run
                .report
                .issues
                .iter()
                .filter(|i| i.component == *component)
                .max_by_key(|i| i.status == ComponentStatus::Unhealthy);
            let update = match issue {
                Some(i) if i.status == ComponentStatus::Unhealthy => {
                    ComponentHealth::unhealthy(i.message.clone())
                }
                Some(i) => ComponentHealth::degraded(i.message.clone()),
                None => ComponentHealth::healthy(),
            };
            health.update(component, update).await;
        }
    }
    health.set_healthy(components::SCHEDULER).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    /// Appends its name to a shared log on every run
    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        issue: Option<ComponentIssue>,
    }

    impl Recorder {
        fn boxed(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Box<dyn Task> {
            Box::new(Recorder {
                name,
                log: log.clone(),
                issue: None,
            })
        }
    }

    impl Task for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn components(&self) -> &'static [&'static str] {
            &[components::STORAGE]
        }

        fn run(&mut self, _now: DateTime<Utc>) -> TaskReport {
            self.log.lock().unwrap().push(self.name);
            self.issue
                .clone()
                .map(TaskReport::with_issue)
                .unwrap_or_default()
        }
    }

    #[test]
    fn test_daily_cadence_next_after() {
        let cadence = Cadence::daily_at(2, 0).unwrap();
        assert_eq!(cadence.next_after(at(1, 30)), at(2, 0));
        // Exactly on the slot moves to the next day
        assert_eq!(
            cadence.next_after(at(2, 0)),
            at(2, 0) + ChronoDuration::days(1)
        );
        assert_eq!(
            cadence.next_after(at(14, 0)),
            at(2, 0) + ChronoDuration::days(1)
        );
    }

    #[test]
    fn test_every_cadence_next_after() {
        let cadence = Cadence::every(Duration::from_secs(3600)).unwrap();
        assert_eq!(cadence.next_after(at(1, 15)), at(2, 15));
    }

    #[test]
    fn test_invalid_cadences_rejected() {
        assert!(Cadence::daily_at(24, 0).is_err());
        assert!(Cadence::daily_at(2, 60).is_err());
        assert!(Cadence::every(Duration::ZERO).is_err());
    }

    #[test]
    fn test_run_pending_only_runs_due_tasks() {
        let clock = Arc::new(ManualClock::new(at(0, 0)));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).with_clock(clock.clone());
        scheduler.add(Recorder::boxed("daily", &log), Cadence::daily_at(2, 0).unwrap());
        scheduler.add(
            Recorder::boxed("hourly", &log),
            Cadence::every(Duration::from_secs(3600)).unwrap(),
        );
        assert_eq!(scheduler.next_due(), Some(at(1, 0)));

        assert!(scheduler.run_pending().is_empty());

        clock.set(at(1, 0));
        let runs = scheduler.run_pending();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].task, "hourly");
        assert_eq!(scheduler.next_due(), Some(at(2, 0)));
    }

    #[test]
    fn test_run_pending_orders_by_due_time_and_reschedules() {
        let clock = Arc::new(ManualClock::new(at(0, 0)));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(SchedulerConfig::default()).with_clock(clock.clone());
        scheduler.add_at(
            Recorder::boxed("late", &log),
            Cadence::daily_at(3, 0).unwrap(),
            at(1, 30),
        );
        scheduler.add_at(
            Recorder::boxed("early", &log),
            Cadence::every(Duration::from_secs(600)).unwrap(),
            at(1, 0),
        );

        clock.set(at(2, 0));
        scheduler.run_pending();
        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);

        let schedule = scheduler.schedule();
        assert!(schedule.contains(&("early".to_string(), at(2, 10))));
        assert!(schedule.contains(&("late".to_string(), at(3, 0))));

        // Nothing is due again until the next slot
        assert!(scheduler.run_pending().is_empty());
    }

    #[tokio::test]
    async fn test_run_publishes_health_and_stops_on_shutdown() {
        let health = HealthRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new(SchedulerConfig {
            poll_interval: Duration::from_millis(10),
        })
        .with_health(health.clone());
        scheduler.add_at(
            Box::new(Recorder {
                name: "quality",
                log: log.clone(),
                issue: Some(ComponentIssue::degraded(components::STORAGE, "3 incomplete")),
            }),
            Cadence::every(Duration::from_secs(3600)).unwrap(),
            Utc::now() - ChronoDuration::seconds(1),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(scheduler.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["quality"]);
        let report = health.health().await;
        assert_eq!(
            report.components[components::STORAGE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            report.components[components::SCHEDULER].status,
            ComponentStatus::Healthy
        );
    }
}
