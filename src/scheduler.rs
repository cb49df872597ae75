//! Cooperative, single-process periodic task runner (§4.I). Matches the
//! teacher's existing practice of hand-rolling periodic work with
//! `tokio::spawn` + `tokio::time::interval` (`connection_status.rs`) rather
//! than reaching for a cron-expression crate — generalized here into a
//! small named-task registry so the startup orchestrator can wire up the
//! default task table in one place.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type TaskFn = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Optional phase constraint parsed from `:ss` or `:mm:ss` (§4.I): a task
/// otherwise driven by a plain interval can additionally be pinned to run
/// only when the wall clock matches this second-of-minute (or
/// minute:second-of-hour) offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtConstraint {
    SecondOfMinute(u32),
    MinuteSecondOfHour(u32, u32),
}

impl AtConstraint {
    /// Parse `":ss"` or `":mm:ss"`. Returns `None` if malformed.
    pub fn parse(spec: &str) -> Option<Self> {
        let trimmed = spec.strip_prefix(':')?;
        let parts: Vec<&str> = trimmed.split(':').collect();
        match parts.as_slice() {
            [sec] => sec.parse().ok().map(AtConstraint::SecondOfMinute),
            [min, sec] => {
                let min: u32 = min.parse().ok()?;
                let sec: u32 = sec.parse().ok()?;
                Some(AtConstraint::MinuteSecondOfHour(min, sec))
            }
            _ => None,
        }
    }

    fn matches(&self, now_unix: i64) -> bool {
        match self {
            AtConstraint::SecondOfMinute(s) => (now_unix % 60) as u32 == *s,
            AtConstraint::MinuteSecondOfHour(m, s) => {
                let in_hour = now_unix % 3_600;
                (in_hour / 60) as u32 == *m && (in_hour % 60) as u32 == *s
            }
        }
    }
}

/// Events emitted around every task run (§4.I: `taskStart`, `taskComplete`,
/// `taskError`), broadcast so the real-time event layer can surface them.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    TaskStart { name: String },
    TaskComplete { name: String, duration: Duration },
    TaskError { name: String, error: String },
}

struct Task {
    enabled: Arc<AtomicBool>,
    handler: TaskFn,
    join: Option<JoinHandle<()>>,
}

/// Registry of periodic tasks plus a broadcast channel of scheduler events.
/// Tasks are looked up by name for enable/disable/remove/run-now (§4.I).
pub struct Scheduler {
    tasks: RwLock<HashMap<String, Task>>,
    events: tokio::sync::broadcast::Sender<SchedulerEvent>,
}

impl Default for Scheduler {
    fn default() -> Self {
        let (events, _rx) = tokio::sync::broadcast::channel(256);
        Self { tasks: RwLock::new(HashMap::new()), events }
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Register and immediately start a periodic task. A task with the same
    /// name that already exists is replaced (its previous loop aborted).
    pub fn register<F, Fut>(&self, name: impl Into<String>, interval: Duration, at: Option<AtConstraint>, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let handler: TaskFn = Arc::new(move || Box::pin(handler()));
        let enabled = Arc::new(AtomicBool::new(true));

        self.remove(&name);

        let join = self.spawn_loop(name.clone(), interval, at, enabled.clone(), handler.clone());

        self.tasks.write().insert(name, Task { enabled, handler, join: Some(join) });
    }

    fn spawn_loop(
        &self,
        name: String,
        interval_dur: Duration,
        at: Option<AtConstraint>,
        enabled: Arc<AtomicBool>,
        handler: TaskFn,
    ) -> JoinHandle<()> {
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_dur);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if !enabled.load(Ordering::Relaxed) {
                    continue;
                }
                if let Some(constraint) = at {
                    if !constraint.matches(crate::db::now_unix()) {
                        continue;
                    }
                }
                run_once(&name, &handler, &events).await;
            }
        })
    }

    /// Run a registered task immediately, out of band with its interval.
    pub async fn run_now(&self, name: &str) -> anyhow::Result<()> {
        let handler = {
            let tasks = self.tasks.read();
            tasks.get(name).map(|t| t.handler.clone())
        };
        let Some(handler) = handler else {
            anyhow::bail!("no such scheduled task: {name}");
        };
        run_once(name, &handler, &self.events).await;
        Ok(())
    }

    pub fn enable(&self, name: &str) -> bool {
        self.tasks.read().get(name).map(|t| t.enabled.store(true, Ordering::Relaxed)).is_some()
    }

    pub fn disable(&self, name: &str) -> bool {
        self.tasks.read().get(name).map(|t| t.enabled.store(false, Ordering::Relaxed)).is_some()
    }

    pub fn remove(&self, name: &str) -> bool {
        if let Some(task) = self.tasks.write().remove(name) {
            if let Some(join) = task.join {
                join.abort();
            }
            true
        } else {
            false
        }
    }

    pub fn task_names(&self) -> Vec<String> {
        self.tasks.read().keys().cloned().collect()
    }

    /// Aborts every running task loop; idempotent, safe to call during
    /// graceful shutdown (§4.K).
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.write();
        for (_, task) in tasks.drain() {
            if let Some(join) = task.join {
                join.abort();
            }
        }
    }
}

/// Run one invocation of `handler`, emitting `taskStart`/`taskComplete`/
/// `taskError` and catching panics so a single misbehaving task never takes
/// down the scheduler (§4.I).
async fn run_once(name: &str, handler: &TaskFn, events: &tokio::sync::broadcast::Sender<SchedulerEvent>) {
    let _ = events.send(SchedulerEvent::TaskStart { name: name.to_string() });
    let start = Instant::now();

    let result = AssertUnwindSafe(handler()).catch_unwind().await;

    match result {
        Ok(Ok(())) => {
            let duration = start.elapsed();
            let _ = events.send(SchedulerEvent::TaskComplete { name: name.to_string(), duration });
        }
        Ok(Err(err)) => {
            warn!(task = name, error = %err, "scheduled task returned an error");
            let _ = events.send(SchedulerEvent::TaskError { name: name.to_string(), error: err.to_string() });
        }
        Err(panic) => {
            let message = panic_message(&panic);
            error!(task = name, panic = %message, "scheduled task panicked");
            let _ = events.send(SchedulerEvent::TaskError { name: name.to_string(), error: message });
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// The default task table (§4.I): name, interval, optional phase constraint.
/// `startup::run` registers each against its concrete handler; this list is
/// the authoritative cadence reference.
pub const DEFAULT_TASKS: &[(&str, Duration)] = &[
    ("status_emit", Duration::from_secs(30)),
    ("prune_retention", Duration::from_secs(60)),
    ("fts_bounded_merge", Duration::from_secs(300)),
    ("wal_checkpoint", Duration::from_secs(300)),
    ("fts_optimize_vacuum", Duration::from_secs(6 * 3_600)),
    ("decoder_health_probe", Duration::from_secs(60)),
    // Spec aligns this per canonical range (1hr..1yr); simplified here to one
    // shared minute-aligned refresh of every range (documented in DESIGN.md).
    ("timeseries_cache_refresh", Duration::from_secs(60)),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    #[test]
    fn at_constraint_parses_second_and_minute_second_forms() {
        assert_eq!(AtConstraint::parse(":30"), Some(AtConstraint::SecondOfMinute(30)));
        assert_eq!(AtConstraint::parse(":05:00"), Some(AtConstraint::MinuteSecondOfHour(5, 0)));
        assert_eq!(AtConstraint::parse("bogus"), None);
    }

    #[test]
    fn second_of_minute_matches_exact_offset() {
        let c = AtConstraint::SecondOfMinute(15);
        assert!(c.matches(75)); // 75 % 60 == 15
        assert!(!c.matches(76));
    }

    #[tokio::test]
    async fn run_now_invokes_handler_immediately() {
        let scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        scheduler.register("noop", Duration::from_secs(3600), None, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        scheduler.run_now("noop").await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn panicking_task_emits_task_error_and_does_not_abort_process() {
        let scheduler = Scheduler::new();
        scheduler.register("panics", Duration::from_secs(3600), None, || async {
            panic!("boom");
            #[allow(unreachable_code)]
            Ok(())
        });

        let mut rx = scheduler.subscribe();
        scheduler.run_now("panics").await.unwrap();

        let mut saw_error = false;
        for _ in 0..4 {
            match timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Ok(SchedulerEvent::TaskError { name, .. })) if name == "panics" => {
                    saw_error = true;
                    break;
                }
                Ok(Ok(_)) => continue,
                _ => break,
            }
        }
        assert!(saw_error);
        scheduler.shutdown();
    }

    #[tokio::test]
    async fn disabled_task_is_skipped_by_run_now_path_only_via_interval() {
        let scheduler = Scheduler::new();
        assert!(!scheduler.enable("missing"));
        assert!(!scheduler.disable("missing"));
    }
}
