//! Periodic job runner.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use peg_monitor_api::Notifier;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, error, info};

/// Topic for alerts about the monitor process itself.
pub const APP_TOPIC: &str = ":zany_face: [APP]";

/// Runs jobs on fixed periods, each in its own task.
///
/// A panicking run is caught, logged and reported; the job keeps its
/// schedule. Runs of one job never overlap.
pub struct Scheduler {
    max_jitter: Duration,
    panic_notifier: Option<Arc<dyn Notifier>>,
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl Scheduler {
    /// `max_jitter` bounds the random delay added to a job's first run.
    pub fn new(max_jitter: Duration) -> Self {
        Self {
            max_jitter,
            panic_notifier: None,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Report caught panics through `notifier`.
    pub fn with_panic_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.panic_notifier = Some(notifier);
        self
    }

    /// Run `job` every `period`. The first run comes one period plus a
    /// random offset from now.
    pub fn every<F, Fut>(&self, task: impl Into<String>, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = period + jitter(self.max_jitter);
        self.spawn(task.into(), period, delay, job);
    }

    /// Run `job` every `period`, starting now.
    pub fn every_from_now<F, Fut>(&self, task: impl Into<String>, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn(task.into(), period, Duration::ZERO, job);
    }

    fn spawn<F, Fut>(&self, task: String, period: Duration, delay: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        debug!(
            task = %task,
            period_ms = period.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            "Scheduling task"
        );

        let notifier = self.panic_notifier.clone();
        let name = task.clone();
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + delay;
            let mut ticker = interval_at(start, period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                run_once(&name, &job, notifier.as_deref()).await;
            }
        });
        self.handles.lock().push((task, handle));
    }

    /// Number of scheduled jobs.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Stop every job. Runs in flight are cancelled at their next await.
    pub fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.handles.lock());
        for (_, handle) in &handles {
            handle.abort();
        }
        info!(tasks = handles.len(), "Scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for (_, handle) in self.handles.get_mut().drain(..) {
            handle.abort();
        }
    }
}

async fn run_once<F, Fut>(task: &str, job: &F, notifier: Option<&dyn Notifier>)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let started = Instant::now();
    match AssertUnwindSafe(job()).catch_unwind().await {
        Ok(()) => {
            info!(
                task,
                cost_ms = started.elapsed().as_millis() as u64,
                "Scheduled task report"
            );
        }
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(task, panic = %reason, "Scheduled task panicked");
            if let Some(notifier) = notifier {
                let text = format!("Panic happened, doing `{task}`: {reason}");
                if let Err(e) = notifier.send(APP_TOPIC, &text).await {
                    debug!(task, error = %e, "Panic report dropped");
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::RecordingNotifier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_job_runs_repeatedly() {
        let scheduler = Scheduler::new(Duration::ZERO);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler.every("count", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(scheduler.len(), 1);

        sleep(Duration::from_millis(120)).await;
        scheduler.shutdown();
        assert!(runs.load(Ordering::SeqCst) >= 3);
        assert!(scheduler.is_empty());

        let after = runs.load(Ordering::SeqCst);
        sleep(Duration::from_millis(40)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn test_first_run_waits_one_period() {
        let scheduler = Scheduler::new(Duration::ZERO);
        let delayed = Arc::new(AtomicUsize::new(0));
        let immediate = Arc::new(AtomicUsize::new(0));

        let counter = delayed.clone();
        scheduler.every("report", Duration::from_millis(300), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let counter = immediate.clone();
        scheduler.every_from_now("tracker", Duration::from_millis(300), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        sleep(Duration::from_millis(100)).await;
        assert_eq!(delayed.load(Ordering::SeqCst), 0);
        assert_eq!(immediate.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(300)).await;
        scheduler.shutdown();
        assert_eq!(delayed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_job_survives() {
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = Scheduler::new(Duration::ZERO).with_panic_notifier(notifier.clone());
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        scheduler.every_from_now("psm check", Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("boom");
                }
            }
        });

        sleep(Duration::from_millis(80)).await;
        scheduler.shutdown();

        assert!(runs.load(Ordering::SeqCst) >= 2);
        let sent = notifier.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, APP_TOPIC);
        assert_eq!(sent[0].1, "Panic happened, doing `psm check`: boom");
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(Duration::from_millis(50)) < Duration::from_millis(50));
        }
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
