//! Periodic task driver for the background cadences.
//!
//! Tasks run to completion before the next tick is scheduled, so a slow cycle
//! delays the following one instead of overlapping it. Shutdown is observed
//! between cycles, never mid-cycle.

use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// A task that runs periodically until told to stop.
pub trait ScheduledTask: Send + Sync + 'static {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>>;

    /// Checked between cycles; returning true ends the loop.
    fn should_terminate(&self) -> bool {
        false
    }
}

impl<T: ScheduledTask> ScheduledTask for Arc<T> {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        (**self).run()
    }

    fn should_terminate(&self) -> bool {
        (**self).should_terminate()
    }
}

pub struct ScheduledExecutor {
    interval: Duration,
    task_name: String,
    shutdown: Arc<AtomicBool>,
}

impl ScheduledExecutor {
    pub fn new(task_name: impl Into<String>, interval: Duration) -> Self {
        Self { task_name: task_name.into(), interval, shutdown: Arc::new(AtomicBool::new(false)) }
    }

    /// Handle for stopping the loop from outside.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Run the task now, then on every interval tick, until shutdown.
    pub async fn start<T>(self, task: T)
    where
        T: ScheduledTask,
    {
        let task_name = self.task_name;
        let interval_ms = self.interval.as_millis() as i64;
        let shutdown = self.shutdown;

        tracing::info!("Starting scheduled task '{}' with interval: {:?}", task_name, self.interval);

        loop {
            if shutdown.load(Ordering::Relaxed) || task.should_terminate() {
                tracing::info!("Scheduled task '{}' is shutting down", task_name);
                break;
            }

            tracing::debug!("Executing scheduled task '{}'", task_name);
            match task.run().await {
                Ok(()) => {
                    tracing::debug!("Scheduled task '{}' completed successfully", task_name);
                },
                Err(e) => {
                    tracing::error!("Scheduled task '{}' failed: {}", task_name, e);
                },
            }

            let next_execution = Utc::now().timestamp_millis() + interval_ms;
            loop {
                if shutdown.load(Ordering::Relaxed) || task.should_terminate() {
                    break;
                }
                let wait_ms = next_execution.saturating_sub(Utc::now().timestamp_millis());
                if wait_ms <= 0 {
                    break;
                }
                // Wake at most once a second so shutdown is not delayed by a
                // long interval.
                sleep(Duration::from_millis(wait_ms.min(1000) as u64)).await;
            }
        }

        tracing::info!("Scheduled task '{}' stopped", task_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct TestTask {
        counter: Arc<AtomicU32>,
        max_runs: u32,
    }

    impl ScheduledTask for TestTask {
        fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
            Box::pin(async move {
                self.counter.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        }

        fn should_terminate(&self) -> bool {
            self.counter.load(Ordering::Relaxed) >= self.max_runs
        }
    }

    #[tokio::test]
    async fn runs_until_terminated() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = TestTask { counter: counter.clone(), max_runs: 3 };

        let executor = ScheduledExecutor::new("test", Duration::from_millis(10));
        executor.start(task).await;

        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn first_run_is_immediate() {
        let counter = Arc::new(AtomicU32::new(0));
        let task = TestTask { counter: counter.clone(), max_runs: 1 };

        // A huge interval still lets the first execution happen right away.
        let executor = ScheduledExecutor::new("test", Duration::from_secs(3600));
        executor.start(task).await;

        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
