//! Ownership of background tasks.
//!
//! # Responsibilities
//! - Spawn named tasks, handing each a shutdown receiver
//! - On stop: broadcast shutdown, join every task, abort stragglers
//!
//! # Design Decisions
//! - Tasks are joined in spawn order; the deadline is shared, not per task
//! - A panicking task is logged and does not prevent the others from
//!   being joined

use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::lifecycle::Shutdown;

struct Supervised {
    name: String,
    handle: JoinHandle<()>,
}

/// Outcome of [`Supervisor::stop`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    pub finished: usize,
    pub panicked: usize,
    pub aborted: usize,
}

pub struct Supervisor {
    shutdown: Shutdown,
    tasks: Vec<Supervised>,
}

impl Supervisor {
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Spawn `task` with its own shutdown receiver.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(task(self.shutdown.subscribe()));
        tracing::debug!(task = %name, "Supervised task started");
        self.tasks.push(Supervised { name, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Trigger shutdown and wait up to `grace` for every task to finish.
    pub async fn stop(self, grace: Duration) -> StopReport {
        self.shutdown.trigger();
        let deadline = Instant::now() + grace;
        let mut report = StopReport::default();

        for Supervised { name, mut handle } in self.tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.finished += 1,
                Ok(Err(e)) => {
                    tracing::error!(task = %name, error = %e, "Supervised task failed");
                    report.panicked += 1;
                }
                Err(_) => {
                    tracing::warn!(task = %name, "Supervised task did not stop in time, aborting");
                    handle.abort();
                    report.aborted += 1;
                }
            }
        }

        tracing::info!(
            finished = report.finished,
            panicked = report.panicked,
            aborted = report.aborted,
            "Supervisor stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_joins_cooperative_tasks() {
        let mut supervisor = Supervisor::new(Shutdown::new());
        let exited = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let exited = exited.clone();
            supervisor.spawn(format!("loop-{}", i), move |mut shutdown| async move {
                let _ = shutdown.recv().await;
                exited.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(supervisor.task_names(), vec!["loop-0", "loop-1", "loop-2"]);

        let report = supervisor.stop(Duration::from_secs(1)).await;
        assert_eq!(report.finished, 3);
        assert_eq!(exited.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stop_aborts_stuck_task() {
        let mut supervisor = Supervisor::new(Shutdown::new());
        supervisor.spawn("stuck", |_shutdown| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        supervisor.spawn("panics", |_shutdown| async {
            panic!("boom");
        });

        let report = supervisor.stop(Duration::from_millis(50)).await;
        assert_eq!(report.aborted, 1);
        assert_eq!(report.panicked, 1);
    }
}
