//! Registry for background loops sharing one shutdown token.

use std::{future::Future, time::Duration};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct RegisteredTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            shutdown,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        debug!(target = "orderflow::tasks", task = name, "background task registered");
        self.tasks.push(RegisteredTask { name, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel every task and wait up to `grace` for them to finish. Stragglers are aborted.
    pub async fn shutdown(self, grace: Duration) {
        info!(
            target = "orderflow::tasks",
            count = self.tasks.len(),
            "stopping background tasks"
        );
        self.shutdown.cancel();

        let (names, handles): (Vec<_>, Vec<_>) = self
            .tasks
            .into_iter()
            .map(|task| (task.name, task.handle))
            .unzip();
        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        match tokio::time::timeout(grace, join_all(handles)).await {
            Ok(results) => {
                for (name, result) in names.iter().zip(results) {
                    match result {
                        Ok(()) => debug!(target = "orderflow::tasks", task = name, "task stopped"),
                        Err(err) => error!(
                            target = "orderflow::tasks",
                            task = name,
                            error = %err,
                            "task ended abnormally"
                        ),
                    }
                }
            }
            Err(_) => {
                warn!(
                    target = "orderflow::tasks",
                    grace_secs = grace.as_secs(),
                    "background tasks did not stop in time, aborting"
                );
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }

        info!(target = "orderflow::tasks", "background tasks stopped");
    }
}
