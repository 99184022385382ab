use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Config;

struct Task {
    name: String,
    handle: JoinHandle<()>,
}

/// Lifecycle manager for the long-running tasks of the process.
///
/// Each task is started at most once (by name) and receives a child of the
/// app's cancellation token. `shutdown` cancels every task and waits for it.
pub struct App {
    config: Arc<Config>,
    cancel: CancellationToken,
    tasks: Vec<Task>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Start a named task.
    ///
    /// `make` receives the token the task must watch to stop. Returns `false`
    /// without spawning if a task with the same name was already started.
    pub fn spawn<F, Fut>(&mut self, name: &str, make: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.tasks.iter().any(|t| t.name == name) {
            tracing::warn!("Task {} already started, not starting it again", name);
            return false;
        }

        tracing::info!("Starting task: {}", name);
        let handle = tokio::spawn(make(self.cancel.child_token()));
        self.tasks.push(Task {
            name: name.to_string(),
            handle,
        });
        true
    }

    /// Names of all tasks started so far, in start order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    /// Token that fires when shutdown begins.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Cancel every task and wait for each to exit.
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down {} task(s)", self.tasks.len());
        self.cancel.cancel();

        for task in self.tasks.drain(..) {
            match task.handle.await {
                Ok(()) => tracing::debug!("Task {} stopped", task.name),
                Err(e) if e.is_panic() => tracing::error!("Task {} panicked: {}", task.name, e),
                Err(e) => tracing::warn!("Task {} did not stop cleanly: {}", task.name, e),
            }
        }

        tracing::info!("Shutdown complete");
    }

    /// Get reference to application config
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_spawn_runs_until_cancelled() {
        let mut app = App::new(Config::default());
        let stopped = Arc::new(AtomicUsize::new(0));

        let flag = stopped.clone();
        assert!(app.spawn("ticker", move |cancel| async move {
            cancel.cancelled().await;
            flag.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::task::yield_now().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 0);
        app.shutdown().await;
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_spawn_same_name_twice_is_refused() {
        let mut app = App::new(Config::default());
        let started = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = started.clone();
            app.spawn("ingest", move |cancel| {
                count.fetch_add(1, Ordering::SeqCst);
                async move { cancel.cancelled().await }
            });
        }

        assert_eq!(app.task_names(), vec!["ingest"]);
        assert_eq!(started.load(Ordering::SeqCst), 1);
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_survives_panicking_task() {
        let mut app = App::new(Config::default());
        app.spawn("boom", |_cancel| async move { panic!("task failure") });
        app.spawn("quiet", |cancel| async move { cancel.cancelled().await });
        app.shutdown().await;
    }
}
