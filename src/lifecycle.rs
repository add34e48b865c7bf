//! Stop signal and join handle for background receiver tasks.

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Receiving half of a stop signal, owned by the background task.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once stop has been requested or every handle is gone.
    pub async fn stopped(&mut self) {
        // `wait_for` errs only when the sender dropped, which also means stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Create a linked sender/receiver pair.
pub fn stop_channel() -> (watch::Sender<bool>, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (tx, StopSignal { rx })
}

/// Owner-side handle for a spawned receiver task.
///
/// Dropping the handle also stops the task.
#[derive(Debug)]
pub struct TaskHandle {
    stop_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawn `task` on the current runtime, handing it the stop signal.
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, signal) = stop_channel();
        let join = tokio::spawn(task(signal));
        Self {
            stop_tx,
            join: Some(join),
        }
    }

    /// Request stop. Idempotent; a no-op once the task has exited.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Request stop and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        self.join_inner().await;
    }

    /// Wait for the task to exit without requesting stop.
    pub async fn join(mut self) {
        self.join_inner().await;
    }

    async fn join_inner(&mut self) {
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                if e.is_panic() {
                    tracing::error!(error = %e, "receiver task panicked");
                }
            }
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stop_is_observed_by_task() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let handle = TaskHandle::spawn(|mut stop| async move {
            stop.stopped().await;
            flag.store(true, Ordering::SeqCst);
        });
        handle.shutdown().await;
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_after_exit() {
        let handle = TaskHandle::spawn(|_stop| async {});
        tokio::task::yield_now().await;
        handle.stop();
        handle.stop();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn signal_reports_stopped_state() {
        let (tx, signal) = stop_channel();
        assert!(!signal.is_stopped());
        tx.send_replace(true);
        assert!(signal.is_stopped());
    }

    #[tokio::test]
    async fn dropping_sender_resolves_stopped() {
        let (tx, mut signal) = stop_channel();
        drop(tx);
        signal.stopped().await;
    }
}
