//! One-shot timer for proactive token refresh

use crate::lock;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

/// Holds at most one armed timer
///
/// Arming replaces (and cancels) whatever was armed before. When the timer
/// fires, the task is spawned on its own so that re-arming from inside the
/// task never cancels the work in progress.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
    armed: Mutex<Option<AbortHandle>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, cancelling any previously armed timer
    pub fn arm<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut armed = lock(&self.armed);
        if let Some(previous) = armed.take() {
            previous.abort();
        }

        debug!(delay_ms = delay.as_millis(), "Arming token refresh timer");
        // the deadline is taken from the clock now, not when the timer first polls
        let sleep = tokio::time::sleep(delay);
        let timer = tokio::spawn(async move {
            sleep.await;
            tokio::spawn(task);
        });
        *armed = Some(timer.abort_handle());
    }

    /// Cancel the armed timer, if any
    pub fn cancel(&self) {
        if let Some(previous) = lock(&self.armed).take() {
            debug!("Cancelling token refresh timer");
            previous.abort();
        }
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        lock(&self.armed)
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
