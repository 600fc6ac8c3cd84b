use std::{future::Future, time::Duration};

use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::sleep};

/// Trailing-edge debounced task.
///
/// Each [`Debouncer::call`] cancels the pending timer and schedules the new callback to run
/// once `window` has elapsed without another call. Only the timer is cancelled: a callback
/// that has already started runs to completion.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn call<F, Fut>(&self, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let timer = tokio::spawn(async move {
            sleep(window).await;
            tokio::spawn(callback());
        });

        if let Some(previous) = self.pending.lock().replace(timer) {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
