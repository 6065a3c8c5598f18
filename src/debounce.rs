//! Quiet-period scheduling for rapidly changing input.
//!
//! A newer `schedule` call cancels a pending one that has not fired yet.
//! Once the delay has elapsed the callback is detached from the scheduler:
//! work it started is never aborted, only its result may be ignored by the
//! caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<T, F>(&mut self, value: T, delay: Duration, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(value);
        }));
    }

    pub fn schedule_async<T, F, Fut>(&mut self, value: T, delay: Duration, callback: F)
    where
        T: Send + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(callback(value));
        }));
    }

    /// Drops the pending callback, if it has not fired.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            if !handle.is_finished() {
                debug!("cancelling pending debounced callback");
            }
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// An input whose committed value trails the raw one by a quiet period.
pub struct DebouncedValue<T> {
    debouncer: Debouncer,
    delay: Duration,
    committed: Arc<watch::Sender<T>>,
}

impl<T> DebouncedValue<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(initial: T, delay: Duration) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            debouncer: Debouncer::new(),
            delay,
            committed: Arc::new(tx),
        }
    }

    pub fn set(&mut self, value: T) {
        let committed = Arc::clone(&self.committed);
        self.debouncer.schedule(value, self.delay, move |value| {
            committed.send_replace(value);
        });
    }

    /// Commits right away, discarding anything still pending.
    pub fn commit_now(&mut self, value: T) {
        self.debouncer.cancel();
        self.committed.send_replace(value);
    }

    pub fn committed(&self) -> T {
        self.committed.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.committed.subscribe()
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}
