// Single-slot coalescing write scheduler.
//
// At most one write is ever in flight. A save request arriving while a write
// is running is remembered as a single pending slot and served when the
// current write finishes - last-write-wins with bounded memory, never an
// unbounded queue. `tokio::sync::Notify` gives exactly this shape for free:
// `notify_one` stores at most one permit while nobody is waiting.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

use crate::core::leveling::StoreError;

pub struct CoalescingSaver {
    notify: Arc<Notify>,
    handle: tokio::task::JoinHandle<()>,
}

impl CoalescingSaver {
    /// Spawn the background worker. `write` snapshots and persists the
    /// current state; failures are logged and the worker keeps running, so
    /// one bad write never wedges persistence.
    pub fn spawn<F, Fut>(write: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send,
    {
        let notify = Arc::new(Notify::new());
        let worker_notify = Arc::clone(&notify);
        let handle = tokio::spawn(async move {
            loop {
                worker_notify.notified().await;
                if let Err(err) = write().await {
                    tracing::error!("background state save failed: {err}");
                }
            }
        });
        Self { notify, handle }
    }

    /// Request a save. Never blocks; requests during an in-flight write
    /// coalesce into one follow-up write.
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

impl Drop for CoalescingSaver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
