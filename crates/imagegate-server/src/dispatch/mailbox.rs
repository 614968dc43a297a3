//! Per-request result routing.
//!
//! `original_source/src/processing.py::WorkerPool` routes worker output back
//! to callers by having the worker re-enqueue unconsumed results onto a
//! shared queue for every other waiter to poll and discard — cooperative,
//! single-process, and does not translate to a multi-task Rust server
//! (spec.md §9 calls this out explicitly as the one piece of the original
//! architecture to redesign rather than port).
//!
//! Here, each in-flight request registers an `mpsc::Sender<ResultEvent>`
//! under its `request_id` before dispatch; workers look the sender up and
//! send directly, one hop, no re-enqueue.

use std::collections::HashMap;
use std::sync::Arc;

use imagegate_core::ResultEvent;
use tokio::sync::{Mutex, mpsc};

const MAILBOX_CAPACITY: usize = 64;

/// Shared table of in-flight requests' result channels. Cloned cheaply
/// (`Arc` inside) and handed to both the HTTP handlers (to register/consume)
/// and the worker pool (to deliver).
#[derive(Clone)]
pub struct MailboxRegistry {
    inner: Arc<Mutex<HashMap<String, mpsc::Sender<ResultEvent>>>>,
}

impl Default for MailboxRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a fresh mailbox for `request_id`, returning the receiving
    /// half for the HTTP handler to poll. Panics if `request_id` is already
    /// registered — request ids are server-generated and unique, so a
    /// collision indicates a bug upstream, not a client error.
    pub async fn register(&self, request_id: String) -> mpsc::Receiver<ResultEvent> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let mut guard = self.inner.lock().await;
        let previous = guard.insert(request_id.clone(), tx);
        assert!(
            previous.is_none(),
            "request_id {request_id} registered twice"
        );
        rx
    }

    /// Delivers an event to the request's mailbox, if still registered.
    /// Silently drops the event otherwise — the caller disconnected (client
    /// dropped the stream) and no longer cares, per spec.md §9's known
    /// limitation: there is no cancellation signal back to the worker, so
    /// the worker runs to completion regardless.
    pub async fn deliver(&self, event: ResultEvent) {
        let sender = {
            let guard = self.inner.lock().await;
            guard.get(event.request_id()).cloned()
        };
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        } else {
            tracing::debug!(request_id = event.request_id(), "dropping event for unregistered/closed mailbox");
        }
    }

    /// Removes `request_id`'s mailbox once the HTTP handler has finished
    /// consuming it (stream ended, or the request's sole response was
    /// sent).
    pub async fn unregister(&self, request_id: &str) {
        self.inner.lock().await.remove(request_id);
    }

    pub async fn inflight_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_to_the_registered_request_only() {
        let registry = MailboxRegistry::new();
        let mut rx_a = registry.register("req-a".into()).await;
        let mut rx_b = registry.register("req-b".into()).await;
        assert_eq!(registry.inflight_count().await, 2);

        registry
            .deliver(ResultEvent::Completed {
                request_id: "req-a".into(),
                data: None,
            })
            .await;

        let received = rx_a.recv().await.expect("req-a should receive its event");
        assert_eq!(received.request_id(), "req-a");
        assert!(
            rx_b.try_recv().is_err(),
            "req-b's mailbox must not see req-a's event"
        );
    }

    #[tokio::test]
    async fn delivery_to_an_unregistered_request_is_a_silent_no_op() {
        let registry = MailboxRegistry::new();
        // No register() call for "ghost" — must not panic or block.
        registry
            .deliver(ResultEvent::Error {
                request_id: "ghost".into(),
                message: "unused".into(),
            })
            .await;
        assert_eq!(registry.inflight_count().await, 0);
    }

    #[tokio::test]
    async fn unregister_removes_the_mailbox() {
        let registry = MailboxRegistry::new();
        let _rx = registry.register("req-a".into()).await;
        assert_eq!(registry.inflight_count().await, 1);
        registry.unregister("req-a").await;
        assert_eq!(registry.inflight_count().await, 0);
    }

    #[test]
    fn register_panics_on_duplicate_request_id() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = std::panic::catch_unwind(|| {
            rt.block_on(async {
                let registry = MailboxRegistry::new();
                let _first = registry.register("dup".into()).await;
                let _second = registry.register("dup".into()).await;
            })
        });
        assert!(result.is_err());
    }
}
