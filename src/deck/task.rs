//! Task handles and the completion delivery queue

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::debug;

pub(crate) type Delivery = Box<dyn FnOnce() + Send + 'static>;

/// Serialized delivery of completion callbacks.
///
/// Completions are never invoked inline from the call that registered them:
/// they are queued and a single worker runs them one at a time, so two
/// requests issued back-to-back cannot have their completions interleaved.
/// Playback hits, record-fallback completions, and passthrough errors all
/// go through the same queue, giving callers identical timing behavior.
#[derive(Clone)]
pub(crate) struct CompletionQueue {
    sender: mpsc::UnboundedSender<Delivery>,
}

impl CompletionQueue {
    /// Spawn the delivery worker. Requires a running tokio runtime.
    pub(crate) fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Delivery>();
        tokio::spawn(async move {
            // At most one completion in flight at a time
            while let Some(delivery) = receiver.recv().await {
                delivery();
            }
        });

        Self { sender }
    }

    pub(crate) fn schedule(&self, delivery: Delivery) {
        if self.sender.send(delivery).is_err() {
            debug!("Completion queue closed; delivery dropped");
        }
    }
}

/// Handle for one intercepted request, shaped like the host networking
/// API's task type: nothing happens until [`resume`](Self::resume).
pub struct PlaybackTask {
    trigger: Mutex<Option<Box<dyn FnOnce() + Send + 'static>>>,
}

impl PlaybackTask {
    pub(crate) fn new(trigger: Box<dyn FnOnce() + Send + 'static>) -> Self {
        Self {
            trigger: Mutex::new(Some(trigger)),
        }
    }

    /// A task with nothing to deliver
    pub(crate) fn noop() -> Self {
        Self {
            trigger: Mutex::new(None),
        }
    }

    /// Trigger delivery of this task's completion. Idempotent: calls after
    /// the first do nothing.
    pub fn resume(&self) {
        let trigger = self
            .trigger
            .lock()
            .expect("playback task lock poisoned")
            .take();
        if let Some(trigger) = trigger {
            trigger();
        }
    }

    /// No-op: playback is instantaneous and non-cancelable. Only the real
    /// network collaborator's own task honors cancellation.
    pub fn cancel(&self) {}

    /// No-op in playback mode
    pub fn suspend(&self) {}
}
