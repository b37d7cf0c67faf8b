//! Notifications emitted by the supervisor to its observer.
//!
//! The observer is an injected sink: anything that can accept a
//! [`CoreEvent`] without blocking. Delivery is fire-and-forget — the
//! supervisor never waits for acknowledgment and a closed or dropped
//! observer is silently ignored.

use tokio::sync::mpsc::UnboundedSender;

/// A notification from the supervisor about the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// The configured ready keyword was seen in the worker's output.
    ///
    /// Emitted at most once per worker instance.
    Ready,
    /// A batch of output lines, joined with `\n`.
    LogBatch(String),
    /// The worker terminated. `error` is `None` on a clean exit and
    /// carries a human-readable description otherwise.
    Stopped {
        /// Exit error description, if the worker did not exit cleanly.
        error: Option<String>,
    },
}

/// Sink for supervisor notifications.
///
/// Implemented for unbounded channel senders and, via [`FnSink`], for
/// plain closures, so callers can pick whichever transport fits their
/// application.
pub trait EventSink: Send + Sync + 'static {
    /// Deliver an event. Must not block.
    fn emit(&self, event: CoreEvent);
}

impl EventSink for UnboundedSender<CoreEvent> {
    fn emit(&self, event: CoreEvent) {
        // Receiver gone means nobody is listening anymore; drop the event.
        let _ = self.send(event);
    }
}

/// Adapter turning a plain closure into an [`EventSink`].
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(CoreEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: CoreEvent) {
        (self.0)(event);
    }
}
