//! The asynchronous error sink emitted for pipeline and responder faults.

use coworkers_core::CoworkersError;
use coworkers_middleware::MessageContext;
use tokio::sync::mpsc;

/// An asynchronous fault reported by the message handler factory or the responder.
///
/// Emitted when a pipeline run fails (the responder is never invoked for
/// that message) or when the responder itself fails to ack/nack/publish
/// (the handler still resolves; this is the only way that failure is
/// observed by the integrator).
pub struct ErrorEvent {
    /// The error that occurred.
    pub error: CoworkersError,
    /// The context of the message being processed when the error occurred.
    pub context: MessageContext,
}

/// The receiving half of the application's error sink.
///
/// Returned once by [`crate::Application::new`] alongside the application
/// handle; every event is also logged via `tracing::error!` at the point of
/// failure, so nothing is silently lost if this receiver is dropped or left
/// undrained.
pub struct ErrorEvents {
    pub(crate) rx: mpsc::UnboundedReceiver<ErrorEvent>,
}

impl ErrorEvents {
    /// Awaits the next error event, or returns `None` once every sender
    /// (i.e. the owning [`crate::Application`]) has been dropped.
    pub async fn next(&mut self) -> Option<ErrorEvent> {
        self.rx.recv().await
    }
}
