use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

/// Result returned by event handlers.
///
/// Errors are `anyhow` because handlers wrap heterogeneous collaborators
/// (document generation, notification delivery) whose error types the bus
/// has no reason to know about.
pub type HandlerResult = anyhow::Result<()>;

/// Type-erased async handler invoked with a shared payload.
///
/// Payloads are handed over as `Arc<P>` so every handler of one `emit`
/// observes the same value without cloning it per handler.
pub type Handler<P> = Arc<dyn Fn(Arc<P>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn handler_fn<P, F, Fut>(f: F) -> Handler<P>
where
    P: Send + Sync + 'static,
    F: Fn(Arc<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)) as BoxFuture<'static, HandlerResult>)
}
