//! Named publish/subscribe bus (mechanics only).
//!
//! The bus distributes a strongly-typed payload to every handler registered
//! under an event name. It is **in-process** and **synchronous in ordering**:
//!
//! - `emit` awaits each handler in registration order, one at a time
//! - a handler error stops the loop and is returned to the emitter
//! - emitting a name nobody subscribed to is a no-op
//!
//! Handlers that must never block their emitter (side effects after a committed
//! state change) are expected to catch and log their own failures.
//!
//! ## Registry
//!
//! The handler registry is the only mutable state and is guarded by an `RwLock`.
//! `emit` snapshots the handler list and releases the lock before awaiting, so a
//! handler may itself subscribe/unsubscribe without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::event::EventName;
use crate::handler::{Handler, HandlerResult};

struct Registered<P> {
    id: u64,
    handler: Handler<P>,
}

type Registry<N, P> = RwLock<HashMap<N, Vec<Registered<P>>>>;

/// In-process event bus keyed by a closed set of event names.
pub struct EventBus<N, P> {
    registry: Arc<Registry<N, P>>,
    next_id: AtomicU64,
    initialized: AtomicBool,
}

impl<N, P> Default for EventBus<N, P> {
    fn default() -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
        }
    }
}

impl<N, P> core::fmt::Debug for EventBus<N, P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<N, P> EventBus<N, P>
where
    N: EventName,
    P: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`.
    ///
    /// Handlers for one name run in registration order.
    pub fn on(&self, name: N, handler: Handler<P>) -> Subscription<N, P> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry
            .entry(name)
            .or_default()
            .push(Registered { id, handler });

        tracing::debug!(event = name.as_str(), handler_id = id, "event handler registered");

        Subscription {
            registry: Arc::downgrade(&self.registry),
            name,
            id,
        }
    }

    /// Deliver `payload` to every handler registered under `name`, sequentially.
    ///
    /// The first handler error aborts delivery and is returned; handlers after
    /// it do not run.
    pub async fn emit(&self, name: N, payload: P) -> HandlerResult {
        let handlers: Vec<Handler<P>> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            match registry.get(&name) {
                Some(list) => list.iter().map(|r| r.handler.clone()).collect(),
                None => return Ok(()),
            }
        };

        let payload = Arc::new(payload);
        for handler in handlers {
            handler(payload.clone()).await?;
        }
        Ok(())
    }

    /// Number of handlers currently registered under `name`.
    pub fn handler_count(&self, name: N) -> usize {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry.get(&name).map_or(0, Vec::len)
    }

    /// Run `init` exactly once over the lifetime of this bus.
    ///
    /// Returns `true` if `init` ran on this call, `false` if a previous call
    /// already claimed initialization.
    pub fn initialize_once(&self, init: impl FnOnce(&Self)) -> bool {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        init(self);
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

/// Handle returned by [`EventBus::on`]; removes the handler when `unsubscribe`d.
///
/// Dropping the handle keeps the handler registered.
pub struct Subscription<N, P> {
    registry: Weak<Registry<N, P>>,
    name: N,
    id: u64,
}

impl<N, P> core::fmt::Debug for Subscription<N, P>
where
    N: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl<N, P> Subscription<N, P>
where
    N: EventName,
{
    pub fn name(&self) -> N {
        self.name
    }

    /// Remove the handler. Returns `false` if it was already gone (or the bus dropped).
    pub fn unsubscribe(self) -> bool {
        let Some(shared) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = shared.write().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = registry.get_mut(&self.name) else {
            return false;
        };

        let before = list.len();
        list.retain(|r| r.id != self.id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.remove(&self.name);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use std::sync::Mutex;

    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    enum TestEvent {
        Created,
        Closed,
    }

    impl EventName for TestEvent {
        fn as_str(&self) -> &'static str {
            match self {
                TestEvent::Created => "test.created",
                TestEvent::Closed => "test.closed",
            }
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, tag: &'static str) -> Handler<u32> {
        let log = log.clone();
        handler_fn(move |payload: Arc<u32>| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{tag}:{payload}"));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn emit_without_handlers_is_a_no_op() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        assert!(bus.emit(TestEvent::Created, 1).await.is_ok());
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        let log: Log = Arc::default();
        let _a = bus.on(TestEvent::Created, recording(&log, "a"));
        let _b = bus.on(TestEvent::Created, recording(&log, "b"));
        let _c = bus.on(TestEvent::Closed, recording(&log, "c"));

        bus.emit(TestEvent::Created, 7).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a:7", "b:7"]);
    }

    #[tokio::test]
    async fn handlers_are_awaited_sequentially() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        let log: Log = Arc::default();

        let slow_log = log.clone();
        let _slow = bus.on(
            TestEvent::Created,
            handler_fn(move |_| {
                let log = slow_log.clone();
                async move {
                    log.lock().unwrap().push("slow:start".to_string());
                    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                    log.lock().unwrap().push("slow:end".to_string());
                    Ok(())
                }
            }),
        );
        let _fast = bus.on(TestEvent::Created, recording(&log, "fast"));

        bus.emit(TestEvent::Created, 1).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["slow:start", "slow:end", "fast:1"]
        );
    }

    #[tokio::test]
    async fn handler_error_propagates_and_stops_delivery() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        let log: Log = Arc::default();
        let _failing = bus.on(
            TestEvent::Created,
            handler_fn(|_| async { Err(anyhow::anyhow!("boom")) }),
        );
        let _after = bus.on(TestEvent::Created, recording(&log, "after"));

        let err = bus.emit(TestEvent::Created, 1).await.unwrap_err();

        assert_eq!(err.to_string(), "boom");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_handler() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        let log: Log = Arc::default();
        let a = bus.on(TestEvent::Created, recording(&log, "a"));
        let _b = bus.on(TestEvent::Created, recording(&log, "b"));

        assert!(a.unsubscribe());
        bus.emit(TestEvent::Created, 2).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["b:2"]);
        assert_eq!(bus.handler_count(TestEvent::Created), 1);
    }

    #[test]
    fn unsubscribing_the_last_handler_clears_the_name() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        let log: Log = Arc::default();
        let only = bus.on(TestEvent::Closed, recording(&log, "x"));

        assert!(only.unsubscribe());
        assert_eq!(bus.handler_count(TestEvent::Closed), 0);
    }

    #[test]
    fn initialize_once_runs_a_single_time() {
        let bus: EventBus<TestEvent, u32> = EventBus::new();
        let log: Log = Arc::default();

        let first = bus.initialize_once(|b| {
            let _ = b.on(TestEvent::Created, recording(&log, "init"));
        });
        let second = bus.initialize_once(|b| {
            let _ = b.on(TestEvent::Created, recording(&log, "init"));
        });

        assert!(first);
        assert!(!second);
        assert!(bus.is_initialized());
        assert_eq!(bus.handler_count(TestEvent::Created), 1);
    }
}
