//! Event dispatcher
//!
//! Routes decoded gateway events to application handlers. Each delivery runs
//! on its own task, so a slow or panicking handler never stalls the read loop
//! or heartbeats.

use crate::events::{ClientEvent, DispatchEvent, OpEvent};
use crate::protocol::OpCode;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

type EventHandler = Arc<dyn Fn(DispatchEvent) -> BoxFuture<'static, ()> + Send + Sync>;
type OpHandler = Arc<dyn Fn(OpEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Default capacity of the lifecycle event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Handler registry shared by every session of a client
///
/// Cheap to clone; clones share handlers and counters.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Keyed by lowercased event name
    handlers: DashMap<String, EventHandler>,
    op_handlers: DashMap<OpCode, OpHandler>,
    events: broadcast::Sender<ClientEvent>,
    dispatched: AtomicU64,
    unhandled: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher reporting unhandled events on `events`
    #[must_use]
    pub fn new(events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                handlers: DashMap::new(),
                op_handlers: DashMap::new(),
                events,
                dispatched: AtomicU64::new(0),
                unhandled: AtomicU64::new(0),
            }),
        }
    }

    /// Register an async handler for an event name, replacing any previous one
    ///
    /// Names match case-insensitively.
    pub fn on<F, Fut>(&self, event: &str, handler: F)
    where
        F: Fn(DispatchEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |e| handler(e).boxed());
        self.insert(event, handler);
    }

    /// Register a synchronous handler; it runs on the blocking pool
    pub fn on_blocking<F>(&self, event: &str, handler: F)
    where
        F: Fn(DispatchEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let handler: EventHandler = Arc::new(move |e| {
            let handler = Arc::clone(&handler);
            async move {
                if let Err(e) = tokio::task::spawn_blocking(move || handler(e)).await {
                    tracing::error!(error = %e, "Blocking event handler failed");
                }
            }
            .boxed()
        });
        self.insert(event, handler);
    }

    /// Register an observer for a non-dispatch op code, replacing any previous one
    pub fn on_op<F, Fut>(&self, op: OpCode, handler: F)
    where
        F: Fn(OpEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: OpHandler = Arc::new(move |e| handler(e).boxed());
        if self.inner.op_handlers.insert(op, handler).is_some() {
            tracing::debug!(op = %op, "Replaced op handler");
        }
    }

    /// Remove the handler for an event name
    pub fn remove(&self, event: &str) -> bool {
        self.inner.handlers.remove(&handler_key(event)).is_some()
    }

    #[must_use]
    pub fn has_handler(&self, event: &str) -> bool {
        self.inner.handlers.contains_key(&handler_key(event))
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    /// Events handed to a handler so far
    #[must_use]
    pub fn dispatched_count(&self) -> u64 {
        self.inner.dispatched.load(Ordering::Relaxed)
    }

    /// Events that found no handler so far
    #[must_use]
    pub fn unhandled_count(&self) -> u64 {
        self.inner.unhandled.load(Ordering::Relaxed)
    }

    /// Lifecycle channel this dispatcher reports on
    #[must_use]
    pub fn lifecycle(&self) -> &broadcast::Sender<ClientEvent> {
        &self.inner.events
    }

    /// Deliver a Dispatch event; returns whether a handler took it
    ///
    /// Each event runs its handler on its own task. Calls happen in sequence
    /// order, but a handler for a later event can finish, or even start,
    /// before the handler for an earlier one. Handlers that need ordering
    /// should use [`DispatchEvent::sequence`].
    pub fn dispatch(&self, event: DispatchEvent) -> bool {
        let handler = self
            .inner
            .handlers
            .get(&handler_key(&event.name))
            .map(|entry| Arc::clone(entry.value()));

        let Some(handler) = handler else {
            self.inner.unhandled.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(event = %event.name, seq = ?event.sequence, "No handler for event");
            let _ = self.inner.events.send(ClientEvent::UnhandledEvent { name: event.name });
            return false;
        };

        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
        let name = event.name.clone();
        spawn_contained(handler(event), name);
        true
    }

    /// Deliver a non-dispatch envelope to its op observer, if one is registered
    pub fn observe(&self, event: OpEvent) -> bool {
        let handler = self
            .inner
            .op_handlers
            .get(&event.op)
            .map(|entry| Arc::clone(entry.value()));

        match handler {
            Some(handler) => {
                let name = event.op.name().to_string();
                spawn_contained(handler(event), name);
                true
            }
            None => false,
        }
    }

    fn insert(&self, event: &str, handler: EventHandler) {
        let key = handler_key(event);
        if self.inner.handlers.insert(key, handler).is_some() {
            tracing::debug!(event = %event, "Replaced event handler");
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(broadcast::channel(EVENT_CHANNEL_CAPACITY).0)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handler_count())
            .field("op_handlers", &self.inner.op_handlers.len())
            .field("dispatched", &self.dispatched_count())
            .field("unhandled", &self.unhandled_count())
            .finish()
    }
}

fn handler_key(event: &str) -> String {
    event.trim().to_ascii_lowercase()
}

fn spawn_contained(future: BoxFuture<'static, ()>, name: String) {
    tokio::spawn(async move {
        if AssertUnwindSafe(future).catch_unwind().await.is_err() {
            tracing::error!(event = %name, "Event handler panicked");
        }
    });
}
