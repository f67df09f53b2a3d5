//! Handler registration.
//!
//! Handlers are registered explicitly during process initialization. Each
//! registration binds a handler to one event type with an order value;
//! lower orders run first and equal orders run in registration order. The
//! registry is wrapped in an `Arc` once wiring is complete and is read-only
//! from then on.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use meridian_core::error::DomainError;
use meridian_core::event::DomainEvent;

/// A component that reacts to domain events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handler name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Handles one event.
    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&DomainEvent) -> Result<(), DomainError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), DomainError> {
        (self.f)(event)
    }
}

/// Wraps a closure as a named handler.
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&DomainEvent) -> Result<(), DomainError> + Send + Sync + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// A handler bound to an event type and an order.
#[derive(Clone)]
pub struct HandlerInvocation {
    handler: Arc<dyn EventHandler>,
    event_type: String,
    order: i32,
    sequence: u64,
}

impl HandlerInvocation {
    /// Name of the bound handler.
    #[must_use]
    pub fn name(&self) -> &str {
        self.handler.name()
    }

    /// Event type the handler is bound to.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Order value; lower runs first.
    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Invokes the handler, reporting any failure as `DomainError::Handler`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Handler` naming this handler and event type.
    pub async fn invoke(&self, event: &DomainEvent) -> Result<(), DomainError> {
        self.handler.handle(event).await.map_err(|e| match e {
            DomainError::Handler { .. } => e,
            other => DomainError::Handler {
                handler: self.name().to_owned(),
                event_type: self.event_type.clone(),
                message: other.to_string(),
            },
        })
    }
}

impl fmt::Debug for HandlerInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInvocation")
            .field("handler", &self.name())
            .field("event_type", &self.event_type)
            .field("order", &self.order)
            .finish()
    }
}

/// Event type → ordered handler list.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<HandlerInvocation>>,
    next_sequence: u64,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event_type` at `order`.
    pub fn register(&mut self, event_type: &str, order: i32, handler: Arc<dyn EventHandler>) {
        let invocation = HandlerInvocation {
            handler,
            event_type: event_type.to_owned(),
            order,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;

        tracing::debug!(
            event_type,
            handler = invocation.name(),
            order,
            "registered event handler"
        );

        let list = self.handlers.entry(event_type.to_owned()).or_default();
        list.push(invocation);
        list.sort_by_key(|i| (i.order, i.sequence));
    }

    /// Handlers for `event_type` in invocation order.
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> &[HandlerInvocation] {
        self.handlers
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Event types with at least one handler, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
