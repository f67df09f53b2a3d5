//! Meridian Event Bus: publishing and in-process dispatch.
//!
//! [`EventBus::publish`] appends an event to the store, dispatches it to the
//! locally registered handlers, then hands it to the distributed log. The
//! [`EventProcessor`] owns dispatch for both local and distributed
//! deliveries; handlers are registered explicitly in a [`HandlerRegistry`]
//! at startup.

pub mod error_handler;
pub mod processor;
pub mod publisher;
pub mod registry;
pub mod replay;

pub use error_handler::{ErrorHandler, LoggingErrorHandler, RetryCountingErrorHandler};
pub use processor::{DispatchReport, EventProcessor};
pub use publisher::{EventBus, PendingPublication};
pub use registry::{EventHandler, HandlerInvocation, HandlerRegistry, handler_fn};
pub use replay::{EntityHistory, EventReplayer, HistoryEntry};
