//! Delivery of committed batches to a persister.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::context::WriteContext;
use crate::error::{AuditError, Result};
use crate::event::AuditEvent;
use crate::persister::Persister;

/// Listener run on a batch right before it is handed to the persister.
///
/// Listeners may attach meta information to events but cannot add, remove
/// or reorder them.
pub trait BeforeLog: Send + Sync + Debug {
    /// Inspects or annotates the batch.
    fn before_log(&self, events: &mut [AuditEvent]);
}

/// Drains a context's queue and delivers it as one batch.
#[derive(Debug, Clone)]
pub struct SinkDispatcher {
    persister: Arc<dyn Persister>,
    listeners: Vec<Arc<dyn BeforeLog>>,
}

impl SinkDispatcher {
    /// Creates a dispatcher delivering to `persister`.
    #[must_use]
    pub fn new(persister: Arc<dyn Persister>) -> Self {
        Self {
            persister,
            listeners: Vec::new(),
        }
    }

    /// Adds a before-log listener. Listeners run in registration order.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn BeforeLog>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Returns the configured persister.
    #[must_use]
    pub fn persister(&self) -> &Arc<dyn Persister> {
        &self.persister
    }

    /// Drains `ctx` and hands the batch to the persister.
    ///
    /// Does nothing when the queue is absent or empty, so repeated calls for
    /// the same operation deliver at most once. Returns the number of events
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::DeliveryFailed`] if the persister rejects the
    /// batch. The batch is not retried.
    pub fn flush(&self, ctx: &mut WriteContext, source_name: &str) -> Result<usize> {
        let mut events = ctx.drain();
        let Some(transaction) = events.first().map(AuditEvent::transaction_id) else {
            debug!(source = source_name, "No audit events to flush");
            return Ok(0);
        };

        for listener in &self.listeners {
            listener.before_log(&mut events);
        }

        let count = events.len();
        if let Err(source) = self.persister.log_events(&events) {
            error!(
                transaction_id = %transaction,
                source = source_name,
                persister = self.persister.name(),
                events = count,
                error = %source,
                "Failed to persist audit events"
            );
            return Err(AuditError::DeliveryFailed {
                persister: self.persister.name(),
                source_name: source_name.to_string(),
                transaction,
                count,
                source,
            });
        }

        info!(
            transaction_id = %transaction,
            source = source_name,
            persister = self.persister.name(),
            events = count,
            "Flushed audit events"
        );
        Ok(count)
    }
}
