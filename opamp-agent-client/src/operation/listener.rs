//! Registry of listeners interested in inbound server messages.
//!
//! Every listener declares, when registered, the [`MessageKind`]s it handles. A message
//! is delivered to every listener registered for its kind, in registration order.
//! A failing or panicking listener is logged and skipped; delivery to the rest goes on.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, trace};

use super::messages::{MessageKind, ServerMessage};

/// Error a listener may return.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by listeners.
pub type ListenerResult = Result<(), ListenerError>;

/// Handles inbound server messages of the kinds it was registered for.
pub trait Listener: Send + Sync {
    /// Called once per delivered message.
    fn on_message(&self, msg: &ServerMessage) -> ListenerResult;
}

impl<F> Listener for F
where
    F: Fn(&ServerMessage) -> ListenerResult + Send + Sync,
{
    fn on_message(&self, msg: &ServerMessage) -> ListenerResult {
        self(msg)
    }
}

/// Identifies a registration, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(usize);

/// A listener failure, isolated from the other listeners.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The listener returned an error.
    #[error("listener `{id:?}` failed handling `{kind}`: `{reason}`")]
    ListenerFailed {
        /// Listener registration.
        id: ListenerId,
        /// Kind of the message being handled.
        kind: MessageKind,
        /// Error returned by the listener.
        reason: String,
    },
    /// The listener panicked.
    #[error("listener `{id:?}` panicked handling `{kind}`")]
    ListenerPanicked {
        /// Listener registration.
        id: ListenerId,
        /// Kind of the message being handled.
        kind: MessageKind,
    },
}

/// Outcome of dispatching one message.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Listeners that handled the message successfully.
    pub delivered: usize,
    /// Failures of the remaining matching listeners.
    pub errors: Vec<DispatchError>,
}

struct Registration {
    id: ListenerId,
    listener: Arc<dyn Listener>,
}

/// Kind-keyed lists of listeners. Built before the client starts and read-only afterwards.
#[derive(Default)]
pub struct ListenerRegistry {
    by_kind: HashMap<MessageKind, Vec<Registration>>,
    registrations: usize,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kinds`. Duplicated kinds are delivered once; an empty
    /// list keeps the listener registered without ever calling it.
    pub fn register<I, L>(&mut self, kinds: I, listener: L) -> ListenerId
    where
        I: IntoIterator<Item = MessageKind>,
        L: Listener + 'static,
    {
        let id = ListenerId(self.registrations);
        self.registrations += 1;

        let listener: Arc<dyn Listener> = Arc::new(listener);
        let kinds: BTreeSet<MessageKind> = kinds.into_iter().collect();
        for kind in kinds {
            self.by_kind.entry(kind).or_default().push(Registration {
                id,
                listener: Arc::clone(&listener),
            });
        }
        id
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.registrations
    }

    /// Returns true if nothing was registered.
    pub fn is_empty(&self) -> bool {
        self.registrations == 0
    }

    /// Delivers `msg` to every listener registered for its kind.
    pub fn dispatch(&self, msg: &ServerMessage) -> DispatchReport {
        let kind = msg.kind();
        let mut report = DispatchReport::default();

        let Some(registrations) = self.by_kind.get(&kind) else {
            trace!(%kind, "no listener registered");
            return report;
        };

        for Registration { id, listener } in registrations {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_message(msg)));
            let err = match outcome {
                Ok(Ok(())) => {
                    report.delivered += 1;
                    continue;
                }
                Ok(Err(err)) => DispatchError::ListenerFailed {
                    id: *id,
                    kind,
                    reason: err.to_string(),
                },
                Err(_) => DispatchError::ListenerPanicked { id: *id, kind },
            };
            error!(%err, "listener error");
            report.errors.push(err);
        }
        report
    }
}

impl Debug for ListenerRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<_> = self
            .by_kind
            .iter()
            .map(|(kind, listeners)| (*kind, listeners.len()))
            .collect();
        counts.sort();
        f.debug_struct("ListenerRegistry")
            .field("registrations", &self.registrations)
            .field("by_kind", &counts)
            .finish()
    }
}
