//! Listener contract and the notification task that drives it

use device_link_shared::LinkError;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Events emitted by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Socket established; always precedes the epoch's first message
    Connected,
    /// The current epoch ended
    Disconnected,
    /// Raw text as read from the socket, no framing applied
    MessageReceived(String),
    /// A failure or a misuse of the API
    Error(LinkError),
}

/// Receives connection notifications
///
/// Callbacks run on a dedicated notification task, one at a time, in the
/// order the events happened on the connection. A slow callback delays
/// later notifications but never the socket.
pub trait ConnectionListener: Send + Sync + 'static {
    fn on_connected(&self) {}

    fn on_disconnected(&self) {}

    fn on_message_received(&self, _text: &str) {}

    fn on_error(&self, _error: &LinkError) {}
}

/// Lets callers drain events from a channel instead of implementing callbacks
impl ConnectionListener for mpsc::UnboundedSender<ConnectionEvent> {
    fn on_connected(&self) {
        let _ = self.send(ConnectionEvent::Connected);
    }

    fn on_disconnected(&self) {
        let _ = self.send(ConnectionEvent::Disconnected);
    }

    fn on_message_received(&self, text: &str) {
        let _ = self.send(ConnectionEvent::MessageReceived(text.to_owned()));
    }

    fn on_error(&self, error: &LinkError) {
        let _ = self.send(ConnectionEvent::Error(error.clone()));
    }
}

/// The single registered listener, swappable at any time
pub(crate) type ListenerSlot = Arc<RwLock<Option<Arc<dyn ConnectionListener>>>>;

enum Notification {
    Event(ConnectionEvent),
    Shutdown,
}

/// Sending side of the notification task
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Queue an event; never blocks
    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(Notification::Event(event));
    }

    /// Deliver what is already queued, then stop the task
    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(Notification::Shutdown);
    }
}

fn deliver(listener: &dyn ConnectionListener, event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected => listener.on_connected(),
        ConnectionEvent::Disconnected => listener.on_disconnected(),
        ConnectionEvent::MessageReceived(text) => listener.on_message_received(text),
        ConnectionEvent::Error(error) => listener.on_error(error),
    }
}

/// Spawn the notification task for a manager
pub(crate) fn spawn_dispatcher(slot: ListenerSlot) -> (Notifier, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        while let Some(Notification::Event(event)) = rx.recv().await {
            // Don't hold the slot lock while user code runs
            let listener = slot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            match listener {
                Some(listener) => deliver(listener.as_ref(), &event),
                None => debug!("[LINK] No listener, dropping {:?}", event),
            }
        }
        debug!("[LINK] Notification task stopped");
    });

    (Notifier { tx }, handle)
}
