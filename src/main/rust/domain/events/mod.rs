//! Typed event stream between playback backends and the session controller.
//!
//! Every event is wrapped in a [`SessionEnvelope`] naming the session it was
//! produced for. Backends only ever hold an [`EventSink`] bound to their own
//! session, so events from a torn-down session can be recognised and dropped.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::domain::value_objects::ProtocolError;

/// Generation counter identifying one `start` of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Manifest loaded and parsed; `levels` quality variants were found
    ManifestParsed { levels: usize, selected_level: usize },
    FragmentLoaded {
        sequence: u64,
        duration: f64,
        data: Bytes,
    },
    Error(ProtocolError),
    EndOfStream,
}

#[derive(Debug, Clone)]
pub struct SessionEnvelope {
    pub session: SessionId,
    pub event: SessionEvent,
}

impl SessionEnvelope {
    pub fn new(session: SessionId, event: SessionEvent) -> Self {
        Self { session, event }
    }
}

pub type SessionEvents = mpsc::UnboundedReceiver<SessionEnvelope>;

/// Sending half handed to a backend for the lifetime of one session
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEnvelope>,
    // Counts live listeners; see `SessionController::live_listeners`
    _listener: Arc<()>,
}

impl EventSink {
    pub fn new(
        session: SessionId,
        tx: mpsc::UnboundedSender<SessionEnvelope>,
        listener: Arc<()>,
    ) -> Self {
        Self {
            session,
            tx,
            _listener: listener,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns false once the controller is gone
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(SessionEnvelope::new(self.session, event))
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_events_with_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(SessionId(7), tx, Arc::new(()));

        assert!(sink.emit(SessionEvent::EndOfStream));

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.session, SessionId(7));
        assert!(matches!(envelope.event, SessionEvent::EndOfStream));
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(SessionId(1), tx, Arc::new(()));
        drop(rx);
        assert!(!sink.emit(SessionEvent::EndOfStream));
    }

    #[test]
    fn test_sink_holds_listener_token() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = Arc::new(());
        let sink = EventSink::new(SessionId(1), tx, token.clone());
        assert_eq!(Arc::strong_count(&token), 2);
        drop(sink);
        assert_eq!(Arc::strong_count(&token), 1);
    }
}
