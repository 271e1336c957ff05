//! The chat transport: one connection, a listener registry, typed senders.
//!
//! Dispatch is driven by whoever owns the [`SocketEvents`] stream returned
//! from [`ChatTransport::connect`]. Each event is parsed and fanned out to
//! every listener of its kind before the next event is taken.
//!
//! Nothing here returns an error to the caller. Sends on a connection that is
//! not open are dropped, malformed frames are discarded, and failing listeners
//! are isolated; the first and last of those are reported to the
//! [`DiagnosticSink`].

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, NoopSink},
    envelope::{format_timestamp, ChatEvent, EventKind, Inbound, Outbound},
    registry::{HandlerRegistry, Listener},
    socket::{Connector, ReadyState, Socket, SocketEvent, SocketEvents},
    ws::{WsConnector, WsSocket},
};

pub struct ChatTransport<S: Socket = WsSocket> {
    endpoint: String,
    socket: S,
    registry: HandlerRegistry,
    diagnostics: Arc<dyn DiagnosticSink>,
    close_requested: bool,
}

impl ChatTransport<WsSocket> {
    /// Opens a WebSocket to `endpoint`. Must be called inside a Tokio runtime.
    ///
    /// ```no_run
    /// use ws_chat::{listener, ChatTransport, EventKind};
    ///
    /// # async fn example() {
    /// let (mut chat, mut events) = ChatTransport::connect("ws://127.0.0.1:8080/ws");
    /// chat.on(EventKind::Message, &listener(|event| {
    ///     tracing::info!(?event, "message");
    ///     Ok(())
    /// }));
    /// if chat.drive_until_open(&mut events).await {
    ///     chat.join("thread-1", "user-42");
    ///     chat.send_text("thread-1", "user-42", "is the pressing still available?");
    /// }
    /// chat.drive(&mut events).await;
    /// # }
    /// ```
    pub fn connect(endpoint: &str) -> (Self, SocketEvents) {
        Self::connect_with(&WsConnector, endpoint)
    }
}

impl<S: Socket> ChatTransport<S> {
    pub fn connect_with<C>(connector: &C, endpoint: &str) -> (Self, SocketEvents)
    where
        C: Connector<Socket = S>,
    {
        debug!(endpoint, "opening chat transport");
        let (socket, events) = connector.connect(endpoint);
        (Self::from_socket(endpoint, socket), events)
    }

    pub fn from_socket(endpoint: &str, socket: S) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            socket,
            registry: HandlerRegistry::new(),
            diagnostics: Arc::new(NoopSink),
            close_requested: false,
        }
    }

    pub fn with_diagnostics<D>(mut self, sink: D) -> Self
    where
        D: DiagnosticSink + 'static,
    {
        self.diagnostics = Arc::new(sink);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ready_state(&self) -> ReadyState {
        self.socket.ready_state()
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Subscribes `listener` to `kind`. Registering the same listener twice is a no-op.
    pub fn on(&mut self, kind: EventKind, listener: &Listener) {
        if !self.registry.insert(kind, listener) {
            trace!(kind = kind.as_str(), "listener already registered");
        }
    }

    pub fn off(&mut self, kind: EventKind, listener: &Listener) {
        self.registry.remove(kind, listener);
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry.len(kind)
    }

    /// Routes one socket event to the listeners registered for its kind.
    pub fn dispatch(&self, event: SocketEvent) {
        let event = match event {
            SocketEvent::Open => ChatEvent::Open,
            SocketEvent::Close(info) => ChatEvent::Close(info),
            SocketEvent::Error(reason) => ChatEvent::Error(reason),
            SocketEvent::Message(raw) => match Inbound::parse(&raw).into_event() {
                Some(event) => event,
                None => {
                    trace!(len = raw.len(), "discarding unrecognized frame");
                    return;
                }
            },
        };
        self.notify(&event);
    }

    /// Dispatches events until the connection reports its terminal close.
    pub async fn drive(&self, events: &mut SocketEvents) {
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            self.dispatch(event);
            if terminal {
                break;
            }
        }
    }

    /// Dispatches events until the connection opens. Returns false if it closed first.
    pub async fn drive_until_open(&self, events: &mut SocketEvents) -> bool {
        if self.is_open() {
            return true;
        }
        while let Some(event) = events.recv().await {
            let opened = event == SocketEvent::Open;
            let terminal = event.is_terminal();
            self.dispatch(event);
            if opened {
                return true;
            }
            if terminal {
                break;
            }
        }
        false
    }

    pub fn join(&self, thread_id: &str, self_id: &str) {
        self.send(&Outbound::Join {
            thread_id: thread_id.to_string(),
            self_id: self_id.to_string(),
        });
    }

    pub fn leave(&self, thread_id: &str) {
        self.send(&Outbound::Leave {
            thread_id: thread_id.to_string(),
        });
    }

    pub fn send_text(&self, thread_id: &str, self_id: &str, text: &str) {
        self.send(&Outbound::Message {
            thread_id: thread_id.to_string(),
            user_id: self_id.to_string(),
            text: text.to_string(),
        });
    }

    /// Marks `thread_id` read by `self_id` as of now.
    pub fn send_read(&self, thread_id: &str, self_id: &str) {
        self.send_read_at(thread_id, self_id, Utc::now());
    }

    pub fn send_read_at(&self, thread_id: &str, self_id: &str, at: DateTime<Utc>) {
        self.send(&Outbound::Read {
            thread_id: thread_id.to_string(),
            user_id: self_id.to_string(),
            at: format_timestamp(at),
        });
    }

    /// Closes the connection. Later calls do nothing.
    pub fn close(&mut self) {
        if self.close_requested {
            return;
        }
        self.close_requested = true;
        debug!(endpoint = %self.endpoint, "closing chat transport");
        self.socket.close();
    }

    fn send(&self, envelope: &Outbound) {
        let name = envelope.type_name();
        let state = self.socket.ready_state();
        if state != ReadyState::Open {
            self.report(Diagnostic::SendDropped {
                envelope: name,
                state,
            });
            return;
        }

        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(err) => {
                self.report(Diagnostic::EncodeFailed {
                    envelope: name,
                    reason: err.to_string(),
                });
                return;
            }
        };

        if let Err(err) = self.socket.send(frame) {
            self.report(Diagnostic::SendFailed {
                envelope: name,
                reason: err.to_string(),
            });
        }
    }

    /// Runs every listener for the event's kind. A panicking listener is caught
    /// and reported as [`Diagnostic::ListenerPanicked`], but the process panic
    /// hook still runs first, so the default hook prints its message to stderr.
    fn notify(&self, event: &ChatEvent) {
        let kind = event.kind();
        for listener in self.registry.snapshot(kind) {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => self.report(Diagnostic::ListenerFailed {
                    kind,
                    reason: format!("{err:#}"),
                }),
                Err(payload) => self.report(Diagnostic::ListenerPanicked {
                    kind,
                    reason: panic_message(payload.as_ref()),
                }),
            }
        }
    }

    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(&diagnostic);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
