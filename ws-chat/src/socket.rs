//! Connection-factory abstraction the transport is written against.
//!
//! A [`Socket`] is the write half of a live connection: it reports its
//! [`ReadyState`], accepts text frames and can be closed. Everything the
//! connection observes (open, inbound text, close, error) arrives as a
//! [`SocketEvent`] on the [`SocketEvents`] stream returned next to it.

use std::fmt;

use tokio::sync::mpsc;

/// Close code reported when the connection ended without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code for an orderly shutdown.
pub const CLOSE_NORMAL: u16 = 1000;

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
    Errored = 4,
}

impl ReadyState {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            3 => ReadyState::Closed,
            _ => ReadyState::Errored,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadyState::Connecting => "connecting",
            ReadyState::Open => "open",
            ReadyState::Closing => "closing",
            ReadyState::Closed => "closed",
            ReadyState::Errored => "errored",
        }
    }

    /// True once the connection can no longer carry frames.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReadyState::Closed | ReadyState::Errored)
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close code and reason carried by the terminal close event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: Option<u16>,
    pub reason: String,
}

impl CloseInfo {
    pub fn normal() -> Self {
        Self {
            code: Some(CLOSE_NORMAL),
            reason: String::new(),
        }
    }

    pub fn abnormal() -> Self {
        Self {
            code: Some(CLOSE_ABNORMAL),
            reason: String::new(),
        }
    }
}

/// Notification produced by a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Close(CloseInfo),
    Error(String),
}

impl SocketEvent {
    /// The close event is always the last one a connection emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SocketEvent::Close(_))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SocketError {
    #[error("socket is not open (state: {0})")]
    NotOpen(ReadyState),
    #[error("socket writer has shut down")]
    WriterGone,
}

/// Write half of a live connection.
pub trait Socket {
    fn ready_state(&self) -> ReadyState;

    /// Queues one text frame. Fails without side effects unless the socket is open.
    fn send(&self, frame: String) -> Result<(), SocketError>;

    /// Starts closing the connection. Calling it again is a no-op.
    fn close(&self);
}

/// Creates live sockets for an endpoint address.
pub trait Connector {
    type Socket: Socket;

    /// Returns immediately; the handshake outcome arrives on the event stream.
    fn connect(&self, endpoint: &str) -> (Self::Socket, SocketEvents);
}

/// Ordered stream of events for one connection.
#[derive(Debug)]
pub struct SocketEvents {
    receiver: mpsc::UnboundedReceiver<SocketEvent>,
}

impl SocketEvents {
    /// Builds a stream together with the sender a socket implementation feeds.
    pub fn channel() -> (mpsc::UnboundedSender<SocketEvent>, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (sender, Self { receiver })
    }

    /// Waits for the next event. `None` once the connection task is gone.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        self.receiver.recv().await
    }

    /// Takes an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        self.receiver.try_recv().ok()
    }
}
