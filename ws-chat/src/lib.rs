//! WebSocket chat transport for the record shop's buyer/seller threads.
//!
//! A [`ChatTransport`] owns one connection to the chat server, parses inbound
//! JSON envelopes, fans them out to listeners registered per [`EventKind`],
//! and sends the four outbound envelopes (`join`, `leave`, `message`, `read`).
//! It never reconnects, never queues, and never returns an error to its
//! caller; failures go to a [`DiagnosticSink`].
//!
//! - [`envelope`] defines the wire envelopes and the events listeners see.
//! - [`registry`] keeps the ordered, de-duplicated listener sets.
//! - [`diagnostics`] carries the failures the transport swallows.
//! - [`socket`] is the connection-factory seam the transport is written against.
//! - [`ws`] implements that seam with `tokio-tungstenite`.
//! - [`transport`] ties them together.
//! - [`cli`] and [`client`] are the terminal client shipped as the `ws-chat` binary.

pub mod cli;
pub mod client;
pub mod diagnostics;
pub mod envelope;
pub mod registry;
pub mod socket;
pub mod transport;
pub mod ws;

pub use diagnostics::{Diagnostic, DiagnosticSink, NoopSink, TracingSink};
pub use envelope::{ChatEvent, ChatMessage, EventKind, ParticipantJoined, ReadReceipt};
pub use registry::{listener, Listener};
pub use socket::{CloseInfo, ReadyState, SocketEvent, SocketEvents};
pub use transport::ChatTransport;
