//! Structured reporting for the failures the transport swallows.
//!
//! The transport never returns these to its caller. They go to the
//! [`DiagnosticSink`] chosen at construction, which defaults to [`NoopSink`].

use std::fmt;

use tracing::warn;

use crate::{envelope::EventKind, socket::ReadyState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A send was attempted while the connection was not open; the payload was dropped.
    SendDropped {
        envelope: &'static str,
        state: ReadyState,
    },
    /// The socket refused a frame even though it reported itself open.
    SendFailed {
        envelope: &'static str,
        reason: String,
    },
    EncodeFailed {
        envelope: &'static str,
        reason: String,
    },
    ListenerFailed {
        kind: EventKind,
        reason: String,
    },
    ListenerPanicked {
        kind: EventKind,
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SendDropped { envelope, state } => {
                write!(f, "dropped '{envelope}' envelope: connection is {state}")
            }
            Diagnostic::SendFailed { envelope, reason } => {
                write!(f, "failed to send '{envelope}' envelope: {reason}")
            }
            Diagnostic::EncodeFailed { envelope, reason } => {
                write!(f, "failed to encode '{envelope}' envelope: {reason}")
            }
            Diagnostic::ListenerFailed { kind, reason } => {
                write!(f, "'{kind}' listener failed: {reason}")
            }
            Diagnostic::ListenerPanicked { kind, reason } => {
                write!(f, "'{kind}' listener panicked: {reason}")
            }
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

impl<F> DiagnosticSink for F
where
    F: Fn(&Diagnostic) + Send + Sync,
{
    fn report(&self, diagnostic: &Diagnostic) {
        self(diagnostic)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn report(&self, _diagnostic: &Diagnostic) {}
}

/// Forwards diagnostics to `tracing` at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic {
            Diagnostic::SendDropped { envelope, state } => {
                warn!(envelope = *envelope, %state, "dropping envelope, chat connection not open");
            }
            Diagnostic::SendFailed { envelope, reason }
            | Diagnostic::EncodeFailed { envelope, reason } => {
                warn!(envelope = *envelope, reason = reason.as_str(), "{diagnostic}");
            }
            Diagnostic::ListenerFailed { kind, reason }
            | Diagnostic::ListenerPanicked { kind, reason } => {
                warn!(kind = kind.as_str(), reason = reason.as_str(), "{diagnostic}");
            }
        }
    }
}
