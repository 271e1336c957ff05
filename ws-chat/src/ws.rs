//! Native WebSocket connection built on `tokio-tungstenite`.
//!
//! [`WsSocket::open`] returns at once in [`ReadyState::Connecting`] and spawns
//! one task that performs the handshake, then multiplexes inbound frames and
//! queued outbound frames until either side closes. The task talks to the
//! handle through two unbounded channels and a shared atomic ready state.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use futures::{SinkExt, StreamExt};
use tokio::{select, sync::mpsc};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::CloseFrame, Error as WsError, Message},
};
use tracing::{debug, info, trace, warn};

use crate::socket::{
    CloseInfo, Connector, ReadyState, Socket, SocketError, SocketEvent, SocketEvents,
};

#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new(state: ReadyState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: ReadyState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Handle to a WebSocket connection task.
///
/// Dropping the handle closes the connection.
#[derive(Debug)]
pub struct WsSocket {
    state: SharedState,
    outbound: mpsc::UnboundedSender<Message>,
}

impl WsSocket {
    /// Starts connecting to `endpoint`. Must be called inside a Tokio runtime.
    pub fn open(endpoint: &str) -> (Self, SocketEvents) {
        let state = SharedState::new(ReadyState::Connecting);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = SocketEvents::channel();

        tokio::spawn(run_connection(
            endpoint.to_string(),
            state.clone(),
            outbound_rx,
            events_tx,
        ));

        (Self { state, outbound }, events)
    }
}

impl Socket for WsSocket {
    fn ready_state(&self) -> ReadyState {
        self.state.get()
    }

    fn send(&self, frame: String) -> Result<(), SocketError> {
        let state = self.state.get();
        if state != ReadyState::Open {
            return Err(SocketError::NotOpen(state));
        }
        self.outbound
            .send(Message::Text(frame))
            .map_err(|_| SocketError::WriterGone)
    }

    fn close(&self) {
        let requested = self.state.transition(ReadyState::Open, ReadyState::Closing)
            || self
                .state
                .transition(ReadyState::Connecting, ReadyState::Closing);
        if requested {
            // A missing writer means the task already finished on its own.
            let _ = self.outbound.send(Message::Close(None));
        }
    }
}

/// Connection factory producing [`WsSocket`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Socket = WsSocket;

    fn connect(&self, endpoint: &str) -> (WsSocket, SocketEvents) {
        WsSocket::open(endpoint)
    }
}

enum Ending {
    Closed(CloseInfo),
    Failed(String),
}

async fn run_connection(
    endpoint: String,
    state: SharedState,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    // Anything queued while connecting is a close request (or a dropped handle).
    let handshake = select! {
        result = connect_async(endpoint.as_str()) => Some(result),
        _ = outbound.recv() => None,
    };

    let mut stream = match handshake {
        Some(Ok((stream, response))) => {
            info!(%endpoint, status = %response.status(), "chat socket connected");
            stream
        }
        Some(Err(err)) => {
            warn!(%endpoint, error = %err, "chat socket failed to connect");
            finish(&state, &events, Ending::Failed(err.to_string()));
            return;
        }
        None => {
            debug!(%endpoint, "close requested during handshake, abandoning it");
            finish(&state, &events, Ending::Closed(CloseInfo::normal()));
            return;
        }
    };

    if !state.transition(ReadyState::Connecting, ReadyState::Open) {
        debug!(%endpoint, "close requested during handshake");
        if let Err(err) = stream.close(None).await {
            debug!(error = %err, "failed to close abandoned chat socket");
        }
        finish(&state, &events, Ending::Closed(CloseInfo::normal()));
        return;
    }
    emit(&events, SocketEvent::Open);

    let (mut writer, mut reader) = stream.split();
    let mut handle_alive = true;

    let ending = loop {
        select! {
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => emit(&events, SocketEvent::Message(text)),
                Some(Ok(Message::Close(frame))) => {
                    // Flushes the close reply tungstenite queued for the peer.
                    if let Err(err) = writer.close().await {
                        trace!(error = %err, "close reply not flushed");
                    }
                    break Ending::Closed(close_info(frame));
                }
                Some(Ok(other)) => trace!(len = other.len(), "ignoring non-text frame"),
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                    break Ending::Closed(CloseInfo::normal());
                }
                Some(Err(err)) => break Ending::Failed(err.to_string()),
                None => break Ending::Closed(CloseInfo::abnormal()),
            },
            queued = outbound.recv(), if handle_alive => {
                let message = match queued {
                    Some(message) => message,
                    None => {
                        // Handle dropped without close(): close on its behalf.
                        handle_alive = false;
                        state.set(ReadyState::Closing);
                        Message::Close(None)
                    }
                };
                if let Err(err) = writer.send(message).await {
                    break Ending::Failed(err.to_string());
                }
            }
        }
    };

    finish(&state, &events, ending);
}

fn finish(state: &SharedState, events: &mpsc::UnboundedSender<SocketEvent>, ending: Ending) {
    match ending {
        Ending::Closed(info) => {
            state.set(ReadyState::Closed);
            info!(code = ?info.code, reason = %info.reason, "chat socket closed");
            emit(events, SocketEvent::Close(info));
        }
        Ending::Failed(reason) => {
            state.set(ReadyState::Errored);
            warn!(%reason, "chat socket failed");
            emit(events, SocketEvent::Error(reason));
            emit(events, SocketEvent::Close(CloseInfo::abnormal()));
        }
    }
}

fn emit(events: &mpsc::UnboundedSender<SocketEvent>, event: SocketEvent) {
    if events.send(event).is_err() {
        trace!("socket event stream dropped");
    }
}

fn close_info(frame: Option<CloseFrame<'_>>) -> CloseInfo {
    match frame {
        Some(frame) => CloseInfo {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.into_owned(),
        },
        None => CloseInfo {
            code: None,
            reason: String::new(),
        },
    }
}
