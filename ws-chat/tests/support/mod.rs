//! Loopback WebSocket server standing in for the chat backend.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    net::TcpListener,
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
};

pub const WAIT: Duration = Duration::from_secs(3);

/// Accepts a single client and relays its text frames to the test.
pub struct LoopbackServer {
    pub url: String,
    received: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Message>,
    client_close: oneshot::Receiver<()>,
    task: JoinHandle<()>,
}

impl LoopbackServer {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (client_close_tx, client_close) = oneshot::channel();

        let task = tokio::spawn(serve_one(
            listener,
            received_tx,
            outbound_rx,
            client_close_tx,
        ));

        Ok(Self {
            url: format!("ws://{addr}/ws"),
            received,
            outbound,
            client_close,
            task,
        })
    }

    /// Queues a raw text frame for the client.
    pub fn push(&self, frame: &str) {
        let _ = self.outbound.send(Message::Text(frame.to_string()));
    }

    pub fn push_close(&self, code: CloseCode, reason: &str) {
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })));
    }

    /// Next text frame the client sent, parsed as JSON.
    pub async fn next_frame(&mut self) -> Result<Value> {
        let raw = timeout(WAIT, self.received.recv())
            .await
            .context("timed out waiting for a client frame")?
            .context("client connection ended")?;
        serde_json::from_str(&raw).with_context(|| format!("client sent invalid json: {raw}"))
    }

    /// Every remaining frame, collected until the client connection ends.
    pub async fn frames_until_closed(&mut self) -> Result<Vec<Value>> {
        let mut frames = Vec::new();
        loop {
            let next = timeout(WAIT, self.received.recv())
                .await
                .context("timed out waiting for the client to close")?;
            match next {
                Some(raw) => frames.push(serde_json::from_str(&raw)?),
                None => return Ok(frames),
            }
        }
    }

    /// Waits for the client's close frame, whether it started the close or answered ours.
    pub async fn client_close(&mut self) -> Result<()> {
        timeout(WAIT, &mut self.client_close)
            .await
            .context("timed out waiting for the client's close frame")?
            .context("client dropped the connection without a close frame")
    }

    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn serve_one(
    listener: TcpListener,
    received: mpsc::UnboundedSender<String>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    client_close: oneshot::Sender<()>,
) {
    let mut client_close = Some(client_close);
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut writer, mut reader) = socket.split();

    loop {
        select! {
            frame = reader.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = received.send(text);
                }
                Some(Ok(Message::Close(_))) => {
                    if let Some(client_close) = client_close.take() {
                        let _ = client_close.send(());
                    }
                    // Flushes the close reply tungstenite queued for us.
                    let _ = writer.close().await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            queued = outbound.recv() => match queued {
                Some(message) => {
                    if writer.send(message).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}
