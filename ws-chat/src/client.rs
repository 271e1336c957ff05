use std::{io::Write, time::Duration};

use anyhow::{bail, Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    select,
    time::timeout,
};
use tracing::{info, warn};

use crate::{
    cli::{ChatArgs, SendArgs, SessionArgs},
    diagnostics::TracingSink,
    envelope::{ChatEvent, ChatMessage, EventKind, ParticipantJoined, ReadReceipt},
    registry::{listener, Listener},
    socket::{Socket, SocketEvents},
    transport::ChatTransport,
};

/// How long to wait for the server to acknowledge a close before giving up.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub async fn run_chat(args: ChatArgs) -> Result<()> {
    let session = args.session;
    let (chat, mut events) = ChatTransport::connect(&session.endpoint);
    let mut chat = chat_with_diagnostics(chat);
    register_renderers(&mut chat, &session);

    join_when_open(&chat, &mut events, &session).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    run_chat_loop(&chat, &mut events, &mut lines, &session).await?;
    shutdown(&mut chat, &mut events, &session).await;

    Ok(())
}

pub async fn run_send(args: SendArgs) -> Result<()> {
    let session = &args.session;
    let (chat, mut events) = ChatTransport::connect(&session.endpoint);
    let mut chat = chat_with_diagnostics(chat);
    chat.on(EventKind::Error, &error_renderer());

    join_when_open(&chat, &mut events, session).await?;
    chat.send_text(&session.thread, &session.user, &args.text);
    if args.mark_read {
        chat.send_read(&session.thread, &session.user);
    }
    shutdown(&mut chat, &mut events, session).await;

    write_stdout(&format!("*** sent to {}", session.thread))
}

fn chat_with_diagnostics(chat: ChatTransport) -> ChatTransport {
    chat.with_diagnostics(TracingSink)
}

async fn join_when_open(
    chat: &ChatTransport,
    events: &mut SocketEvents,
    session: &SessionArgs,
) -> Result<()> {
    if !chat.drive_until_open(events).await {
        bail!("failed to connect to {}", session.endpoint);
    }
    info!(endpoint = %session.endpoint, thread = %session.thread, "joining thread");
    chat.join(&session.thread, &session.user);
    Ok(())
}

async fn run_chat_loop<R>(
    chat: &ChatTransport,
    events: &mut SocketEvents,
    lines: &mut io::Lines<R>,
    session: &SessionArgs,
) -> Result<()>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    loop {
        select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let terminal = event.is_terminal();
                chat.dispatch(event);
                if terminal {
                    break;
                }
            }
            line = lines.next_line() => {
                if !handle_stdin_input(line, chat, session)? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(())
}

fn handle_stdin_input<S: Socket>(
    line: io::Result<Option<String>>,
    chat: &ChatTransport<S>,
    session: &SessionArgs,
) -> Result<bool> {
    let Some(line) = line.context("failed to read stdin")? else {
        return Ok(false);
    };

    let text = line.trim_end();
    if text.is_empty() {
        return Ok(true);
    }

    match text {
        "/quit" => {
            write_stdout("*** leaving chat")?;
            return Ok(false);
        }
        "/read" => chat.send_read(&session.thread, &session.user),
        "/leave" => {
            chat.leave(&session.thread);
            write_stdout(&format!("*** left {}", session.thread))?;
        }
        "/join" => chat.join(&session.thread, &session.user),
        _ => chat.send_text(&session.thread, &session.user, text),
    }
    Ok(true)
}

fn handle_ctrl_c(result: std::io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown(chat: &mut ChatTransport, events: &mut SocketEvents, session: &SessionArgs) {
    if chat.is_open() {
        chat.leave(&session.thread);
    }
    chat.close();
    if timeout(CLOSE_GRACE, chat.drive(events)).await.is_err() {
        warn!(endpoint = %session.endpoint, "chat server did not acknowledge close");
    }
}

fn register_renderers(chat: &mut ChatTransport, session: &SessionArgs) {
    let endpoint = session.endpoint.clone();
    chat.on(
        EventKind::Open,
        &listener(move |_| write_stdout(&format!("*** connected to {endpoint}"))),
    );

    chat.on(
        EventKind::Joined,
        &listener(|event| {
            let joined = event.decode::<ParticipantJoined>().unwrap_or_default();
            write_stdout(&format!(
                "*** {} joined {}",
                joined.user_id.as_deref().unwrap_or("someone"),
                joined.thread_id.as_deref().unwrap_or("the thread"),
            ))
        }),
    );

    let thread = session.thread.clone();
    chat.on(
        EventKind::Message,
        &listener(move |event| {
            let message: ChatMessage = event
                .decode()
                .context("message envelope is missing fields")?;
            if message.thread_id != thread {
                return Ok(());
            }
            write_stdout(&format!("<{}> {}", message.user_id, message.text))
        }),
    );

    chat.on(
        EventKind::Read,
        &listener(|event| {
            let receipt: ReadReceipt = event
                .decode()
                .context("read envelope is missing fields")?;
            write_stdout(&format!(
                "*** {} read {} at {}",
                receipt.user_id, receipt.thread_id, receipt.at
            ))
        }),
    );

    chat.on(
        EventKind::Close,
        &listener(|event| match event {
            ChatEvent::Close(info) if !info.reason.is_empty() => {
                write_stdout(&format!("*** connection closed: {}", info.reason))
            }
            _ => write_stdout("*** connection closed"),
        }),
    );

    chat.on(EventKind::Error, &error_renderer());
}

fn error_renderer() -> Listener {
    listener(|event| match event {
        ChatEvent::Error(reason) => write_stderr(&format!("!!! {reason}")),
        _ => Ok(()),
    })
}

fn write_stdout(line: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    stdout.flush()?;
    Ok(())
}

fn write_stderr(line: &str) -> Result<()> {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "{line}")?;
    stderr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::socket::{ReadyState, SocketError};

    #[derive(Clone, Default)]
    struct RecordingSocket {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Socket for RecordingSocket {
        fn ready_state(&self) -> ReadyState {
            ReadyState::Open
        }

        fn send(&self, frame: String) -> Result<(), SocketError> {
            self.sent.lock().expect("sent lock").push(frame);
            Ok(())
        }

        fn close(&self) {}
    }

    fn session() -> SessionArgs {
        SessionArgs {
            endpoint: "ws://chat.test/ws".into(),
            thread: "thread-1".into(),
            user: "user-42".into(),
        }
    }

    fn sent_types(socket: &RecordingSocket) -> Vec<String> {
        socket
            .sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|frame| {
                let value: serde_json::Value = serde_json::from_str(frame).expect("json frame");
                value["type"].as_str().unwrap_or_default().to_string()
            })
            .collect()
    }

    #[test]
    fn stdin_commands_map_to_envelopes() {
        let socket = RecordingSocket::default();
        let chat = ChatTransport::from_socket("ws://chat.test/ws", socket.clone());
        let session = session();

        for line in ["hello there", "", "/read", "/join"] {
            let keep_going = handle_stdin_input(Ok(Some(line.to_string())), &chat, &session)
                .expect("handled");
            assert!(keep_going);
        }

        assert_eq!(sent_types(&socket), vec!["message", "read", "join"]);
    }

    #[test]
    fn quit_and_eof_end_the_session() {
        let chat = ChatTransport::from_socket("ws://chat.test/ws", RecordingSocket::default());
        let session = session();

        assert!(!handle_stdin_input(Ok(Some("/quit".into())), &chat, &session).expect("quit"));
        assert!(!handle_stdin_input(Ok(None), &chat, &session).expect("eof"));
    }
}
