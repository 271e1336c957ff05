use clap::{Args, Parser, Subcommand};

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join a thread and chat interactively from the terminal.
    Chat(ChatArgs),
    /// Post a single message to a thread and exit.
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// WebSocket endpoint of the chat server.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Thread to join.
    #[arg(long)]
    pub thread: String,

    /// Participant id used for join, message and read envelopes.
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Also mark the thread read after sending.
    #[arg(long)]
    pub mark_read: bool,

    /// Message body.
    pub text: String,
}
