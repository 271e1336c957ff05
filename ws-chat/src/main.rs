use anyhow::Result;
use clap::Parser;
use tracing::warn;

use ws_chat::{
    cli::{Cli, Command},
    client,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Chat output owns stdout; logs go to stderr.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Chat(args) => client::run_chat(args).await,
        Command::Send(args) => client::run_send(args).await,
    };

    if let Err(err) = &outcome {
        warn!("chat client exited with error: {err:?}");
    }
    outcome
}
