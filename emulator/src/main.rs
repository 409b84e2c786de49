mod board;
mod repl;
mod server;

use std::net::SocketAddr;

use anyhow::Context as _;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::error;
use tracing_subscriber::EnvFilter;

use repl::ReplCommand;
use server::Hub;

/// Stand-in for the relay board's WebSocket bridge.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to accept relay clients on.
    #[arg(long, env = "PIN_EMULATOR_LISTEN", default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    let hub = Hub::new();
    let server = hub.clone();
    tokio::spawn(async move {
        if let Err(error) = server.serve(listener).await {
            error!(%error, "accept loop stopped");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Pin emulator ready. Type `help` for commands or `exit` to quit.\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            stdout.write_all(b"\n").await?;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let responses = match repl::parse(&line) {
            Ok(ReplCommand::Exit) => {
                stdout.write_all(b"Session closed.\n").await?;
                break;
            }
            Ok(command) => repl::execute(&hub, command),
            Err(_) => vec![format!("ERR syntax `{}` (try `help`)", line.trim())],
        };
        for response in responses {
            stdout.write_all(response.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
        }
    }

    Ok(())
}
