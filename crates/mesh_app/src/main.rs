mod console;
mod logging;
mod paths;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use mesh_network::transport::{EVENT_CHANNEL_CAPACITY, UdpTransport, event_channel};
use mesh_network::{MeshConfig, MeshError, MeshNode, PeerAddress};

use console::Command;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often queued messages are printed, matching the web client's poll.
const DRAIN_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => paths::config_path()?,
    };

    let _log_guard = logging::init_logging(&paths::logs_dir()?)?;
    info!("Starting mesh-now v{VERSION}");

    let config = load_config(&config_path);
    let local = config.local_address.unwrap_or_else(PeerAddress::random);
    let drain_batch = config.drain_batch.max(1);

    let (event_tx, event_rx) = event_channel(EVENT_CHANNEL_CAPACITY);
    let transport = UdpTransport::bind(local, &config.udp, config.channel, event_tx)
        .await
        .with_context(|| format!("Failed to bind UDP transport on {}", config.udp.bind_addr))?;

    let mut node = MeshNode::new(config, Arc::new(transport), event_rx);
    node.start()?;

    println!("mesh-now {local} ready. Type /help for commands.");

    let result = run(&node, drain_batch).await;

    node.stop();
    for msg in node.drain_inbound(usize::MAX).await.messages {
        println!("{}", console::format_message(&msg));
    }
    info!("mesh-now stopped");
    result
}

/// Load the config, writing the defaults out on first run.
fn load_config(path: &std::path::Path) -> MeshConfig {
    let config = MeshConfig::load_or_default(path);
    if !path.exists() {
        match config.save_to_file(path) {
            Ok(()) => info!("Wrote default config to {}", path.display()),
            Err(e) => warn!("Could not write default config: {e}"),
        }
    }
    config
}

/// Console loop: stdin lines go out to all peers, queued messages are
/// printed every [`DRAIN_INTERVAL`]. Returns on `/quit`, EOF or Ctrl-C.
async fn run(node: &MeshNode, drain_batch: usize) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut poll = tokio::time::interval(DRAIN_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("stdin closed");
                    return Ok(());
                };
                if !handle_command(node, Command::parse(&line)).await? {
                    return Ok(());
                }
            }
            _ = poll.tick() => {
                for msg in node.drain_inbound(drain_batch).await.messages {
                    println!("{}", console::format_message(&msg));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }
    }
}

/// Execute one console command. Returns `false` when the loop should end.
async fn handle_command(node: &MeshNode, command: Command) -> Result<bool> {
    match command {
        Command::Send(text) => match node.enqueue_outbound(&text) {
            Ok(n) => println!("(sent to {n} peer(s))"),
            Err(MeshError::NoPeers) => println!("(no peers yet, message not sent)"),
            Err(MeshError::PartialFailure { failed, attempted }) => {
                println!("(send failed for {} of {attempted} peer(s))", failed.len());
            }
            Err(e) => return Err(e.into()),
        },
        Command::Peers => println!("{}", console::format_peers(&node.peer_entries())),
        Command::Stats => println!("{}", console::format_stats(&node.stats())),
        Command::Drain => {
            let batch = node.drain_inbound(node.config().drain_batch).await;
            println!("{}", console::format_batch_json(&batch)?);
        }
        Command::Help => println!("{}", console::HELP),
        Command::Quit => return Ok(false),
        Command::Empty => {}
        Command::Unknown(cmd) => println!("Unknown command /{cmd}. Type /help."),
    }
    Ok(true)
}
