//! Cairn Storage Node
//!
//! Stores and retrieves files over a local simulated cluster using the
//! configured storage scheme. Peer data and the registry persist under the
//! data directory between runs.

use anyhow::Context;
use cairn_network::PeerTransport;
use cairn_node::{File, LocalCluster, NodeConfig, SchemeKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cairn-node")]
#[command(about = "Cairn peer-to-peer block storage node")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Storage directory (overrides config file)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Storage scheme (overrides config file)
    #[arg(short, long, global = true, value_enum)]
    scheme: Option<SchemeKind>,

    /// Node name (overrides config file)
    #[arg(short, long, global = true)]
    node_name: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a file
    Store {
        /// File to store
        path: PathBuf,

        /// Name to register the file under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,

        /// Store without a name; retrieve it later by checksum
        #[arg(long, conflicts_with = "name")]
        anonymous: bool,
    },

    /// Retrieve a file by name or block checksum
    Get {
        /// File name or hex checksum
        target: String,

        /// Where to write the file (defaults to the target)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List configured peers with their liveness and usage
    Peers,

    /// List stored files
    Files,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Priority: CLI args > environment > config file > defaults
    let config = NodeConfig::load_or_default(&cli.config)
        .with_env_overrides()
        .with_overrides(cli.node_name, cli.data_dir, cli.scheme);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        return Err(e.into());
    }

    info!(
        node_name = %config.node.name,
        scheme = %config.scheme.to_scheme(),
        data_dir = ?config.node.data_dir,
        peers = config.network.peers.len(),
        "Configuration loaded"
    );

    let cluster = LocalCluster::open(&config).context("Failed to open local cluster")?;
    let engine = cluster.engine(&config);

    match cli.command {
        Command::Store {
            path,
            name,
            anonymous,
        } => {
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;

            let name = if anonymous {
                None
            } else {
                name.or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
            };
            let file = File {
                name,
                data: data.into(),
            };

            let receipt = engine.store(file).await?;
            println!("{}", receipt.checksum);
            for placement in &receipt.placements {
                println!("  [{}] {} -> {}", placement.position, placement.checksum, placement.peer);
            }
        }

        Command::Get { target, output } => {
            let block = engine.get(&target).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&target));
            tokio::fs::write(&output, block.data())
                .await
                .with_context(|| format!("Failed to write {:?}", output))?;
            println!("{} bytes -> {:?}", block.len(), output);
        }

        Command::Peers => {
            let live = cluster.registry().live_peers().await;
            for peer in cluster.peers() {
                let stats = peer.stats()?;
                println!(
                    "{}\t{}\t{}\t{} blocks\t{} bytes",
                    peer.id(),
                    peer.address(),
                    if live.contains_key(peer.id()) { "live" } else { "down" },
                    stats.block_count,
                    stats.bytes_used
                );
            }
        }

        Command::Files => {
            for (name, checksum) in cluster.registry().files() {
                println!("{}\t{}", checksum, name);
            }
        }
    }

    Ok(())
}
