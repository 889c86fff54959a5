//! Kiwi server binary

use clap::{Parser, Subcommand};
use kiwi::{Config, Node, NodeRole};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kiwi")]
#[command(about = "kiwi replicated key-value store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a kiwi node
    Serve {
        /// Node ID
        #[arg(long, env = "NODE_ID", default_value = "node-1")]
        id: String,

        /// Node role
        #[arg(long, env = "ROLE", value_enum, default_value_t = NodeRole::Master)]
        role: NodeRole,

        /// HTTP API port
        #[arg(long, env = "PORT", default_value_t = 3300)]
        port: u16,

        /// Replication gRPC port
        #[arg(long, env = "GRPC_PORT", default_value_t = 50051)]
        grpc_port: u16,

        /// Master replication address (replicas only, informational)
        #[arg(long, env = "MASTER_ADDR")]
        master_addr: Option<String>,

        /// Replica replication addresses (master only, comma-separated)
        #[arg(long = "replicas", env = "SLAVE_ADDRS", value_delimiter = ',')]
        replica_addrs: Vec<String>,

        /// Storage directory
        #[arg(long = "db", env = "DB_PATH", default_value = "./data")]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            id,
            role,
            port,
            grpc_port,
            master_addr,
            replica_addrs,
            db_path,
        } => {
            let config = Config {
                node_id: id,
                role,
                port,
                grpc_port,
                master_addr,
                replica_addrs: replica_addrs.into_iter().filter(|a| !a.is_empty()).collect(),
                db_path,
            };
            config.validate()?;

            Node::new(config).serve().await?;
        }
    }

    Ok(())
}
