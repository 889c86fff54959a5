//! Configuration for kiwi nodes
//!
//! Every field maps to an environment variable (`ROLE`, `NODE_ID`, `PORT`,
//! `GRPC_PORT`, `MASTER_ADDR`, `SLAVE_ADDRS`, `DB_PATH`); the `kiwi serve`
//! command reads them as flag fallbacks. The role is fixed for the lifetime
//! of the process; failover means restarting with a new configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Node role, set once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Replica,
}

impl NodeRole {
    pub fn is_master(&self) -> bool {
        matches!(self, NodeRole::Master)
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(NodeRole::Master),
            "replica" => Ok(NodeRole::Replica),
            other => Err(crate::Error::InvalidConfig(format!(
                "unknown role: {other} (expected master or replica)"
            ))),
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (unique identifier)
    pub node_id: String,

    /// Role (master or replica)
    pub role: NodeRole,

    /// HTTP API port
    pub port: u16,

    /// Internal replication gRPC port
    pub grpc_port: u16,

    /// Master address, informational on replicas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_addr: Option<String>,

    /// Replica gRPC addresses, master only
    #[serde(default)]
    pub replica_addrs: Vec<String>,

    /// Storage engine directory
    pub db_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: "node-1".to_string(),
            role: NodeRole::Master,
            port: 3300,
            grpc_port: 50051,
            master_addr: None,
            replica_addrs: vec![],
            db_path: PathBuf::from("./data"),
        }
    }
}

impl Config {
    /// Bind address for the HTTP API
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Bind address for the replication gRPC server
    pub fn grpc_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.grpc_port))
    }

    pub fn is_master(&self) -> bool {
        self.role.is_master()
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node_id.is_empty() {
            return Err(crate::Error::InvalidConfig("node_id is required".into()));
        }

        if self.port == self.grpc_port {
            return Err(crate::Error::InvalidConfig(
                "HTTP and gRPC ports must differ".into(),
            ));
        }

        if !self.is_master() && !self.replica_addrs.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "replica addresses are only valid on the master".into(),
            ));
        }

        Ok(())
    }
}
