use crate::error::RelayError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    path::{Path, PathBuf},
};

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;
pub const DEFAULT_MAX_HOP_COUNT: u8 = 4;

#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Network interface to relay on (e.g., 'eth0'); may be repeated
    #[arg(short, long = "interface")]
    pub interfaces: Vec<String>,

    /// DHCP server to forward client requests to; may be repeated
    #[arg(short, long = "server")]
    pub servers: Vec<Ipv4Addr>,

    /// Server-side port the relay listens on and forwards to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Client-side port replies are broadcast to
    #[arg(long)]
    pub client_port: Option<u16>,

    /// Requests with more hops than this are dropped
    #[arg(short, long = "max-hops")]
    pub max_hop_count: Option<u8>,

    /// Listen on the wildcard address pinned with SO_BINDTODEVICE (Linux)
    #[arg(long)]
    pub bind_to_device: bool,
}

/// Relay configuration, shared read-only by every per-interface relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Interfaces to relay on
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// DHCP servers, in forwarding order
    #[serde(default)]
    pub servers: Vec<Ipv4Addr>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_client_port")]
    pub client_port: u16,

    #[serde(default = "default_max_hop_count")]
    pub max_hop_count: u8,

    #[serde(default)]
    pub bind_to_device: bool,
}

fn default_port() -> u16 {
    DHCP_SERVER_PORT
}

fn default_client_port() -> u16 {
    DHCP_CLIENT_PORT
}

fn default_max_hop_count() -> u8 {
    DEFAULT_MAX_HOP_COUNT
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interfaces: Vec::new(),
            servers: Vec::new(),
            port: default_port(),
            client_port: default_client_port(),
            max_hop_count: default_max_hop_count(),
            bind_to_device: false,
        }
    }
}

impl RelayConfig {
    pub fn new(interfaces: Vec<String>, servers: Vec<Ipv4Addr>) -> Self {
        Self {
            interfaces,
            servers,
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Builds the effective configuration: the optional file first, then
    /// command-line flags on top.
    pub fn from_args(args: &Args) -> Result<Self, RelayError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    fn apply_args(&mut self, args: &Args) {
        if !args.interfaces.is_empty() {
            self.interfaces = args.interfaces.clone();
        }
        if !args.servers.is_empty() {
            self.servers = args.servers.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(client_port) = args.client_port {
            self.client_port = client_port;
        }
        if let Some(max_hop_count) = args.max_hop_count {
            self.max_hop_count = max_hop_count;
        }
        if args.bind_to_device {
            self.bind_to_device = true;
        }
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.interfaces.is_empty() {
            return Err(RelayError::InvalidConfig(
                "at least one interface is required".to_string(),
            ));
        }
        if self.servers.is_empty() {
            return Err(RelayError::InvalidConfig(
                "at least one DHCP server is required".to_string(),
            ));
        }
        if let Some(server) = self
            .servers
            .iter()
            .find(|s| s.is_unspecified() || s.is_broadcast())
        {
            return Err(RelayError::InvalidConfig(format!(
                "{server} is not a usable server address"
            )));
        }
        Ok(())
    }

    /// Server endpoints in configured order.
    pub fn server_endpoints(&self) -> Vec<SocketAddr> {
        self.servers
            .iter()
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(*ip, self.port)))
            .collect()
    }

    /// Limited-broadcast endpoint replies are sent to.
    pub fn client_endpoint(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, self.client_port))
    }
}
