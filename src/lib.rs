//! # dhcp-relay - A DHCPv4/BOOTP Relay Agent
//!
//! dhcp-relay forwards DHCP traffic between client broadcast domains and one
//! or more DHCP servers, following the relay agent rules of RFC 2131. It
//! never allocates addresses itself and keeps no state between packets.
//!
//! ## Features
//!
//! - Byte-exact BOOTP/DHCP message codec with opaque options
//! - Hop-count limiting and first-relay-wins `giaddr` stamping
//! - One independent relay task per interface, on Tokio
//! - YAML and command-line configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use dhcp_relay::{Interface, Relay, RelayConfig};
//! use std::net::Ipv4Addr;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::new(vec!["eth0".to_string()], vec![Ipv4Addr::new(10, 0, 1, 1)]);
//!     let interface = Interface::lookup("eth0").await?;
//!     let relay = Relay::bind(&interface, &config)?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     relay.run(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod relay;
pub mod v4;

pub use config::{Args, RelayConfig};
pub use error::RelayError;
pub use network::Interface;
pub use relay::{spawn_relays, Outcome, Relay, Transport};
pub use v4::{DhcpMessage, Opcode};
