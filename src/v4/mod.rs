//! DHCPv4 protocol implementation
//!
//! This module contains the DHCPv4-specific implementation including:
//! - Wire codec for the BOOTP/DHCP message layout
//! - Relay policy applied to requests and replies

pub mod handler;
pub mod message;


pub use handler::{DiscardReason, RelayPolicy, Verdict};
pub use message::{AddressField, CodecError, DhcpMessage, Opcode};
