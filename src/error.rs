use crate::{network::SocketError, v4::CodecError};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Socket operation failed")]
    Socket(#[from] SocketError),

    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("DHCP codec error")]
    Codec(#[from] CodecError),

    #[error("Failed to parse configuration file")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Interface '{0}' has no IPv4 address")]
    NoIpv4Address(String),
}
