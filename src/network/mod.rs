//! Interface discovery and UDP socket setup.

use crate::error::RelayError;
use bytes::{BufMut, Bytes, BytesMut};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket},
    num::ParseIntError,
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Defines all possible errors for socket operations.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to {addr}")]
    BindSocket {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[error("Binding to a specific device is not implemented on this platform")]
    NotImplemented,
}

/// Creates a `tokio::net::UdpSocket` bound to `addr`, optionally pinned to
/// a network device.
///
/// The socket always has `SO_BROADCAST` and `SO_REUSEADDR` set, so several
/// relays can share the DHCP ports and replies can be broadcast.
///
/// # Arguments
/// * `addr` - Local address and port to bind to.
/// * `device` - Interface name for `SO_BINDTODEVICE`, if any.
pub fn bind_udp(addr: SocketAddrV4, device: Option<&str>) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Socket, Type};

    // Create a socket2 socket, which allows setting options before binding.
    let socket2 =
        Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(SocketError::CreateSocket)?;

    socket2
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;

    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    if let Some(interface) = device {
        bind_to_device(&socket2, interface)?;
    }

    socket2
        .bind(&SocketAddr::V4(addr).into())
        .map_err(|source| SocketError::BindSocket { addr, source })?;

    // Convert to a standard socket, then into a Tokio socket.
    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &socket2::Socket, interface: &str) -> Result<(), SocketError> {
    use std::os::fd::AsRawFd;

    // Set `SO_BINDTODEVICE`. This is an unsafe raw syscall.
    // It is safe here because we use a valid file descriptor and correct parameters.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &socket2::Socket, _interface: &str) -> Result<(), SocketError> {
    Err(SocketError::NotImplemented)
}

/// A local network interface the relay serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub ipv4: Ipv4Addr,
    pub mac: Option<Bytes>,
}

impl Interface {
    /// Resolves an interface by name (case-insensitive) to its first IPv4
    /// address and, where the system exposes it, its MAC address.
    pub async fn lookup(name: &str) -> Result<Self, RelayError> {
        // Enumerating interfaces is a blocking system call.
        let addrs = tokio::task::spawn_blocking(get_if_addrs::get_if_addrs)
            .await
            .map_err(io::Error::other)??;
        let matching: Vec<_> = addrs
            .into_iter()
            .filter(|iface| iface.name.eq_ignore_ascii_case(name))
            .collect();

        let Some(first) = matching.first() else {
            return Err(RelayError::InterfaceNotFound(name.to_string()));
        };
        let canonical = first.name.clone();

        let ipv4 = first_ipv4(matching.iter().map(|iface| iface.ip()))
            .ok_or_else(|| RelayError::NoIpv4Address(canonical.clone()))?;
        let mac = read_mac_address(&canonical).await;

        Ok(Self {
            name: canonical,
            ipv4,
            mac,
        })
    }

    /// MAC address for log output, `unknown` when unavailable.
    pub fn mac_string(&self) -> String {
        self.mac
            .as_deref()
            .map(format_hardware_address)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn first_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> Option<Ipv4Addr> {
    addrs.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(_) => None,
    })
}

async fn read_mac_address(interface: &str) -> Option<Bytes> {
    let mac_path = format!("/sys/class/net/{interface}/address");
    match tokio::fs::read_to_string(&mac_path).await {
        Ok(mac_str) => match parse_mac_address(mac_str.trim()) {
            Ok(mac) => Some(mac),
            Err(e) => {
                tracing::debug!("Unparseable MAC address in {}: {}", mac_path, e);
                None
            }
        },
        Err(e) => {
            tracing::debug!("Could not read {}: {}", mac_path, e);
            None
        }
    }
}

/// Parses a MAC address string (e.g., "0a:1b:2c:3d:4e:5f") into a `Bytes` object.
pub fn parse_mac_address(mac_str: &str) -> Result<Bytes, ParseIntError> {
    let mut bytes = BytesMut::new();
    for byte_str in mac_str.split(':') {
        if !byte_str.is_empty() {
            let byte = u8::from_str_radix(byte_str, 16)?;
            bytes.put_u8(byte);
        }
    }
    Ok(bytes.freeze())
}

/// Formats hardware address bytes as colon-separated lowercase hex.
pub fn format_hardware_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_parse_mac_address() {
        let mac = parse_mac_address("00:0c:29:A8:92:f4").unwrap();
        assert_eq!(&mac[..], &[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4]);
        assert!(parse_mac_address("zz:00").is_err());
    }

    #[test]
    fn test_format_hardware_address() {
        assert_eq!(
            format_hardware_address(&[0x00, 0x0C, 0x29, 0xA8, 0x92, 0xF4]),
            "00:0c:29:a8:92:f4"
        );
        assert_eq!(format_hardware_address(&[]), "");
    }

    #[test]
    fn test_first_ipv4_skips_ipv6() {
        let addrs = [
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 11)),
        ];
        assert_eq!(first_ipv4(addrs), Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(first_ipv4([IpAddr::V6(Ipv6Addr::LOCALHOST)]), None);
    }

    #[test]
    fn test_mac_string_fallback() {
        let iface = Interface {
            name: "eth0".to_string(),
            ipv4: Ipv4Addr::new(10, 0, 0, 1),
            mac: None,
        };
        assert_eq!(iface.mac_string(), "unknown");
    }

    #[tokio::test]
    async fn test_bind_udp_on_loopback() {
        let socket = bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), None).unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.ip().is_loopback());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_lookup_unknown_interface() {
        let err = Interface::lookup("no-such-interface-0").await.unwrap_err();
        assert!(matches!(err, RelayError::InterfaceNotFound(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_lookup_loopback_case_insensitive() {
        let interface = Interface::lookup("LO").await.unwrap();
        assert_eq!(interface.name, "lo");
        assert_eq!(interface.ipv4, Ipv4Addr::LOCALHOST);
    }
}
