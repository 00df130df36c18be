//! Per-interface relay forwarder
//!
//! One [`Relay`] serves one interface: it receives BOOTP traffic on the
//! server port, runs each datagram through the [`RelayPolicy`] and sends
//! the result to the configured servers or back to the client subnet.
//! Datagrams are handled strictly one at a time, in arrival order.

use crate::{
    config::RelayConfig,
    error::RelayError,
    network::{self, Interface},
    v4::{DhcpMessage, DiscardReason, Opcode, RelayPolicy, Verdict},
};
use async_trait::async_trait;
use std::{
    future::Future,
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};
use tokio::{net::UdpSocket, sync::watch, task::JoinSet};

/// Largest datagram the relay reads in one receive.
const MAX_DATAGRAM_SIZE: usize = 1500;
/// Pause after a failed receive so a broken socket cannot spin the loop.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Datagram I/O used by the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl Transport for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }
}

/// Result of handling a single datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Forwarded { delivered: usize, failed: usize },
    Discarded(DiscardReason),
    Ignored(Opcode),
}

pub struct Relay<L = UdpSocket, S = UdpSocket> {
    interface: String,
    policy: RelayPolicy,
    servers: Vec<SocketAddr>,
    client_endpoint: SocketAddr,
    listener: L,
    sender: S,
}

impl Relay<UdpSocket, UdpSocket> {
    /// Binds the listen and send sockets for `interface`.
    ///
    /// The listener takes `(interface address, port)`, or the wildcard
    /// address pinned to the device when `bind_to_device` is set. The
    /// sender always takes `(interface address, client_port)`.
    pub fn bind(interface: &Interface, config: &RelayConfig) -> Result<Self, RelayError> {
        let (listen_addr, device) = if config.bind_to_device {
            (
                SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port),
                Some(interface.name.as_str()),
            )
        } else {
            (SocketAddrV4::new(interface.ipv4, config.port), None)
        };

        let listener = network::bind_udp(listen_addr, device)?;
        let sender = network::bind_udp(
            SocketAddrV4::new(interface.ipv4, config.client_port),
            None,
        )?;

        Ok(Self::with_transports(
            interface.name.clone(),
            interface.ipv4,
            config,
            listener,
            sender,
        ))
    }
}

impl<L: Transport, S: Transport> Relay<L, S> {
    pub fn with_transports(
        interface: impl Into<String>,
        address: Ipv4Addr,
        config: &RelayConfig,
        listener: L,
        sender: S,
    ) -> Self {
        Self {
            interface: interface.into(),
            policy: RelayPolicy::new(address, config.max_hop_count),
            servers: config.server_endpoints(),
            client_endpoint: config.client_endpoint(),
            listener,
            sender,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    /// Receives and relays datagrams until `shutdown` turns true or its
    /// sender is dropped. A datagram already received is always finished.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RelayError> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.listener.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    tracing::debug!(
                        "Received {} bytes from {} on {}",
                        len,
                        peer,
                        self.interface
                    );
                    self.handle_datagram(&buf[..len]).await;
                }
                Err(e) => {
                    tracing::warn!("Receive error on {}: {}", self.interface, e);
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Relay on {} stopped", self.interface);
        Ok(())
    }

    /// Decodes, applies relay policy to, and dispatches one datagram.
    pub async fn handle_datagram(&self, data: &[u8]) -> Outcome {
        let message = match DhcpMessage::decode(data) {
            Ok(message) => message,
            Err(e) => return self.discard(e.into()),
        };

        match self.policy.apply(message) {
            Verdict::ForwardToServers(message) => self.forward_to_servers(&message).await,
            Verdict::BroadcastToClients(message) => self.broadcast_to_clients(&message).await,
            Verdict::Discard(reason) => self.discard(reason),
            Verdict::Ignore(opcode) => {
                tracing::debug!(
                    "Ignoring packet with op {} received on {}",
                    opcode,
                    self.interface
                );
                Outcome::Ignored(opcode)
            }
        }
    }

    fn discard(&self, reason: DiscardReason) -> Outcome {
        tracing::warn!(
            "Discarding packet received on {}: {}",
            self.interface,
            reason
        );
        Outcome::Discarded(reason)
    }

    async fn forward_to_servers(&self, message: &DhcpMessage) -> Outcome {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => return self.discard(e.into()),
        };

        let mut delivered = 0;
        let mut failed = 0;
        for server in &self.servers {
            if self.send(message, &payload, *server).await {
                delivered += 1;
            } else {
                failed += 1;
            }
        }
        Outcome::Forwarded { delivered, failed }
    }

    async fn broadcast_to_clients(&self, message: &DhcpMessage) -> Outcome {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => return self.discard(e.into()),
        };

        if self.send(message, &payload, self.client_endpoint).await {
            Outcome::Forwarded {
                delivered: 1,
                failed: 0,
            }
        } else {
            Outcome::Forwarded {
                delivered: 0,
                failed: 1,
            }
        }
    }

    async fn send(&self, message: &DhcpMessage, payload: &[u8], target: SocketAddr) -> bool {
        match self.sender.send_to(payload, target).await {
            Ok(_) => {
                tracing::info!(
                    "Forwarded {} for {} to {}",
                    message.opcode(),
                    message.hardware_address_string(),
                    target.ip()
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to forward {} for {} to {}: {}",
                    message.opcode(),
                    message.hardware_address_string(),
                    target,
                    e
                );
                false
            }
        }
    }
}

/// Starts one relay task per interface name.
///
/// An interface `start` fails for is logged and skipped; the others still
/// run. Returns the set of running relay tasks, empty when none started.
pub async fn spawn_relays<L, S, F, Fut>(
    names: &[String],
    shutdown: &watch::Receiver<bool>,
    mut start: F,
) -> JoinSet<Result<(), RelayError>>
where
    L: Transport + 'static,
    S: Transport + 'static,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Relay<L, S>, RelayError>>,
{
    let mut relays = JoinSet::new();
    for name in names {
        match start(name.clone()).await {
            Ok(relay) => {
                tracing::debug!("Starting relay task for {}", relay.interface());
                relays.spawn(relay.run(shutdown.clone()));
            }
            Err(e) => {
                tracing::error!("Cannot relay on interface '{}': {}", name, e);
            }
        }
    }
    relays
}
