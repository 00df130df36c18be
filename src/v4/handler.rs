//! BOOTP relay policy
//!
//! Decides, for a single decoded message, what the relay does with it and
//! applies the field mutations RFC 2131 section 4.1 asks of a relay agent.
//! No I/O happens here; the forwarder in [`crate::relay`] executes the
//! returned [`Verdict`].

use super::message::{CodecError, DhcpMessage, Opcode, CHADDR_LEN};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Why a packet was dropped instead of forwarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    #[error("invalid hlen {0}")]
    InvalidHardwareLength(u8),

    #[error("hop count {hops} exceeds the maximum of {max}")]
    HopCountExceeded { hops: u8, max: u8 },

    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),
}

/// What the forwarder should do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Unicast one copy to every configured server.
    ForwardToServers(DhcpMessage),
    /// Broadcast once on the client subnet.
    BroadcastToClients(DhcpMessage),
    Discard(DiscardReason),
    Ignore(Opcode),
}

/// Per-interface relay parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPolicy {
    relay_address: Ipv4Addr,
    max_hop_count: u8,
}

impl RelayPolicy {
    pub fn new(relay_address: Ipv4Addr, max_hop_count: u8) -> Self {
        Self {
            relay_address,
            max_hop_count,
        }
    }

    pub fn relay_address(&self) -> Ipv4Addr {
        self.relay_address
    }

    pub fn max_hop_count(&self) -> u8 {
        self.max_hop_count
    }

    pub fn apply(&self, message: DhcpMessage) -> Verdict {
        match message.opcode() {
            Opcode::BootRequest => self.handle_request(message),
            Opcode::BootReply => self.handle_reply(message),
            other => Verdict::Ignore(other),
        }
    }

    fn handle_request(&self, mut message: DhcpMessage) -> Verdict {
        if usize::from(message.hlen()) > CHADDR_LEN {
            return Verdict::Discard(DiscardReason::InvalidHardwareLength(message.hlen()));
        }

        // Checked before the increment.
        if message.hops() > self.max_hop_count {
            return Verdict::Discard(DiscardReason::HopCountExceeded {
                hops: message.hops(),
                max: self.max_hop_count,
            });
        }

        let hops = message.hops().wrapping_add(1);
        message.set_hops(hops);

        // First relay wins.
        if message.giaddr().is_unspecified() {
            message.set_giaddr(self.relay_address);
        }

        Verdict::ForwardToServers(message)
    }

    fn handle_reply(&self, mut message: DhcpMessage) -> Verdict {
        message.set_giaddr(Ipv4Addr::UNSPECIFIED);
        Verdict::BroadcastToClients(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: Ipv4Addr = Ipv4Addr::new(192, 168, 10, 1);

    fn request(hops: u8) -> DhcpMessage {
        let mut msg = DhcpMessage::default();
        msg.set_opcode(Opcode::BootRequest)
            .set_hops(hops)
            .set_xid(0xdead_beef)
            .set_client_hardware_address(&[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4])
            .unwrap();
        msg
    }

    fn forwarded(verdict: Verdict) -> DhcpMessage {
        match verdict {
            Verdict::ForwardToServers(msg) => msg,
            other => panic!("Expected ForwardToServers, got {other:?}"),
        }
    }

    #[test]
    fn test_request_at_hop_limit_is_forwarded_and_incremented() {
        let policy = RelayPolicy::new(RELAY, 4);
        let msg = forwarded(policy.apply(request(4)));
        assert_eq!(msg.hops(), 5);
    }

    #[test]
    fn test_request_over_hop_limit_is_discarded() {
        let policy = RelayPolicy::new(RELAY, 4);
        assert_eq!(
            policy.apply(request(5)),
            Verdict::Discard(DiscardReason::HopCountExceeded { hops: 5, max: 4 })
        );
    }

    #[test]
    fn test_hops_wrap_at_byte_width() {
        let policy = RelayPolicy::new(RELAY, u8::MAX);
        let msg = forwarded(policy.apply(request(u8::MAX)));
        assert_eq!(msg.hops(), 0);
    }

    #[test]
    fn test_invalid_hlen_is_discarded() {
        let policy = RelayPolicy::new(RELAY, 4);
        let mut msg = request(0);
        msg.set_hlen(17);
        assert_eq!(
            policy.apply(msg),
            Verdict::Discard(DiscardReason::InvalidHardwareLength(17))
        );
    }

    #[test]
    fn test_hlen_of_sixteen_is_accepted() {
        let policy = RelayPolicy::new(RELAY, 4);
        let mut msg = request(0);
        msg.set_hlen(16);
        assert_eq!(forwarded(policy.apply(msg)).hlen(), 16);
    }

    #[test]
    fn test_hlen_checked_before_hops() {
        let policy = RelayPolicy::new(RELAY, 4);
        let mut msg = request(9);
        msg.set_hlen(200);
        assert_eq!(
            policy.apply(msg),
            Verdict::Discard(DiscardReason::InvalidHardwareLength(200))
        );
    }

    #[test]
    fn test_unset_giaddr_gets_relay_address() {
        let policy = RelayPolicy::new(RELAY, 4);
        let msg = forwarded(policy.apply(request(0)));
        assert_eq!(msg.giaddr(), RELAY);
    }

    #[test]
    fn test_existing_giaddr_is_preserved() {
        let upstream = Ipv4Addr::new(10, 20, 30, 40);
        let policy = RelayPolicy::new(RELAY, 4);
        let mut msg = request(1);
        msg.set_giaddr(upstream);
        let msg = forwarded(policy.apply(msg));
        assert_eq!(msg.giaddr(), upstream);
        assert_eq!(msg.hops(), 2);
    }

    #[test]
    fn test_request_leaves_other_fields_alone() {
        let policy = RelayPolicy::new(RELAY, 4);
        let original = request(0);
        let msg = forwarded(policy.apply(original.clone()));
        assert_eq!(msg.xid(), original.xid());
        assert_eq!(msg.chaddr(), original.chaddr());
        assert_eq!(msg.options(), original.options());
    }

    #[test]
    fn test_reply_clears_giaddr() {
        let policy = RelayPolicy::new(RELAY, 4);
        let mut msg = DhcpMessage::default();
        msg.set_opcode(Opcode::BootReply)
            .set_giaddr(RELAY)
            .set_yiaddr(Ipv4Addr::new(192, 168, 10, 50))
            .set_hops(7);

        match policy.apply(msg) {
            Verdict::BroadcastToClients(reply) => {
                assert_eq!(reply.giaddr(), Ipv4Addr::UNSPECIFIED);
                assert_eq!(reply.yiaddr(), Ipv4Addr::new(192, 168, 10, 50));
                // Hop limit only applies to requests.
                assert_eq!(reply.hops(), 7);
            }
            other => panic!("Expected BroadcastToClients, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_opcode_is_ignored() {
        let policy = RelayPolicy::new(RELAY, 4);
        let mut msg = DhcpMessage::default();
        msg.set_opcode(Opcode::from(9u8));
        assert_eq!(policy.apply(msg), Verdict::Ignore(Opcode::Unknown(9)));
    }

    #[test]
    fn test_discard_reason_messages() {
        assert_eq!(
            DiscardReason::InvalidHardwareLength(17).to_string(),
            "invalid hlen 17"
        );
        assert_eq!(
            DiscardReason::HopCountExceeded { hops: 5, max: 4 }.to_string(),
            "hop count 5 exceeds the maximum of 4"
        );
    }
}
