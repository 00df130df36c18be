use bytes::Bytes;
use dhcp_relay::{DhcpMessage, Opcode, Outcome, Relay, RelayConfig};
use std::{
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use tokio::{net::UdpSocket, sync::watch};

fn discover(hops: u8) -> Bytes {
    let mut msg = DhcpMessage::default();
    msg.set_opcode(Opcode::BootRequest)
        .set_hops(hops)
        .set_xid(0x1122_3344)
        .set_options(Bytes::from_static(&[99, 130, 83, 99, 53, 1, 1, 255]))
        .set_client_hardware_address(&[0x00, 0x0c, 0x29, 0xa8, 0x92, 0xf4])
        .unwrap();
    msg.encode().unwrap()
}

#[tokio::test]
async fn test_request_relayed_over_loopback() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_port = server.local_addr().unwrap().port();

    let mut config = RelayConfig::new(vec!["lo".to_string()], vec![Ipv4Addr::LOCALHOST]);
    config.port = server_port;

    let listener = dhcp_relay::network::bind_udp(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0), None)
        .unwrap();
    let listen_addr = listener.local_addr().unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sender_addr = sender.local_addr().unwrap();

    let relay = Relay::with_transports("lo", Ipv4Addr::LOCALHOST, &config, listener, sender);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(relay.run(shutdown_rx));

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&discover(0), listen_addr).await.unwrap();

    let mut buf = [0u8; 1500];
    let (len, from) = tokio::time::timeout(Duration::from_secs(5), server.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, sender_addr);
    assert_eq!(len, 236 + 8);

    let relayed = DhcpMessage::decode(&buf[..len]).unwrap();
    assert_eq!(relayed.opcode(), Opcode::BootRequest);
    assert_eq!(relayed.hops(), 1);
    assert_eq!(relayed.giaddr(), Ipv4Addr::LOCALHOST);
    assert_eq!(relayed.xid(), 0x1122_3344);
    assert_eq!(relayed.hardware_address_string(), "00:0c:29:a8:92:f4");

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_over_limit_request_reports_discard() {
    let config = RelayConfig::new(vec!["lo".to_string()], vec![Ipv4Addr::LOCALHOST]);
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay = Relay::with_transports("lo", Ipv4Addr::LOCALHOST, &config, listener, sender);

    let outcome = relay.handle_datagram(&discover(config.max_hop_count + 1)).await;
    assert!(matches!(outcome, Outcome::Discarded(_)));

    let outcome = relay.handle_datagram(&discover(config.max_hop_count)).await;
    assert!(matches!(outcome, Outcome::Forwarded { .. }));
}

#[test]
fn test_config_creation() {
    let config = RelayConfig::new(
        vec!["eth0".to_string()],
        vec![Ipv4Addr::new(10, 0, 1, 1)],
    );

    assert_eq!(config.interfaces, vec!["eth0"]);
    assert_eq!(config.port, 67);
    assert_eq!(config.client_port, 68);
    assert_eq!(config.max_hop_count, 4);
    assert_eq!(
        config.server_endpoints(),
        vec!["10.0.1.1:67".parse::<std::net::SocketAddr>().unwrap()]
    );
    assert!(config.validate().is_ok());
}
