//! Replication between running servers.

mod common;

use std::time::Duration;

use whoson::sync::SyncClient;
use whoson::{ServerConfig, Store, WhosonClient};

const CONVERGE: Duration = Duration::from_secs(5);

#[test]
fn writes_fan_out_to_every_peer() {
    let peer_b = common::start(common::local_config());
    let peer_c = common::start(common::local_config());
    let origin = common::start(ServerConfig {
        sync_remote: format!("{},{}", peer_b.control_addr(), peer_c.control_addr()),
        ..common::local_config()
    });

    let mut client = WhosonClient::dial("udp", origin.udp_addr().unwrap()).unwrap();
    assert!(client.login("10.1.1.1", "alice").unwrap().is_positive());

    for peer in [&peer_b, &peer_c] {
        assert!(common::wait_until(CONVERGE, || peer.store().get("10.1.1.1").is_some()));
        let replicated = peer.store().get("10.1.1.1").unwrap();
        let local = origin.store().get("10.1.1.1").unwrap();
        assert_eq!(replicated.data, "alice");
        assert_eq!(replicated.expire.timestamp(), local.expire.timestamp());
    }

    client.logout("10.1.1.1").unwrap();
    for peer in [&peer_b, &peer_c] {
        assert!(common::wait_until(CONVERGE, || peer.store().count() == 0));
    }

    origin.shutdown().unwrap();
    peer_b.shutdown().unwrap();
    peer_c.shutdown().unwrap();
}

#[test]
fn replicated_writes_are_not_forwarded_again() {
    // b replicates to c, but a write arriving at b from a must stay on b
    let peer_c = common::start(common::local_config());
    let peer_b = common::start(ServerConfig {
        sync_remote: peer_c.control_addr().to_string(),
        ..common::local_config()
    });
    let origin = common::start(ServerConfig {
        sync_remote: peer_b.control_addr().to_string(),
        ..common::local_config()
    });

    let mut client = WhosonClient::dial("udp", origin.udp_addr().unwrap()).unwrap();
    client.login("10.2.2.2", "bob").unwrap();
    assert!(common::wait_until(CONVERGE, || peer_b.store().get("10.2.2.2").is_some()));
    assert!(!common::wait_until(Duration::from_millis(500), || peer_c.store().count() > 0));

    origin.shutdown().unwrap();
    peer_b.shutdown().unwrap();
    peer_c.shutdown().unwrap();
}

#[test]
fn unreachable_peer_does_not_affect_clients() {
    let unreachable = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let origin = common::start(ServerConfig {
        sync_remote: unreachable.to_string(),
        ..common::local_config()
    });

    let mut client = WhosonClient::dial("tcp", origin.tcp_addr().unwrap()).unwrap();
    for i in 0..64 {
        let ip = format!("10.3.0.{}", i);
        assert_eq!(client.login(&ip, "x").unwrap().to_string(), "+LOGIN OK");
    }
    assert_eq!(origin.store().count(), 64);
    client.quit().unwrap();
    origin.shutdown().unwrap();
}

#[test]
fn rpc_service_applies_and_dumps() {
    let server = common::start(common::local_config());
    let mut rpc = SyncClient::connect(server.control_addr()).unwrap();

    let expire = chrono::Utc::now().timestamp() + 600;
    assert!(rpc.set("10.4.4.4".to_string(), "carol".to_string(), expire).unwrap().is_ok());
    assert!(rpc.del("10.4.4.5".to_string()).unwrap().rcode != whoson::sync::RCODE_OK);

    let dump = rpc.dump().unwrap();
    assert!(dump.json.contains("carol"));

    let mut client = WhosonClient::dial("udp", server.udp_addr().unwrap()).unwrap();
    assert_eq!(client.query("10.4.4.4").unwrap().to_string(), "+carol");

    drop(rpc);
    server.shutdown().unwrap();
}
