//! Common test utilities.
//!
//! Import with `mod common;` in test files.
#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use whoson::{RunningServer, ServerConfig, WhosonServer};

/// A server configuration bound to ephemeral loopback ports, logging nowhere
pub fn local_config() -> ServerConfig {
    ServerConfig {
        tcp: "127.0.0.1:0".to_string(),
        udp: "127.0.0.1:0".to_string(),
        control_port: "127.0.0.1:0".to_string(),
        log: "discard".to_string(),
        ..ServerConfig::default()
    }
}

/// Start a server with short timeouts so shutdown never waits long
pub fn start(config: ServerConfig) -> RunningServer {
    WhosonServer::new(config)
        .with_session_timeout(Duration::from_millis(500))
        .with_sync_timeout(Duration::from_secs(2))
        .start()
        .expect("Failed to start server")
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}
