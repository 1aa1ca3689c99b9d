//! The outbound side of replication.
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{select, Receiver};
use tracing::{debug, error, info, instrument};

use super::{ReplicationMessage, SyncClient};
use crate::shutdown::Signal;
use crate::{Result, SYNC_TIMEOUT};

/// Fans replicated mutations out to a fixed list of peers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    peers: Vec<SocketAddr>,
    timeout: Duration,
}

impl Dispatcher {
    /// create a dispatcher sending to `peers`
    pub fn new(peers: Vec<SocketAddr>) -> Self {
        Dispatcher {
            peers,
            timeout: SYNC_TIMEOUT,
        }
    }

    /// sets the timeout of every peer call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// receives messages from `rx` until `shutdown` fires or every sender is gone.
    /// Each message is sent to every peer on a separate thread, so a slow peer never holds up
    /// the others or the next message.
    #[instrument(skip(self, rx, shutdown))]
    pub fn run(self, rx: Receiver<ReplicationMessage>, shutdown: Signal) {
        info!(peers = ?self.peers, "RunSyncRemoteStart");
        loop {
            select! {
                recv(shutdown.receiver()) -> _ => {
                    info!("RunSyncRemoteStop");
                    return;
                }
                recv(rx) -> msg => match msg {
                    Ok(msg) => self.fan_out(msg),
                    Err(_) => {
                        info!("replication channel closed");
                        return;
                    }
                },
            }
        }
    }

    fn fan_out(&self, msg: ReplicationMessage) {
        for &peer in &self.peers {
            let msg = msg.clone();
            let timeout = self.timeout;
            let spawned = thread::Builder::new()
                .name("whoson-sync".to_string())
                .spawn(move || {
                    if let Err(e) = exec_sync_remote(&msg, peer, timeout) {
                        error!(%peer, method = msg.method(), error = %e, "execSyncRemote:Error");
                    }
                });
            if let Err(e) = spawned {
                error!(%peer, error = %e, "could not start replication thread");
            }
        }
    }
}

/// sends one message to one peer. The outcome reported by the peer is only logged.
pub fn exec_sync_remote(msg: &ReplicationMessage, peer: SocketAddr, timeout: Duration) -> Result<()> {
    let mut client = SyncClient::connect_timeout(peer, timeout)?;
    let resp = match msg.clone() {
        ReplicationMessage::Set { ip, data, expire } => client.set(ip, data, expire)?,
        ReplicationMessage::Del { ip } => client.del(ip)?,
    };
    debug!(%peer, method = msg.method(), rcode = resp.rcode, "execSyncRemote");
    Ok(())
}
