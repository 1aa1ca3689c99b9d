use std::io::{BufReader, BufWriter, Write};
use std::net::{IpAddr, TcpListener, TcpStream};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::Deserializer;
use tracing::{debug, error, info, instrument, warn};

use super::{SyncRequest, SyncResponse};
use crate::command::canonical_ip;
use crate::engine::{Store, StoreData};
use crate::shutdown::Signal;
use crate::thread_pool::{NaiveThreadPool, ThreadPool};
use crate::{Result, SESSION_TIMEOUT};

/// The inbound side of replication: a TCP service that applies replicated writes to the local
/// store without replicating them again, and serves full dumps to administrative tooling.
///
/// Each connection is served on its own thread and may carry any number of requests.
#[derive(Clone)]
pub struct SyncServer<S: Store> {
    store: S,
    timeout: Duration,
}

impl<S: Store> SyncServer<S> {
    /// create a new `SyncServer` applying requests to `store`
    pub fn new(store: S) -> Self {
        SyncServer {
            store,
            timeout: SESSION_TIMEOUT,
        }
    }

    /// sets the idle timeout of a connection
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// accepts connections on `listener` until `shutdown` fires, then waits for the open
    /// connections to finish.
    ///
    /// An accept that returns after `shutdown` fired is dropped; use
    /// [`wake_tcp_listener`](crate::server::wake_tcp_listener) to unblock a pending accept.
    #[instrument(skip(self, listener, shutdown))]
    pub fn serve(self, listener: TcpListener, shutdown: Signal) -> Result<()> {
        let pool = NaiveThreadPool::new(0)?;
        info!(addr = ?listener.local_addr().ok(), "SyncServerStart");
        let result = loop {
            let accepted = listener.accept();
            if shutdown.is_fired() {
                break Ok(());
            }
            match accepted {
                Ok((stream, _)) => {
                    let server = self.clone();
                    let spawned = pool.spawn(move || {
                        if let Err(e) = server.serve_conn(stream) {
                            error!("Error on serving sync client: {}", e);
                        }
                    });
                    if let Err(e) = spawned {
                        break Err(e);
                    }
                }
                Err(e) => break Err(e.into()),
            }
        };
        drop(listener);
        pool.join();
        info!("SyncServerStop");
        result
    }

    /// serves the requests arriving on one connection until the peer closes it or goes idle
    fn serve_conn(&self, tcp: TcpStream) -> Result<()> {
        let peer_addr = tcp.peer_addr()?;
        tcp.set_read_timeout(Some(self.timeout))?;
        let mut writer = BufWriter::new(&tcp);
        let requests = Deserializer::from_reader(BufReader::new(&tcp)).into_iter::<SyncRequest>();

        for req in requests {
            let req = match req {
                Ok(req) => req,
                Err(e) if e.is_io() || e.is_eof() => {
                    debug!("sync connection from {} closed: {}", peer_addr, e);
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            debug!("Receive sync request from {}: {:?}", peer_addr, req);
            let resp = self.handle(req);
            serde_json::to_writer(&mut writer, &resp)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// applies one request to the store and builds its response
    pub fn handle(&self, req: SyncRequest) -> SyncResponse {
        match req {
            SyncRequest::Set { ip, data, expire } => {
                let ip = match ip.parse::<IpAddr>() {
                    Ok(ip) => canonical_ip(ip),
                    Err(_) => {
                        warn!(%ip, "sync Set with an invalid IP");
                        return SyncResponse::ng();
                    }
                };
                let expire = match Utc.timestamp_opt(expire, 0).single() {
                    Some(expire) => expire,
                    None => {
                        warn!(expire, "sync Set with an invalid expire");
                        return SyncResponse::ng();
                    }
                };
                let sd = StoreData {
                    expire,
                    ip,
                    data,
                };
                self.store.sync_set(sd.key(), sd);
                SyncResponse::ok()
            }
            SyncRequest::Del { ip } => {
                let key = ip
                    .parse::<IpAddr>()
                    .map(|ip| canonical_ip(ip).to_string())
                    .unwrap_or(ip);
                if self.store.sync_del(&key) {
                    SyncResponse::ok()
                } else {
                    SyncResponse::ng()
                }
            }
            SyncRequest::Dump => match self.store.items_json() {
                Ok(json) => SyncResponse {
                    json,
                    ..SyncResponse::ok()
                },
                Err(e) => {
                    error!("dump failed: {}", e);
                    SyncResponse::ng()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemStore;
    use crate::sync::RCODE_NG;

    #[test]
    fn set_applies_without_replicating() {
        let (store, rx) = MemStore::with_replication();
        let server = SyncServer::new(store.clone());
        let expire = Utc::now().timestamp() + 600;
        let resp = server.handle(SyncRequest::Set {
            ip: "10.1.1.1".to_string(),
            data: "alice".to_string(),
            expire,
        });
        assert!(resp.is_ok());
        let sd = store.get("10.1.1.1").unwrap();
        assert_eq!(sd.data, "alice");
        assert_eq!(sd.expire.timestamp(), expire);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn del_reports_whether_a_record_existed() {
        let store = MemStore::new();
        let server = SyncServer::new(store.clone());
        store.sync_set("10.1.1.1".to_string(), StoreData::new("10.1.1.1".parse().unwrap(), "x"));

        assert!(server.handle(SyncRequest::Del { ip: "10.1.1.1".to_string() }).is_ok());
        let again = server.handle(SyncRequest::Del { ip: "10.1.1.1".to_string() });
        assert_eq!(again.rcode, RCODE_NG);
    }

    #[test]
    fn set_with_invalid_ip_is_rejected() {
        let store = MemStore::new();
        let server = SyncServer::new(store.clone());
        let resp = server.handle(SyncRequest::Set {
            ip: "not-an-ip".to_string(),
            data: "x".to_string(),
            expire: Utc::now().timestamp() + 600,
        });
        assert!(!resp.is_ok());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn dump_returns_live_records() {
        let store = MemStore::new();
        let server = SyncServer::new(store.clone());
        store.sync_set("10.1.1.1".to_string(), StoreData::new("10.1.1.1".parse().unwrap(), "x"));

        let resp = server.handle(SyncRequest::Dump);
        assert!(resp.is_ok());
        let records: Vec<StoreData> = serde_json::from_str(&resp.json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data, "x");
    }
}
