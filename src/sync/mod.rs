//! Best-effort replication between whoson servers.
//!
//! Every local `set`/`del` on a replicating [`MemStore`](crate::MemStore) produces a
//! [`ReplicationMessage`]. The [`dispatcher`] fans each message out to every configured peer on
//! its own short-lived thread, calling the peer's [`SyncServer`] over a [`SyncClient`].
//! Failures are logged and dropped: there are no retries, no acknowledgements and no ordering
//! across peers, so the last write applied on a peer wins there.
//!
//! The same RPC service also answers `Dump` requests for administrative tooling.
//!
//! ## Wire format
//! A connection carries a stream of JSON encoded [`SyncRequest`]s, each answered by one JSON
//! encoded [`SyncResponse`].
use serde::{Deserialize, Serialize};

/// result code of a successful RPC
pub const RCODE_OK: i32 = 1;
/// result code of a failed RPC (e.g. deleting a record that does not exist)
pub const RCODE_NG: i32 = 2;

/// A local mutation to be applied on every peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// a record was stored
    Set {
        /// canonical IP string
        ip: String,
        /// record data
        data: String,
        /// absolute expiry as Unix seconds
        expire: i64,
    },
    /// a record was deleted
    Del {
        /// canonical IP string
        ip: String,
    },
}

impl ReplicationMessage {
    /// the RPC method name of this message
    pub fn method(&self) -> &'static str {
        match self {
            ReplicationMessage::Set { .. } => "Set",
            ReplicationMessage::Del { .. } => "Del",
        }
    }
}

/// The requests served by a [`SyncServer`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRequest {
    /// apply a replicated write
    Set {
        /// IP string of the record
        ip: String,
        /// record data
        data: String,
        /// absolute expiry as Unix seconds
        expire: i64,
    },
    /// apply a replicated delete
    Del {
        /// IP string of the record
        ip: String,
    },
    /// return every live record
    Dump,
}

impl From<ReplicationMessage> for SyncRequest {
    fn from(msg: ReplicationMessage) -> Self {
        match msg {
            ReplicationMessage::Set { ip, data, expire } => SyncRequest::Set { ip, data, expire },
            ReplicationMessage::Del { ip } => SyncRequest::Del { ip },
        }
    }
}

/// The answer to a [`SyncRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// "OK" or "NG"
    pub msg: String,
    /// [`RCODE_OK`] or [`RCODE_NG`]
    pub rcode: i32,
    /// for `Dump`: JSON array of `{Expire, IP, Data}` objects, otherwise empty
    #[serde(default)]
    pub json: String,
}

impl SyncResponse {
    /// a successful response without payload
    pub fn ok() -> Self {
        SyncResponse {
            msg: "OK".to_string(),
            rcode: RCODE_OK,
            json: String::new(),
        }
    }

    /// a failed response
    pub fn ng() -> Self {
        SyncResponse {
            msg: "NG".to_string(),
            rcode: RCODE_NG,
            json: String::new(),
        }
    }

    /// true if `rcode` is [`RCODE_OK`]
    pub fn is_ok(&self) -> bool {
        self.rcode == RCODE_OK
    }
}

mod client;
pub mod dispatcher;
mod service;

pub use self::client::SyncClient;
pub use self::service::SyncServer;
