#![deny(missing_docs)]
//! A whoson ("who is logged on") server: it maps IP addresses to an opaque data string for a
//! limited time, so that mail or proxy daemons can ask who is behind an address.
//!
//! This crate provides the server library itself, as well as a [`whoson-server`] and
//! [`whoson-client`] executable that can be used to run and query a server.
//!
//! ## Line protocol
//! Clients talk a line based protocol over TCP or UDP. A request is a command line followed by
//! a blank line, a response is a result line followed by a blank line:
//!
//! - `LOGIN <ip> <data...>` stores `data` for `ip`, answered with `+LOGIN OK`
//! - `LOGOUT <ip>` deletes the record of `ip`
//! - `QUERY <ip>` answers `+<data>` or `-Not Logged in`
//! - `QUIT` answers `+QUIT OK` and closes a TCP connection
//!
//! Malformed requests are answered with a `*` line and never touch the store. See [`Request`],
//! [`Response`] and [`session`] for the details.
//!
//! ## Store
//! [`MemStore`] keeps the records in a concurrent map. Every record expires
//! [`STORE_DATA_EXPIRE`] after it was written: expired records are never returned, and the
//! [`sweeper`] removes them every [`EXPIRE_CHECK_INTERVAL`]. The store can be saved to and
//! loaded from a JSON snapshot file, see [`engine::snapshot`].
//!
//! ## Servers
//! [`TcpServer`] serves every connection on its own thread. [`UdpServer`] reads datagrams on a
//! single thread into pooled buffers and queues them to a bounded worker pool, blocking the
//! reader when the queue is full. [`WhosonServer`] runs both together with the replication
//! service and the sweeper.
//!
//! ## Replication
//! When peers are configured every local write is sent to each peer, best effort, over a JSON
//! RPC connection. The same RPC service serves full dumps to [`ServerCtl`]. See [`sync`].
//!
//! [`whoson-server`]: ../whoson_server/index.html
//! [`whoson-client`]: ../whoson_client/index.html
use std::time::Duration;

pub use buffer_pool::{Buffer, BufferPool};
pub use client::WhosonClient;
pub use command::{Request, Response};
pub use config::{ClientConfig, ServerConfig, ServerCtlConfig};
pub use ctl::ServerCtl;
pub use engine::{MemStore, Store, StoreData};
pub use error::{Result, WhosonError};
pub use id::IdGenerator;
pub use server::{RunningServer, TcpServer, UdpServer, WhosonServer};
pub use session::{Protocol, Session, Transport};
pub use sync::{SyncClient, SyncServer};

mod buffer_pool;
mod client;
mod command;
pub mod config;
mod ctl;
pub mod engine;
mod error;
mod id;
pub mod logger;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod sweeper;
pub mod sync;
pub mod thread_pool;

/// maximum number of datagrams waiting for a UDP worker
pub const MAX_QUEUES: usize = 8192;
/// size of a UDP receive buffer, the largest datagram payload that fits an Ethernet frame
pub const UDP_BYTE_SIZE: usize = 1472;
/// line terminator of the line protocol
pub const CRLF: &str = "\r\n";
/// idle timeout of a connection, also the UDP receive deadline
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(10);
/// lifetime of a record after its last write
pub const STORE_DATA_EXPIRE: Duration = Duration::from_secs(30 * 60);
/// interval between two expire sweeps
pub const EXPIRE_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// capacity of the outbound replication channel
pub const SYNC_CHANNEL_SIZE: usize = 32;
/// timeout of a replication call to a peer
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);
