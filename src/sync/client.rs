use std::io::{BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use serde::Deserialize;
use serde_json::de::IoRead;
use serde_json::Deserializer;

use super::{SyncRequest, SyncResponse};
use crate::{Result, WhosonError, SYNC_TIMEOUT};

/// `SyncClient` contains the functionality for calling a peer's [`SyncServer`](super::SyncServer)
pub struct SyncClient {
    reader: Deserializer<IoRead<BufReader<TcpStream>>>,
    writer: BufWriter<TcpStream>,
}

impl SyncClient {
    /// creates a client and establishes a socket connection to the peer at `addr`, using
    /// [`SYNC_TIMEOUT`] for the connect and for every read and write
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        SyncClient::connect_timeout(addr, SYNC_TIMEOUT)
    }

    /// like [`connect`](SyncClient::connect) with a custom `timeout`
    pub fn connect_timeout<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
        let addr: SocketAddr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| WhosonError::Parsing("no address to connect to".to_string()))?;
        let tcp_reader = TcpStream::connect_timeout(&addr, timeout)?;
        tcp_reader.set_read_timeout(Some(timeout))?;
        tcp_reader.set_write_timeout(Some(timeout))?;
        let tcp_writer = tcp_reader.try_clone()?;

        Ok(SyncClient {
            reader: Deserializer::from_reader(BufReader::new(tcp_reader)),
            writer: BufWriter::new(tcp_writer),
        })
    }

    /// replicates a write to the peer
    pub fn set(&mut self, ip: String, data: String, expire: i64) -> Result<SyncResponse> {
        self.call(SyncRequest::Set { ip, data, expire })
    }

    /// replicates a delete to the peer.
    /// The response code tells whether the peer had the record.
    pub fn del(&mut self, ip: String) -> Result<SyncResponse> {
        self.call(SyncRequest::Del { ip })
    }

    /// fetches every live record of the peer
    ///
    /// # Errors
    /// `WhosonError::Rpc` if the peer could not serialize its records
    pub fn dump(&mut self) -> Result<SyncResponse> {
        let resp = self.call(SyncRequest::Dump)?;
        if !resp.is_ok() {
            return Err(WhosonError::Rpc {
                code: resp.rcode,
                msg: resp.msg,
            });
        }
        Ok(resp)
    }

    /// sends any request and reads its response
    pub fn call(&mut self, req: SyncRequest) -> Result<SyncResponse> {
        serde_json::to_writer(&mut self.writer, &req)?;
        self.writer.flush()?;
        Ok(SyncResponse::deserialize(&mut self.reader)?)
    }
}
