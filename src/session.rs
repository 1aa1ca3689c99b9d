//! The protocol engine: one request line in, one response line out.
//!
//! A [`Session`] is created for every request attempt, reads a line through a [`Transport`],
//! runs the command against a [`Store`] and writes the response back through the same
//! transport. Only the transport knows how lines are framed on the wire.
use std::fmt;
use std::net::SocketAddr;

use tracing::{debug, debug_span, error};

use crate::command::{Request, Response};
use crate::engine::{Store, StoreData};
use crate::error::is_disconnect;
use crate::id::IdGenerator;
use crate::{Result, WhosonError};

/// The transport a session arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// byte stream, many sessions per connection
    Tcp,
    /// datagram, one session per datagram
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// What the caller should do after a session ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// keep reading requests
    Continue,
    /// stop: QUIT was answered, the peer went away or the connection idled out
    Close,
}

/// Reads request lines from, and writes response lines to, one peer
pub trait Transport {
    /// the kind of transport
    fn protocol(&self) -> Protocol;

    /// the address of the peer
    fn remote_addr(&self) -> SocketAddr;

    /// reads the content of one request.
    ///
    /// Returns `Ok(None)` once the peer has nothing more to send.
    ///
    /// # Errors
    /// `WhosonError::SessionRead` if the request is not framed correctly, IO errors otherwise
    fn read_request(&mut self) -> Result<Option<String>>;

    /// writes one response line, adding the transport's framing
    fn send_line(&mut self, line: &str) -> Result<()>;
}

/// One request/response exchange
#[derive(Debug)]
pub struct Session {
    protocol: Protocol,
    id: u64,
    remote: SocketAddr,
}

impl Session {
    /// creates a session with a fresh id.
    ///
    /// # Errors
    /// fails if `ids` cannot produce an id; the session must then be dropped
    pub fn new(protocol: Protocol, remote: SocketAddr, ids: &IdGenerator) -> Result<Self> {
        Ok(Session {
            protocol,
            id: ids.next_id()?,
            remote,
        })
    }

    /// the id of this session
    pub fn id(&self) -> u64 {
        self.id
    }

    /// reads one request from `transport`, runs it against `store` and sends the response.
    ///
    /// Timeouts, resets and EOF end the session quietly with [`Flow::Close`]. A badly framed
    /// request is answered with a bad request response and the session continues.
    ///
    /// # Errors
    /// any other IO error while reading or sending
    pub fn start_handler<S: Store, T: Transport>(
        &mut self,
        store: &S,
        transport: &mut T,
    ) -> Result<Flow> {
        let span = debug_span!("session", id = self.id, protocol = %self.protocol, remote = %self.remote);
        let _enter = span.enter();

        let line = match transport.read_request() {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("StartHandler:EOF");
                return Ok(Flow::Close);
            }
            Err(WhosonError::Io(e)) if is_disconnect(&e) => {
                debug!(error = %e, "StartHandler:Timeout");
                return Ok(Flow::Close);
            }
            Err(WhosonError::SessionRead) => {
                error!(error = %WhosonError::SessionRead, "StartHandler:Error");
                transport.send_line(&Response::BadRequest(WhosonError::SessionRead.to_string()).to_string())?;
                return Ok(Flow::Continue);
            }
            Err(e) => return Err(e),
        };

        let (resp, flow) = self.handle(store, &line);
        transport.send_line(&resp.to_string())?;
        Ok(flow)
    }

    /// parses `line` and runs it against `store`, returning the response to send
    pub fn handle<S: Store>(&mut self, store: &S, line: &str) -> (Response, Flow) {
        let req = match line.parse::<Request>() {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, "StartHandler");
                return (Response::BadRequest(e.to_string()), Flow::Continue);
            }
        };

        let result = dispatch(store, &req);
        debug!(
            cmd = req.method(),
            cmdip = ?req.ip(),
            cmdargs = req.args(),
            "SessionHandler"
        );

        match result {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "StartHandler:Error");
                (Response::BadRequest(e.to_string()), Flow::Continue)
            }
        }
    }
}

fn dispatch<S: Store>(store: &S, req: &Request) -> Result<(Response, Flow)> {
    let done = match req {
        Request::Login { ip, data } => {
            let sd = StoreData::new(*ip, data.clone());
            store.set(sd.key(), sd)?;
            (Response::Positive("LOGIN OK".to_string()), Flow::Continue)
        }
        Request::Logout { ip } => {
            let msg = if store.del(&ip.to_string())? {
                "LOGOUT record deleted"
            } else {
                "LOGOUT no such record, nothing done"
            };
            (Response::Positive(msg.to_string()), Flow::Continue)
        }
        Request::Query { ip } => match store.get(&ip.to_string()) {
            Some(sd) => (Response::Positive(sd.data), Flow::Continue),
            None => (Response::Negative("Not Logged in".to_string()), Flow::Continue),
        },
        Request::Quit => (Response::Positive("QUIT OK".to_string()), Flow::Close),
    };
    Ok(done)
}
