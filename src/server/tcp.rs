use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument};

use crate::engine::Store;
use crate::id::IdGenerator;
use crate::session::{Flow, Protocol, Session, Transport};
use crate::shutdown::Signal;
use crate::thread_pool::ThreadPool;
use crate::{Result, WhosonError, CRLF, SESSION_TIMEOUT};

/// A TCP socket server over a whoson [`Store`].
/// It accepts connections on a [`TcpListener`] and serves each connection on a thread of its
/// [`ThreadPool`], one request after the other, until the client sends QUIT, goes idle for
/// longer than the session timeout, or disconnects.
///
/// # Example
/// ```rust,no_run
/// use std::net::TcpListener;
/// use std::sync::Arc;
/// use whoson::{IdGenerator, MemStore, TcpServer, shutdown};
/// use whoson::thread_pool::{NaiveThreadPool, ThreadPool};
/// # fn main() -> whoson::Result<()> {
/// let listener = TcpListener::bind("127.0.0.1:9876")?;
/// let ids = Arc::new(IdGenerator::new(1000)?);
/// let server = TcpServer::new(MemStore::new(), ids, NaiveThreadPool::new(0)?);
/// let (_trigger, signal) = shutdown::channel();
/// server.serve(listener, signal)?;
/// # Ok(())
/// # }
/// ```
pub struct TcpServer<S: Store, P: ThreadPool> {
    /// the store sessions run against
    store: S,
    /// ids for every session
    ids: Arc<IdGenerator>,
    /// the threads connections are served on
    pool: P,
    /// idle timeout of a connection
    timeout: Duration,
}

impl<S: Store, P: ThreadPool> TcpServer<S, P> {
    /// Create a new `TcpServer` using the given [`Store`] and [`ThreadPool`] implementation.
    pub fn new(store: S, ids: Arc<IdGenerator>, pool: P) -> Self {
        TcpServer {
            store,
            ids,
            pool,
            timeout: SESSION_TIMEOUT,
        }
    }

    /// sets the idle timeout of a connection
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// accepts connections on `listener` until `shutdown` fires or accepting fails.
    /// The listener is always closed and every connection thread joined before this returns.
    ///
    /// # Errors
    /// returns the accept error that stopped the server
    #[instrument(skip(self, listener, shutdown))]
    pub fn serve(self, listener: TcpListener, shutdown: Signal) -> Result<()> {
        let TcpServer {
            store,
            ids,
            pool,
            timeout,
        } = self;
        info!(addr = ?listener.local_addr().ok(), "TCP Core: start");

        let result = loop {
            let accepted = listener.accept();
            if shutdown.is_fired() {
                break Ok(());
            }
            match accepted {
                Ok((stream, _)) => {
                    let store = store.clone();
                    let ids = ids.clone();
                    let shutdown = shutdown.clone();
                    let spawned = pool.spawn(move || {
                        if let Err(e) = serve(&store, &ids, stream, timeout, &shutdown) {
                            error!("Error on serving client: {}", e);
                        }
                    });
                    if let Err(e) = spawned {
                        break Err(e);
                    }
                }
                Err(e) => {
                    error!("Connection failed: {}", e);
                    break Err(e.into());
                }
            }
        };

        drop(listener);
        pool.join();
        info!("TCP Core: done");
        result
    }
}

/// runs sessions over the given `tcp` stream until the client quits, idles out or disconnects.
/// The stream is closed when this returns.
fn serve<S: Store>(
    store: &S,
    ids: &IdGenerator,
    tcp: TcpStream,
    timeout: Duration,
    shutdown: &Signal,
) -> Result<()> {
    let mut transport = TcpTransport::new(tcp)?;
    let remote = transport.remote_addr();
    debug!("Connection from {}", remote);

    while !shutdown.is_fired() {
        transport.set_timeout(timeout)?;
        let mut ses = Session::new(Protocol::Tcp, remote, ids)?;
        if ses.start_handler(store, &mut transport)? == Flow::Close {
            break;
        }
    }
    debug!("Connection from {} closed", remote);
    Ok(())
}

/// The stream [`Transport`]: a request is a content line followed by a blank line, and so is
/// a response. Requests are numbered in the order they are read; responses always go out
/// before the next request is read.
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    remote: SocketAddr,
    seq: u64,
}

impl TcpTransport {
    /// wraps an accepted connection
    pub fn new(tcp: TcpStream) -> Result<Self> {
        let remote = tcp.peer_addr()?;
        let writer = BufWriter::new(tcp.try_clone()?);
        Ok(TcpTransport {
            reader: BufReader::new(tcp),
            writer,
            remote,
            seq: 0,
        })
    }

    /// sets the read and write deadline for the next exchange
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        let tcp = self.writer.get_ref();
        tcp.set_read_timeout(Some(timeout))?;
        tcp.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    /// the sequence number of the last request read
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }
}

impl Transport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn read_request(&mut self) -> Result<Option<String>> {
        let content = match self.read_line()? {
            Some(line) => line,
            None => return Ok(None),
        };
        let terminator = match self.read_line()? {
            Some(line) => line,
            None => return Ok(None),
        };
        self.seq += 1;
        debug!(seq = self.seq, "request read");

        if !content.is_empty() && terminator.is_empty() {
            Ok(Some(content))
        } else {
            Err(WhosonError::SessionRead)
        }
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        write!(self.writer, "{}{}{}", line, CRLF, CRLF)?;
        self.writer.flush()?;
        Ok(())
    }
}
