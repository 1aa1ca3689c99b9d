use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, instrument};

use crate::buffer_pool::{Buffer, BufferPool};
use crate::engine::Store;
use crate::error::is_disconnect;
use crate::id::IdGenerator;
use crate::session::{Protocol, Session, Transport};
use crate::shutdown::Signal;
use crate::thread_pool::{SharedQueueThreadPool, ThreadPool};
use crate::{Result, CRLF, MAX_QUEUES, SESSION_TIMEOUT};

/// A UDP server over a whoson [`Store`].
///
/// A single receiver loop owns the socket. Every datagram is read into a pooled [`Buffer`] and
/// queued, together with a new [`Session`], onto a [`SharedQueueThreadPool`] whose workers run
/// the session and answer the sender. Each datagram is an independent session: one command in,
/// one response out.
///
/// When the queue is full the receiver blocks, so an overloaded server reads datagrams more
/// slowly instead of dropping them.
pub struct UdpServer<S: Store> {
    store: S,
    ids: Arc<IdGenerator>,
    bp: BufferPool,
    workers: u32,
    queue: usize,
    timeout: Duration,
}

impl<S: Store> UdpServer<S> {
    /// create a new `UdpServer` with one worker per available CPU core
    pub fn new(store: S, ids: Arc<IdGenerator>) -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);
        UdpServer {
            store,
            ids,
            bp: BufferPool::new(),
            workers,
            queue: MAX_QUEUES,
            timeout: SESSION_TIMEOUT,
        }
    }

    /// sets the number of worker threads
    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// sets the receive deadline, i.e. how often the receiver checks for shutdown while idle
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// the buffer pool datagrams are read into
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.bp
    }

    /// receives datagrams on `socket` until `shutdown` fires or a receive fails.
    /// Every worker is joined before this returns.
    ///
    /// # Errors
    /// returns the receive error that stopped the server
    #[instrument(skip(self, socket, shutdown))]
    pub fn serve(self, socket: UdpSocket, shutdown: Signal) -> Result<()> {
        let pool = SharedQueueThreadPool::with_queue(self.workers, self.queue)?;
        info!(addr = ?socket.local_addr().ok(), workers = self.workers, "UDP Core: start");
        let socket = Arc::new(socket);

        let result = self.receive(&socket, &pool, &shutdown);

        pool.join();
        info!("UDP Core: done");
        result
    }

    fn receive(&self, socket: &Arc<UdpSocket>, pool: &SharedQueueThreadPool, shutdown: &Signal) -> Result<()> {
        socket.set_read_timeout(Some(self.timeout))?;
        loop {
            if shutdown.is_fired() {
                return Ok(());
            }

            let mut b = self.bp.get();
            let (n, remote) = match socket.recv_from(b.storage()) {
                Ok(received) => received,
                // the deadline only exists to check for shutdown; `b` goes back to the pool
                Err(e) if is_disconnect(&e) => continue,
                Err(e) => {
                    error!("UDP receive failed: {}", e);
                    return Err(e.into());
                }
            };
            if shutdown.is_fired() {
                return Ok(());
            }
            b.set_count(n);

            let ses = match Session::new(Protocol::Udp, remote, &self.ids) {
                Ok(ses) => ses,
                Err(e) => {
                    error!(%remote, error = %e, "could not create session");
                    continue;
                }
            };
            let transport = DatagramTransport::new(socket.clone(), remote, b);
            let store = self.store.clone();
            pool.spawn(move || work(ses, &store, transport))?;
        }
    }
}

fn work<S: Store>(mut ses: Session, store: &S, mut transport: DatagramTransport) {
    if let Err(e) = ses.start_handler(store, &mut transport) {
        error!(id = ses.id(), error = %e, "StartHandler:Error");
    }
}

/// The datagram [`Transport`]: the request is the whole datagram, the response is a single
/// datagram holding the response line followed by two line terminators.
pub struct DatagramTransport {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    buf: Option<Buffer>,
}

impl DatagramTransport {
    /// wraps a received datagram held in `buf`, sent by `remote`
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr, buf: Buffer) -> Self {
        DatagramTransport {
            socket,
            remote,
            buf: Some(buf),
        }
    }
}

impl Transport for DatagramTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// returns the datagram the first time, `None` afterwards. The buffer is released as soon
    /// as its content has been read.
    fn read_request(&mut self) -> Result<Option<String>> {
        Ok(self
            .buf
            .take()
            .map(|b| String::from_utf8_lossy(&b).into_owned()))
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        let datagram = format!("{}{}{}", line, CRLF, CRLF);
        self.socket.send_to(datagram.as_bytes(), self.remote)?;
        debug!(remote = %self.remote, "datagram sent");
        Ok(())
    }
}
