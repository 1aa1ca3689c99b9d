//! The whoson listeners and the orchestration that runs them together.
//!
//! [`WhosonServer::start`] binds every configured socket and starts the UDP and TCP servers,
//! the replication RPC service, the expire checker and, when peers are configured, the
//! replication dispatcher, each on its own thread. The returned [`RunningServer`] stops them
//! in order: listeners first, then the expire checker, then the dispatcher, so nothing is
//! still producing replication messages when the dispatcher goes away.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, instrument};

use crate::config::ServerConfig;
use crate::engine::{snapshot, MemStore};
use crate::id::IdGenerator;
use crate::shutdown::{self, Trigger};
use crate::sweeper::run_expire_checker;
use crate::sync::dispatcher::Dispatcher;
use crate::sync::SyncServer;
use crate::thread_pool::{NaiveThreadPool, ThreadPool};
use crate::{Result, WhosonError, EXPIRE_CHECK_INTERVAL, SESSION_TIMEOUT, SYNC_TIMEOUT};

mod tcp;
mod udp;

pub use self::tcp::{TcpServer, TcpTransport};
pub use self::udp::{DatagramTransport, UdpServer};

const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds and starts a complete whoson server from a [`ServerConfig`]
#[derive(Debug, Clone)]
pub struct WhosonServer {
    config: ServerConfig,
    session_timeout: Duration,
    expire_interval: Duration,
    sync_timeout: Duration,
}

impl WhosonServer {
    /// create a new `WhosonServer` for `config`
    pub fn new(config: ServerConfig) -> Self {
        WhosonServer {
            config,
            session_timeout: SESSION_TIMEOUT,
            expire_interval: EXPIRE_CHECK_INTERVAL,
            sync_timeout: SYNC_TIMEOUT,
        }
    }

    /// sets the idle timeout of TCP and RPC connections, which is also the UDP receive deadline
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// sets how often expired records are swept
    pub fn with_expire_interval(mut self, interval: Duration) -> Self {
        self.expire_interval = interval;
        self
    }

    /// sets the timeout of every call to a replication peer
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// loads the snapshot file, binds the configured sockets and starts every component.
    ///
    /// # Errors
    /// an invalid configuration, a bind failure or an unreadable snapshot file. Nothing is
    /// left running when this fails.
    #[instrument(skip(self))]
    pub fn start(self) -> Result<RunningServer> {
        let config = &self.config;
        config.validate()?;
        let peers = config.sync_peers()?;
        let ids = Arc::new(IdGenerator::new(config.server_id)?);

        let (store, replication) = if peers.is_empty() {
            (MemStore::new(), None)
        } else {
            let (store, rx) = MemStore::with_replication();
            (store, Some(rx))
        };
        let save_path = config.save_path();
        if let Some(path) = &save_path {
            snapshot::load(&store, path)?;
        }

        let udp = config.udp_addr()?.map(UdpSocket::bind).transpose()?;
        let tcp = config.tcp_addr()?.map(TcpListener::bind).transpose()?;
        let control = TcpListener::bind(config.control_addr()?)?;

        let udp_addr = udp.as_ref().map(UdpSocket::local_addr).transpose()?;
        let tcp_addr = tcp.as_ref().map(TcpListener::local_addr).transpose()?;
        let control_addr = control.local_addr()?;

        let mut running = RunningServer {
            store: store.clone(),
            tcp_addr,
            udp_addr,
            control_addr,
            save_path,
            stages: Vec::new(),
        };

        let (trigger, signal) = shutdown::channel();
        running.begin_stage(trigger);
        if let Some(socket) = udp {
            let server = UdpServer::new(store.clone(), ids.clone()).with_timeout(self.session_timeout);
            let signal = signal.clone();
            running.spawn("whoson-udp", move || server.serve(socket, signal))?;
            running.wake_on(udp_addr.map(Wake::Udp));
        }
        if let Some(listener) = tcp {
            let server = TcpServer::new(store.clone(), ids, NaiveThreadPool::new(0)?)
                .with_timeout(self.session_timeout);
            let signal = signal.clone();
            running.spawn("whoson-tcp", move || server.serve(listener, signal))?;
            running.wake_on(tcp_addr.map(Wake::Tcp));
        }
        let server = SyncServer::new(store.clone()).with_timeout(self.session_timeout);
        running.spawn("whoson-rpc", move || server.serve(control, signal))?;
        running.wake_on(Some(Wake::Tcp(control_addr)));

        let (trigger, signal) = shutdown::channel();
        running.begin_stage(trigger);
        let interval = self.expire_interval;
        let swept = store.clone();
        running.spawn("whoson-expire", move || {
            run_expire_checker(swept, interval, signal);
            Ok(())
        })?;

        if let Some(rx) = replication {
            let (trigger, signal) = shutdown::channel();
            running.begin_stage(trigger);
            let sync = Dispatcher::new(peers).with_timeout(self.sync_timeout);
            running.spawn("whoson-dispatch", move || {
                sync.run(rx, signal);
                Ok(())
            })?;
        }

        info!(?tcp_addr, ?udp_addr, %control_addr, "whoson server started");
        Ok(running)
    }
}

/// A started server. Dropping it without calling [`shutdown`](RunningServer::shutdown) stops
/// every component but skips saving the snapshot.
pub struct RunningServer {
    store: MemStore,
    tcp_addr: Option<SocketAddr>,
    udp_addr: Option<SocketAddr>,
    control_addr: SocketAddr,
    save_path: Option<PathBuf>,
    stages: Vec<Stage>,
}

impl RunningServer {
    /// the store every component shares
    pub fn store(&self) -> &MemStore {
        &self.store
    }

    /// the bound TCP address, `None` if TCP is not started
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// the bound UDP address, `None` if UDP is not started
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// the bound RPC address
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// stops every component, waits for in-flight sessions, then saves the snapshot file.
    ///
    /// # Errors
    /// the first error a component stopped with, or the snapshot save error
    #[instrument(skip(self))]
    pub fn shutdown(mut self) -> Result<()> {
        let mut result = self.stop();
        if let Some(path) = &self.save_path {
            match snapshot::save(&self.store, path) {
                Ok(saved) => info!(?path, saved, "snapshot saved"),
                Err(e) => {
                    error!(?path, error = %e, "snapshot save failed");
                    result = result.and(Err(e));
                }
            }
        }
        info!("whoson server stopped");
        result
    }

    fn begin_stage(&mut self, trigger: Trigger) {
        self.stages.push(Stage {
            trigger,
            wake: Vec::new(),
            handles: Vec::new(),
        });
    }

    /// runs `f` on a named thread belonging to the current stage
    fn spawn<F>(&mut self, name: &'static str, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(f)?;
        if let Some(stage) = self.stages.last_mut() {
            stage.handles.push((name, handle));
        }
        Ok(())
    }

    fn wake_on(&mut self, wake: Option<Wake>) {
        if let Some(stage) = self.stages.last_mut() {
            stage.wake.extend(wake);
        }
    }

    fn stop(&mut self) -> Result<()> {
        let mut result = Ok(());
        for stage in self.stages.drain(..) {
            result = result.and(stage.stop());
        }
        result
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "error while stopping the server");
        }
    }
}

/// a listener to unblock when its stage stops
#[derive(Debug, Clone, Copy)]
enum Wake {
    Tcp(SocketAddr),
    Udp(SocketAddr),
}

/// components that are stopped together
struct Stage {
    trigger: Trigger,
    wake: Vec<Wake>,
    handles: Vec<(&'static str, JoinHandle<Result<()>>)>,
}

impl Stage {
    fn stop(self) -> Result<()> {
        self.trigger.fire();
        for wake in self.wake {
            match wake {
                Wake::Tcp(addr) => wake_tcp_listener(addr),
                Wake::Udp(addr) => wake_udp_socket(addr),
            }
        }

        let mut result = Ok(());
        for (name, handle) in self.handles {
            let joined = handle
                .join()
                .unwrap_or_else(|_| Err(WhosonError::StringErr(format!("{} thread panicked", name))));
            if let Err(e) = joined {
                error!(thread = name, error = %e, "stopped with an error");
                result = result.and(Err(e));
            }
        }
        result
    }
}

/// unblocks an `accept` pending on the listener bound to `addr`
pub fn wake_tcp_listener(addr: SocketAddr) {
    if let Err(e) = TcpStream::connect_timeout(&reachable(addr), WAKE_TIMEOUT) {
        debug!(%addr, error = %e, "wake connect failed");
    }
}

/// unblocks a `recv_from` pending on the socket bound to `addr` with an empty datagram
pub fn wake_udp_socket(addr: SocketAddr) {
    let target = reachable(addr);
    let local = match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    let sent = UdpSocket::bind(local).and_then(|socket| socket.send_to(&[], target));
    if let Err(e) = sent {
        debug!(%addr, error = %e, "wake datagram failed");
    }
}

/// maps a wildcard bind address to the loopback address of the same family
fn reachable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}
