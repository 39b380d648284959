//! The host-info server: an accept loop that caps how many connection handlers run at
//! once, plus the controls to start, stop and abort it.

mod admission;
mod handler;
mod listener;

pub use admission::Admission;
pub use handler::{ConnectionHandler, TerminationListener};

use std::{
    io::{self, Error, ErrorKind},
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    os::fd::AsRawFd,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use nix::sys::socket::{self, Shutdown};
use tracing::{debug, info, warn};

use crate::host_info::HostInfoProvider;

pub const DEFAULT_MAX_CLIENTS: usize = 8;

/// How long `stop` waits for a connection that nudges a blocked `accept`.
const WAKE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug)]
pub struct ServerConfig {
    /// The maximum number of connection handlers running at once.
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
        }
    }
}

struct Running {
    thread: JoinHandle<()>,
    exited: Receiver<()>,
}

/// Owns the listening socket and the thread accepting on it.
pub struct Server {
    listener: Arc<TcpListener>,
    admission: Arc<Admission>,
    host: Arc<dyn HostInfoProvider>,
    running: Option<Running>,
}

impl Server {
    /// Binds the listening socket. Nothing is accepted until [`Server::start`].
    pub fn bind<A: ToSocketAddrs>(
        addr: A,
        config: ServerConfig,
        host: Arc<dyn HostInfoProvider>,
    ) -> io::Result<Self> {
        if config.max_clients == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "max_clients must be at least 1",
            ));
        }

        let listener = TcpListener::bind(addr)?;

        Ok(Self {
            listener: Arc::new(listener),
            admission: Arc::new(Admission::new(config.max_clients)),
            host,
            running: None,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Starts accepting on a separate thread and returns immediately.
    pub fn start(&mut self) -> io::Result<()> {
        if self.running.is_some() {
            return Err(Error::new(ErrorKind::AlreadyExists, "server already started"));
        }

        let addr = self.local_addr()?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        let listener = self.listener.clone();
        let admission = self.admission.clone();
        let host = self.host.clone();

        let thread = thread::Builder::new()
            .name("listener".to_string())
            .spawn(move || listener::run(listener, admission, host, tx))?;

        info!(
            %addr,
            max_clients = self.admission.max_clients(),
            "Server listening"
        );

        self.running = Some(Running { thread, exited: rx });
        Ok(())
    }

    /// Whether the accept loop is still alive.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.thread.is_finished())
    }

    /// Asks the accept loop to finish and waits up to `timeout` for it. Connection
    /// handlers already running are left alone. Returns whether the loop has exited.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.admission.request_stop();

        let Some(running) = self.running.take() else {
            return true;
        };

        self.wake_accept();

        match running.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = running.thread.join();
                info!("Server stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "Listener did not stop in time");
                self.running = Some(running);
                false
            }
        }
    }

    /// Ends the accept loop at once by shutting down the listening socket, which fails a
    /// blocked `accept`. Connection handlers already running are left alone.
    pub fn abort(&mut self) {
        self.admission.request_stop();

        if let Err(e) = socket::shutdown(self.listener.as_raw_fd(), Shutdown::Both) {
            debug!(error = %e, "Failed to shut down listening socket");
        }

        if let Some(running) = self.running.take() {
            let _ = running.exited.recv_timeout(WAKE_TIMEOUT);
            if running.thread.is_finished() {
                let _ = running.thread.join();
            } else {
                self.running = Some(running);
            }
        }
        info!("Server aborted");
    }

    /// Handlers currently admitted.
    pub fn running_handlers(&self) -> usize {
        self.admission.running()
    }

    /// The most handlers that have ever run at once.
    pub fn peak_handlers(&self) -> usize {
        self.admission.peak()
    }

    pub fn max_clients(&self) -> usize {
        self.admission.max_clients()
    }

    /// Dials our own socket so a blocked `accept` returns and sees the stop flag.
    fn wake_accept(&self) {
        let Ok(mut addr) = self.local_addr() else {
            return;
        };
        if addr.ip().is_unspecified() {
            addr.set_ip(Ipv4Addr::LOCALHOST.into());
        }

        if let Err(e) = TcpStream::connect_timeout(&addr, WAKE_TIMEOUT) {
            debug!(%addr, error = %e, "Failed to wake listener");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.running.is_some() {
            self.abort();
        }
    }
}
