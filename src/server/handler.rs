use std::{
    io::{ErrorKind, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::Arc,
};

use tracing::{debug, trace, warn};

use crate::{
    host_info::HostInfoProvider,
    protocol::{Command, Deserialize},
};

/// Called once when a handler finishes, however it finishes.
pub type TerminationListener = Box<dyn FnOnce(&ConnectionHandler) + Send>;

/// Serves the single command sent on one accepted connection.
///
/// Dropping the handler closes the connection and then fires its termination listeners,
/// so they run exactly once on every exit path, including a panic inside the provider.
pub struct ConnectionHandler {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    host: Arc<dyn HostInfoProvider>,
    listeners: Vec<TerminationListener>,
}

impl ConnectionHandler {
    pub fn new(stream: TcpStream, peer: SocketAddr, host: Arc<dyn HostInfoProvider>) -> Self {
        Self {
            stream: Some(stream),
            peer,
            host,
            listeners: Vec::new(),
        }
    }

    pub fn add_termination_listener<F>(&mut self, listener: F)
    where
        F: FnOnce(&ConnectionHandler) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Reads one command, writes its response and closes the connection.
    pub fn run(mut self) {
        let peer = self.peer;
        let Some(stream) = self.stream.as_mut() else {
            return;
        };

        let command = match Command::deserialize(stream) {
            Ok(command) => command,
            Err(e) => {
                match e.kind() {
                    ErrorKind::UnexpectedEof => trace!(%peer, "Client sent nothing"),
                    ErrorKind::InvalidData => warn!(%peer, "{e}"),
                    _ => log_io_error(peer, "reading from", &e),
                }
                return;
            }
        };

        debug!(%peer, ?command, "Handling command");
        let response = self.host.respond(command);

        if let Err(e) = stream
            .write_all(response.as_bytes())
            .and_then(|()| stream.flush())
        {
            log_io_error(peer, "writing to", &e);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

fn log_io_error(peer: SocketAddr, action: &str, e: &std::io::Error) {
    match e.kind() {
        ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::ConnectionAborted => {
            debug!(%peer, error = %e, "Client went away while {action} it")
        }
        _ => warn!(%peer, error = %e, "Error {action} client"),
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.close();

        for listener in std::mem::take(&mut self.listeners) {
            listener(&*self);
        }
    }
}
