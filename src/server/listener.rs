use std::{
    io,
    net::TcpListener,
    sync::Arc,
    thread,
};

use crossbeam_channel::Sender;
use nix::errno::Errno;
use tracing::{debug, error, info, warn};

use super::{admission::Admission, handler::ConnectionHandler};
use crate::host_info::HostInfoProvider;

/// The accept loop. Runs on its own thread until a stop is requested or the listening
/// socket fails, and sends on `exited` as it returns.
pub(super) fn run(
    listener: Arc<TcpListener>,
    admission: Arc<Admission>,
    host: Arc<dyn HostInfoProvider>,
    exited: Sender<()>,
) {
    loop {
        // Paused here while every slot is taken.
        if !admission.wait_for_slot() {
            break;
        }

        let (stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(_) if admission.stop_requested() => break,
            Err(e) if is_fatal(&e) => {
                error!(error = %e, "Listening socket failed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let Some(running) = admission.admit() else {
            debug!(%peer, "Dropping connection accepted while stopping");
            break;
        };
        info!(%peer, running, "Client connected");

        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let mut handler = ConnectionHandler::new(stream, peer, host.clone());
        let admission_clone = admission.clone();
        handler.add_termination_listener(move |h| {
            let running = admission_clone.release();
            info!(peer = %h.peer_addr(), running, "Client disconnected");
        });

        // If the spawn fails the closure is dropped, and the handler's drop releases the slot.
        if let Err(e) = thread::Builder::new()
            .name(format!("handler-{peer}"))
            .spawn(move || handler.run())
        {
            error!(%peer, error = %e, "Failed to spawn connection handler");
        }
    }

    info!("Listener stopped");
    let _ = exited.send(());
}

/// Errors meaning the listening socket itself is unusable.
fn is_fatal(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error().map(Errno::from_raw),
        Some(Errno::EINVAL | Errno::EBADF | Errno::ENOTSOCK)
    )
}
