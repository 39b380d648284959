#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use hoststat::{HostInfoProvider, Server, ServerConfig};

/// Answers every command with a fixed, recognisable string.
pub struct FixedHost;

impl HostInfoProvider for FixedHost {
    fn date_time(&self) -> String {
        "01/02/2024, 03:04:05".to_string()
    }

    fn uptime(&self) -> String {
        "1h 02m 03s".to_string()
    }

    fn memory(&self) -> String {
        "Mem: 1024 512 512".to_string()
    }

    fn netstat(&self) -> String {
        "Active Internet connections".to_string()
    }

    fn users(&self) -> String {
        "alice pts/0".to_string()
    }

    fn processes(&self) -> String {
        "  PID TTY TIME CMD\n    1 ?   00:00:01 init\n".to_string()
    }
}

pub fn start_server(max_clients: usize) -> (Server, SocketAddr) {
    let mut server = Server::bind(
        "127.0.0.1:0",
        ServerConfig { max_clients },
        Arc::new(FixedHost),
    )
    .unwrap();
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}
