use std::{
    io::{self, BufRead},
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use clap::Parser;
use hoststat::{
    host_info,
    server::{DEFAULT_MAX_CLIENTS, Server, ServerConfig},
    utils::init_logging,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    ip: Ipv4Addr,

    /// Port to bind to
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// The maximum number of clients served at once
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// How long to wait for a graceful stop before aborting, in milliseconds
    #[arg(long, default_value_t = 2000)]
    stop_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let addr = SocketAddrV4::new(args.ip, args.port);
    let config = ServerConfig {
        max_clients: args.max_clients,
    };

    let mut server = Server::bind(addr, config, host_info::detect())
        .map_err(|e| format!("error setting up server on {addr}: {e}"))?;
    server.start()?;

    // Serve until the operator types "stop" or closes stdin.
    eprintln!("Type \"stop\" to stop server.");
    for line in io::stdin().lock().lines() {
        if line?.trim().eq_ignore_ascii_case("stop") {
            break;
        }
        eprintln!("Type \"stop\" to stop server.");
    }

    info!("Stopping server");
    if !server.stop(Duration::from_millis(args.stop_timeout_ms)) {
        warn!("Server still running, aborting");
        server.abort();
    }

    Ok(())
}
