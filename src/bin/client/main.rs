mod interactive;

use std::{
    io,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    time::Duration,
};

use clap::{Parser, Subcommand};
use hoststat::{
    bench::{BenchmarkHarness, DEFAULT_CEILING, write_csv},
    protocol::{self, Operation},
    utils::init_logging,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// IP address of the server.
    #[arg(long, default_value = "127.0.0.1")]
    ip: Ipv4Addr,

    /// Port of the server.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// How to drive the server.
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Pick operations from a menu, one request each.
    Interactive,

    /// Run one operation from many clients at once and print CSV results.
    Many {
        /// The number of concurrent clients.
        count: usize,

        /// The operation, by menu number or nickname.
        #[arg(value_parser = parse_operation)]
        operation: &'static Operation,

        /// Seconds to wait for every client before abandoning the run.
        #[arg(long, default_value_t = DEFAULT_CEILING.as_secs())]
        ceiling_secs: u64,
    },
}

fn parse_operation(input: &str) -> Result<&'static Operation, String> {
    protocol::parse_operation(input).ok_or_else(|| format!("invalid operation \"{input}\""))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let addr = SocketAddr::V4(SocketAddrV4::new(args.ip, args.port));

    match args.mode {
        Mode::Interactive => interactive::run(addr)?,
        Mode::Many {
            count,
            operation,
            ceiling_secs,
        } => {
            let harness = BenchmarkHarness::new(count, addr)
                .with_ceiling(Duration::from_secs(ceiling_secs));
            eprintln!("Running tests with {} clients...", harness.len());
            let (results, failures) = harness.run_counted(operation)?;
            eprintln!("Test done, {failures} failed.");

            write_csv(&mut io::stdout().lock(), operation, &results)?;
        }
    }

    Ok(())
}
