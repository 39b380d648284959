//! A tiny remote host-introspection service and a harness for benchmarking it.
//!
//! Clients send a single command byte per connection; the server answers with UTF-8 text
//! and closes the connection.

pub mod bench;
pub mod client;
pub mod host_info;
pub mod protocol;
pub mod server;
pub mod utils;

pub use bench::{BenchError, BenchmarkHarness, BenchmarkResult, write_csv};
pub use client::{BenchmarkClient, Transport};
pub use host_info::HostInfoProvider;
pub use protocol::{Command, OPERATIONS, Operation};
pub use server::{Server, ServerConfig};
