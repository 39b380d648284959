//! Fires one request per client, all at once, and collects how each one went.

use std::{
    fmt,
    io::{self, Write},
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};

use crate::{
    client::{BenchmarkClient, Transport},
    protocol::Operation,
    utils::elapsed_millis,
};

/// How long a run may take before it's written off.
pub const DEFAULT_CEILING: Duration = Duration::from_secs(60 * 60);

pub const CSV_HEADER: &str = "Test #,Operation,Success,Response Size (bytes),Duration (ms)";

/// The outcome of one timed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BenchmarkResult {
    success: bool,
    response_size: u64,
    duration_millis: u64,
}

impl BenchmarkResult {
    pub fn succeeded(response_size: u64, duration_millis: u64) -> Self {
        Self {
            success: true,
            response_size,
            duration_millis,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            response_size: 0,
            duration_millis: 0,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    /// Length in bytes of the response with surrounding whitespace trimmed.
    pub fn response_size(&self) -> u64 {
        self.response_size
    }

    pub fn duration_millis(&self) -> u64 {
        self.duration_millis
    }
}

/// Why a run produced no results.
#[derive(Debug, PartialEq, Eq)]
pub enum BenchError {
    /// Not every client finished before the ceiling.
    TimedOut { completed: usize, expected: usize },

    /// A worker thread died without reporting.
    WorkerLost { index: usize },
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::TimedOut {
                completed,
                expected,
            } => write!(
                f,
                "benchmark aborted: only {completed} of {expected} requests finished in time"
            ),
            BenchError::WorkerLost { index } => {
                write!(f, "benchmark aborted: worker for client {index} was lost")
            }
        }
    }
}

impl std::error::Error for BenchError {}

/// A fixed set of clients aimed at one server.
pub struct BenchmarkHarness<C = BenchmarkClient> {
    clients: Vec<Arc<C>>,

    /// How long `run` waits for every client before giving up on the whole batch.
    ceiling: Duration,
}

impl BenchmarkHarness<BenchmarkClient> {
    /// Creates `count` clients for `addr`. Nothing connects until [`BenchmarkHarness::run`].
    pub fn new(count: usize, addr: SocketAddr) -> Self {
        Self::from_clients((0..count).map(|_| BenchmarkClient::new(addr)).collect())
    }
}

impl<C: Transport + 'static> BenchmarkHarness<C> {
    pub fn from_clients(clients: Vec<C>) -> Self {
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
            ceiling: DEFAULT_CEILING,
        }
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Has every client perform `operation` once, concurrently. Result `i` always belongs
    /// to client `i`. If the ceiling passes first, nothing is returned.
    pub fn run(&self, operation: &'static Operation) -> Result<Vec<BenchmarkResult>, BenchError> {
        self.run_counted(operation).map(|(results, _)| results)
    }

    /// Like [`BenchmarkHarness::run`], also returning how many requests failed. Only the
    /// first failure of a run is logged.
    pub fn run_counted(
        &self,
        operation: &'static Operation,
    ) -> Result<(Vec<BenchmarkResult>, usize), BenchError> {
        let expected = self.clients.len();
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, BenchmarkResult)>();
        let failure_logged = Arc::new(AtomicBool::new(false));
        let failures = Arc::new(AtomicUsize::new(0));
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());

        for (index, client) in self.clients.iter().enumerate() {
            let client = client.clone();
            let tx = tx.clone();
            let failure_logged = failure_logged.clone();
            let failures = failures.clone();
            let dispatch = dispatch.clone();

            let spawned = thread::Builder::new()
                .name(format!("bench-client-{index}"))
                .spawn(move || {
                    // Workers log to whichever subscriber the caller had.
                    tracing::dispatcher::with_default(&dispatch, || {
                        let result = time_request(client.as_ref(), operation, |e| {
                            failures.fetch_add(1, Ordering::SeqCst);
                            if !failure_logged.swap(true, Ordering::SeqCst) {
                                warn!(client = index, error = %e, "Request failed");
                            }
                        });
                        let _ = tx.send((index, result));
                    })
                });

            if let Err(e) = spawned {
                warn!(client = index, error = %e, "Failed to spawn benchmark worker");
                return Err(self.abandon(BenchError::WorkerLost { index }));
            }
        }
        drop(tx);

        let deadline = Instant::now() + self.ceiling;
        let mut results: Vec<Option<BenchmarkResult>> = vec![None; expected];
        let mut completed = 0;

        while completed < expected {
            match rx.recv_deadline(deadline) {
                Ok((index, result)) => {
                    results[index] = Some(result);
                    completed += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(completed, expected, "Benchmark hit its ceiling, discarding run");
                    return Err(self.abandon(BenchError::TimedOut {
                        completed,
                        expected,
                    }));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let index = results.iter().position(Option::is_none).unwrap_or(0);
                    return Err(self.abandon(BenchError::WorkerLost { index }));
                }
            }
        }

        let failures = failures.load(Ordering::SeqCst);
        info!(
            operation = operation.short_name(),
            clients = expected,
            failures,
            "Benchmark run complete"
        );

        Ok((results.into_iter().flatten().collect(), failures))
    }

    /// Cuts whatever requests are still in flight before giving up on a run.
    fn abandon(&self, error: BenchError) -> BenchError {
        self.disconnect_all();
        error
    }

    /// Best-effort disconnect of every client.
    pub fn disconnect_all(&self) {
        for client in &self.clients {
            client.disconnect();
        }
    }
}

/// Performs one request and times it. `on_failure` sees the error of a failed request.
fn time_request<C: Transport + ?Sized>(
    client: &C,
    operation: &Operation,
    on_failure: impl FnOnce(&io::Error),
) -> BenchmarkResult {
    let start = Instant::now();
    match client.do_request(operation) {
        Ok(response) => {
            let duration = elapsed_millis(start);
            BenchmarkResult::succeeded(response.trim().len() as u64, duration)
        }
        Err(e) => {
            on_failure(&e);
            BenchmarkResult::failed()
        }
    }
}

/// Writes results as CSV, one row per client in index order.
pub fn write_csv<W: Write>(
    out: &mut W,
    operation: &Operation,
    results: &[BenchmarkResult],
) -> io::Result<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for (i, r) in results.iter().enumerate() {
        writeln!(
            out,
            "{},{},{},{},{}",
            i,
            operation.short_name(),
            r.success(),
            r.response_size(),
            r.duration_millis()
        )?;
    }
    out.flush()
}
