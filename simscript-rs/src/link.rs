//! Simulator link: telemetry ingest and control egress over TCP.
//!
//! Two long-lived tokio tasks bridge the synchronous script thread to the
//! simulator:
//!
//! - the **inbound** task binds a port, accepts exactly one connection and
//!   applies each newline-terminated CSV record to the shared
//!   [`InputTable`];
//! - the **outbound** task dials the simulator (retrying until it answers)
//!   and writes every line pushed onto the shared [`OutputQueue`].
//!
//! Both tasks report the outcome of their connect/accept step through a
//! [`oneshot`] channel.  The script thread blocks on the receiving end, so
//! the signal cannot be lost no matter which side gets there first.
//!
//! ```text
//!   script thread                 runtime workers
//!   ─────────────                 ───────────────
//!   open_server(port) ──spawn──►  inbound_task ── accept ──┐
//!        │ blocking_recv ◄──────── ready.send(Ok(peer)) ◄──┘
//!        ▼                         read → RecordFramer → InputTable
//!   connect_client(ip, port) ───►  outbound_task ── connect (retry) ──┐
//!        │ blocking_recv ◄──────── ready.send(Ok(peer)) ◄─────────────┘
//!        ▼                         OutputQueue::next → write_all
//! ```
//!
//! Record framing lives in [`RecordFramer`], which does no I/O and is
//! tested on its own.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::Catalog;
use crate::lexer::Lexer;

// ── Constants ─────────────────────────────────────────────────────────────

const READ_BUF: usize = 1024;
const IO_WORKERS: usize = 2;

/// Pause between failed dial attempts of the outbound task.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Address the data server binds to.
pub const BIND_HOST: &str = "0.0.0.0";

// ── Errors ────────────────────────────────────────────────────────────────

/// A failure to bring up one of the two simulator channels.
#[derive(Debug)]
pub enum LinkError {
    /// The I/O runtime could not be started.
    Runtime(io::Error),
    /// The data server could not bind its port.
    Bind { port: u16, source: io::Error },
    /// The data server failed while waiting for the simulator.
    Accept { port: u16, source: io::Error },
    /// The control client's target address did not resolve.
    Resolve { host: String, port: u16, source: io::Error },
    /// The channel is already running; each is opened at most once.
    AlreadyOpen(&'static str),
    /// The task exited without reporting its connection outcome.
    HandshakeDropped(&'static str),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::Runtime(e) => write!(f, "cannot start I/O runtime: {e}"),
            LinkError::Bind { port, source } => {
                write!(f, "cannot bind data server to port {port}: {source}")
            }
            LinkError::Accept { port, source } => {
                write!(f, "data server on port {port} failed to accept: {source}")
            }
            LinkError::Resolve { host, port, source } => {
                write!(f, "cannot resolve control address {host}:{port}: {source}")
            }
            LinkError::AlreadyOpen(what) => write!(f, "{what} is already open"),
            LinkError::HandshakeDropped(what) => {
                write!(f, "{what} exited before completing its connection")
            }
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LinkError::Runtime(e) => Some(e),
            LinkError::Bind { source, .. }
            | LinkError::Accept { source, .. }
            | LinkError::Resolve { source, .. } => Some(source),
            _ => None,
        }
    }
}

type Handshake = oneshot::Sender<Result<SocketAddr, LinkError>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── InputTable ────────────────────────────────────────────────────────────

/// Latest telemetry values keyed by simulator path.
///
/// Written wholesale by the inbound task and point-wise by pull-on-read
/// variables; both go through the same lock.  Paths never written read
/// as `0`.
#[derive(Debug)]
pub struct InputTable {
    catalog: Catalog,
    values: Mutex<HashMap<String, f64>>,
    stop: watch::Sender<bool>,
}

impl InputTable {
    pub fn new(catalog: Catalog) -> Self {
        let (stop, _) = watch::channel(false);
        Self { catalog, values: Mutex::new(HashMap::new()), stop }
    }

    /// Apply one record's fields positionally against the catalog.
    ///
    /// The shorter of the record and the catalog decides how many entries
    /// are touched.  Fields that are not numbers leave their entry alone.
    /// Returns the number of entries written.
    pub fn update<S: AsRef<str>>(&self, fields: &[S]) -> usize {
        let mut values = lock(&self.values);
        let mut applied = 0;
        for (path, field) in self.catalog.paths().iter().zip(fields) {
            let field = field.as_ref().trim();
            match field.parse::<f64>() {
                Ok(v) => {
                    values.insert(path.clone(), v);
                    applied += 1;
                }
                Err(_) => warn!(path = %path, field, "ignoring non-numeric telemetry field"),
            }
        }
        applied
    }

    pub fn set(&self, path: &str, value: f64) {
        lock(&self.values).insert(path.to_owned(), value);
    }

    pub fn get(&self, path: &str) -> f64 {
        lock(&self.values).get(path).copied().unwrap_or(0.0)
    }

    /// Ask the inbound task to stop.  Safe to call any number of times.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once [`Self::stop`] has been called.
    pub async fn stopped(&self) {
        let mut rx = self.stop.subscribe();
        // The sender lives in `self`, so this only errors if we are being
        // torn down, which is a stop too.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

// ── OutputQueue ───────────────────────────────────────────────────────────

/// FIFO of protocol lines waiting to be written to the simulator.
#[derive(Debug, Default)]
pub struct OutputQueue {
    lines: Mutex<VecDeque<String>>,
    not_empty: Notify,
    stopped: AtomicBool,
}

impl OutputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        lock(&self.lines).push_back(line);
        self.not_empty.notify_one();
    }

    pub fn pop(&self) -> Option<String> {
        lock(&self.lines).pop_front()
    }

    pub fn len(&self) -> usize {
        lock(&self.lines).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.lines).is_empty()
    }

    /// Stop accepting waits.  Lines already queued are still delivered.
    /// Safe to call any number of times.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.not_empty.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Wait for the next line.  Returns `None` once stopped and drained.
    pub async fn next(&self) -> Option<String> {
        loop {
            if let Some(line) = self.pop() {
                return Some(line);
            }
            if self.is_stopped() {
                // A push may have raced the stop; drain it before giving up.
                return self.pop();
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the pop above and this await is not lost.
            self.not_empty.notified().await;
        }
    }
}

/// The protocol line that sets `path` to `value` on the simulator.
pub fn set_command(path: &str, value: f64) -> String {
    format!("set {path} {value:.6}\r\n")
}

// ── RecordFramer (pure, testable) ─────────────────────────────────────────

/// Splits a byte stream into newline-terminated records.
///
/// Bytes after the last newline are buffered until the rest of their
/// record arrives.  A `\r` before the `\n` is dropped.
#[derive(Debug, Default)]
pub struct RecordFramer {
    buf: Vec<u8>,
}

impl RecordFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every record completed by them.
    pub fn feed(&mut self, raw: &[u8]) -> Vec<String> {
        let mut records = Vec::new();
        for &b in raw {
            if b == b'\n' {
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                let record = std::mem::take(&mut self.buf);
                records.push(String::from_utf8_lossy(&record).into_owned());
            } else {
                self.buf.push(b);
            }
        }
        records
    }

    /// Bytes of the record currently being accumulated.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────

async fn inbound_task(port: u16, table: Arc<InputTable>, ready: Handshake) {
    let listener = match TcpListener::bind((BIND_HOST, port)).await {
        Ok(l) => l,
        Err(source) => {
            let _ = ready.send(Err(LinkError::Bind { port, source }));
            return;
        }
    };
    debug!(port, "data server listening");

    let (mut sock, peer) = match listener.accept().await {
        Ok(conn) => conn,
        Err(source) => {
            let _ = ready.send(Err(LinkError::Accept { port, source }));
            return;
        }
    };
    drop(listener);
    info!(%peer, "simulator connected to data server");
    if ready.send(Ok(peer)).is_err() {
        return;
    }

    let csv = Lexer::new(&[","], &[","]);
    let mut framer = RecordFramer::new();
    let mut raw = [0u8; READ_BUF];
    loop {
        tokio::select! {
            _ = table.stopped() => {
                debug!("data server stopping");
                break;
            }
            result = sock.read(&mut raw) => match result {
                Ok(0) => {
                    info!(%peer, "simulator closed data connection");
                    break;
                }
                Ok(n) => {
                    for record in framer.feed(&raw[..n]) {
                        let fields = csv.tokenize(&record);
                        let applied = table.update(&fields);
                        trace!(fields = fields.len(), applied, "telemetry record");
                    }
                }
                Err(e) => {
                    error!(%peer, error = %e, "data connection read failed");
                    break;
                }
            }
        }
    }
}

async fn outbound_task(host: String, port: u16, queue: Arc<OutputQueue>, ready: Handshake) {
    let resolved = lookup_host((host.as_str(), port))
        .await
        .map(|addrs| addrs.collect::<Vec<SocketAddr>>());
    let addrs = match resolved {
        Ok(addrs) => addrs,
        Err(source) => {
            let _ = ready.send(Err(LinkError::Resolve { host, port, source }));
            return;
        }
    };
    if addrs.is_empty() {
        let source = io::Error::new(io::ErrorKind::NotFound, "no addresses");
        let _ = ready.send(Err(LinkError::Resolve { host, port, source }));
        return;
    }

    let mut sock = loop {
        if queue.is_stopped() {
            return;
        }
        match TcpStream::connect(&addrs[..]).await {
            Ok(s) => break s,
            Err(e) => {
                trace!(%host, port, error = %e, "control connect failed, retrying");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    };
    let peer = sock.peer_addr().unwrap_or(addrs[0]);
    info!(%peer, "connected to simulator control port");
    if ready.send(Ok(peer)).is_err() {
        return;
    }

    while let Some(line) = queue.next().await {
        if let Err(e) = sock.write_all(line.as_bytes()).await {
            error!(%peer, error = %e, "control write failed");
            break;
        }
    }
    let _ = sock.shutdown().await;
    debug!(%peer, "control client stopped");
}

// ── Link ──────────────────────────────────────────────────────────────────

/// Owner of both simulator channels and the runtime they run on.
///
/// The runtime is started on the first open.  [`Self::shutdown`] (also run
/// on drop) stops both channels and joins their tasks.
#[derive(Debug)]
pub struct Link {
    input: Arc<InputTable>,
    output: Arc<OutputQueue>,
    runtime: Option<Runtime>,
    inbound: Option<JoinHandle<()>>,
    outbound: Option<JoinHandle<()>>,
}

impl Link {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            input: Arc::new(InputTable::new(catalog)),
            output: Arc::new(OutputQueue::new()),
            runtime: None,
            inbound: None,
            outbound: None,
        }
    }

    pub fn input(&self) -> &Arc<InputTable> {
        &self.input
    }

    pub fn output(&self) -> &Arc<OutputQueue> {
        &self.output
    }

    fn runtime(&mut self) -> Result<&Runtime, LinkError> {
        let rt = match self.runtime.take() {
            Some(rt) => rt,
            None => Builder::new_multi_thread()
                .worker_threads(IO_WORKERS)
                .thread_name("simscript-io")
                .enable_all()
                .build()
                .map_err(LinkError::Runtime)?,
        };
        Ok(self.runtime.insert(rt))
    }

    /// Start the data server on `port` and block until the simulator
    /// connects.  Returns the simulator's address.
    pub fn open_server(&mut self, port: u16) -> Result<SocketAddr, LinkError> {
        if self.inbound.is_some() {
            return Err(LinkError::AlreadyOpen("data server"));
        }
        let (tx, rx) = oneshot::channel();
        let table = Arc::clone(&self.input);
        let handle = self.runtime()?.spawn(inbound_task(port, table, tx));

        debug!(port, "waiting for simulator to connect");
        // A failed handshake leaves the slot free for another attempt.
        let peer = rx
            .blocking_recv()
            .map_err(|_| LinkError::HandshakeDropped("data server"))??;
        self.inbound = Some(handle);
        Ok(peer)
    }

    /// Start the control client and block until it reaches `host:port`.
    pub fn connect_client(&mut self, host: &str, port: u16) -> Result<SocketAddr, LinkError> {
        if self.outbound.is_some() {
            return Err(LinkError::AlreadyOpen("control client"));
        }
        let (tx, rx) = oneshot::channel();
        let queue = Arc::clone(&self.output);
        let handle = self
            .runtime()?
            .spawn(outbound_task(host.to_owned(), port, queue, tx));

        debug!(host, port, "waiting for control connection");
        let peer = rx
            .blocking_recv()
            .map_err(|_| LinkError::HandshakeDropped("control client"))??;
        self.outbound = Some(handle);
        Ok(peer)
    }

    /// Stop both channels and wait for their tasks.  Idempotent.
    ///
    /// Lines already queued for the simulator are written before the control
    /// connection closes.
    pub fn shutdown(&mut self) {
        self.input.stop();
        self.output.stop();
        let Some(rt) = &self.runtime else { return };
        for handle in [self.inbound.take(), self.outbound.take()].into_iter().flatten() {
            if let Err(e) = rt.block_on(handle) {
                error!(error = %e, "I/O task ended abnormally");
            }
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
