//! ServerQuery client owning a single connection
//!
//! Commands are strictly serialized: a command is written, then lines are read
//! until its status line arrives. Notification lines seen in between are
//! queued and handed out through [`QueryClient::drain_events`] and
//! [`QueryClient::wait_event`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::debug::DebugLog;
use crate::error::QueryError;

use super::codec::{parse_once, Record};
use super::command::{Command, QUIT};
use super::events::EventQueue;
use super::frame::{split_command, COMMAND_SPLIT, LINE_TERMINATOR};
use super::response::{
    classify, LineKind, QueryResult, ResponseEnvelope, Status, GREETING_MARKER,
};

/// Default ServerQuery port
pub const DEFAULT_PORT: u16 = 10011;

/// Connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time allowed for a complete response
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest line accepted from the server
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Tunables for a [`QueryClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_chunk: usize,
    pub max_line: usize,
    pub debug_log: Arc<DebugLog>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_chunk: COMMAND_SPLIT,
            max_line: MAX_LINE_LENGTH,
            debug_log: Arc::new(DebugLog::disabled()),
        }
    }
}

/// Protocol state of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingGreeting,
    Idle,
    Sending,
    Collecting,
    Closed,
}

struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

/// ServerQuery client with an exclusively owned connection
pub struct QueryClient<S = TcpStream> {
    peer: String,
    options: ClientOptions,
    connection: Mutex<Option<Connection<S>>>,
    events: SyncMutex<EventQueue>,
    state: SyncMutex<State>,
}

impl QueryClient<TcpStream> {
    /// Connect over TCP and consume the greeting
    pub async fn connect(
        host: &str,
        port: u16,
        options: ClientOptions,
    ) -> Result<Self, QueryError> {
        let addr = format!("{}:{}", host, port);
        info!("Connecting to ServerQuery at {}", addr);

        let stream = timeout(options.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| QueryError::ConnectionFailed("connection timeout".to_string()))?
            .map_err(|e| QueryError::ConnectionFailed(e.to_string()))?;

        Self::handshake(stream, addr, options).await
    }
}

impl<S> QueryClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Take over an established stream and consume the greeting
    ///
    /// The first line must carry the protocol marker; the second line is a
    /// banner and is discarded.
    pub async fn handshake(
        stream: S,
        peer: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, QueryError> {
        let peer = peer.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        let deadline = Instant::now() + options.read_timeout;
        let greeting = timeout_at(deadline, read_nonempty_line(&mut reader, options.max_line))
            .await
            .map_err(|_| QueryError::Timeout)??;

        if !greeting.contains(GREETING_MARKER) {
            options
                .debug_log
                .record(format!("{} is not a ServerQuery host: {}", peer, greeting));
            return Err(QueryError::Greeting(greeting));
        }

        let banner = timeout_at(deadline, read_nonempty_line(&mut reader, options.max_line))
            .await
            .map_err(|_| QueryError::Timeout)??;
        debug!("Received greeting from {}: {}", peer, banner);

        Ok(Self {
            peer,
            options,
            connection: Mutex::new(Some(Connection {
                reader,
                writer: write_half,
            })),
            events: SyncMutex::new(EventQueue::new()),
            state: SyncMutex::new(State::Idle),
        })
    }

    /// Address of the remote host
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn debug_log(&self) -> &DebugLog {
        &self.options.debug_log
    }

    fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    /// Execute a built command
    pub async fn run(&self, command: &Command) -> Result<QueryResult, QueryError> {
        self.execute(&command.to_wire()).await
    }

    /// Execute a raw command line and collect its response
    ///
    /// A non-zero status is returned as an unsuccessful [`QueryResult`].
    /// Transport failures, timeouts and malformed status lines close the
    /// connection for good.
    pub async fn execute(&self, command: &str) -> Result<QueryResult, QueryError> {
        validate_command(command)?;

        let mut conn_guard = self.connection.lock().await;
        let mut conn = self.checkout(&mut conn_guard)?;
        let in_flight = InFlight::new(&self.state);

        debug!("Sending command: {}", command);
        match self.exchange(&mut conn, command).await {
            Ok(result) => {
                in_flight.complete();
                *conn_guard = Some(conn);
                self.set_state(State::Idle);
                if !result.success {
                    self.options.debug_log.record(result.message.clone());
                }
                debug!("Command finished: {}", result.message);
                Ok(result)
            }
            Err(e) => {
                // Not put back: the stream position is unknown after a
                // failed read.
                error!("Command failed on {}: {}", self.peer, e);
                let verb = command.split(' ').next().unwrap_or_default();
                self.options.debug_log.record(format!("{}: {}", verb, e));
                Err(e)
            }
        }
    }

    /// Take the connection out for one exchange
    ///
    /// It is only put back once the exchange completes, so a call dropped
    /// halfway leaves the client closed.
    fn checkout(&self, slot: &mut Option<Connection<S>>) -> Result<Connection<S>, QueryError> {
        if self.state() != State::Idle {
            return Err(QueryError::Closed);
        }
        slot.take().ok_or(QueryError::Closed)
    }

    async fn exchange(
        &self,
        conn: &mut Connection<S>,
        command: &str,
    ) -> Result<QueryResult, QueryError> {
        self.set_state(State::Sending);
        for chunk in split_command(command, self.options.max_chunk) {
            conn.writer.write_all(chunk.as_bytes()).await?;
        }
        conn.writer.flush().await?;

        self.set_state(State::Collecting);
        let deadline = Instant::now() + self.options.read_timeout;
        let mut envelope = ResponseEnvelope::new();
        loop {
            let line = timeout_at(
                deadline,
                read_nonempty_line(&mut conn.reader, self.options.max_line),
            )
            .await
            .map_err(|_| QueryError::Timeout)??;

            match classify(&line) {
                LineKind::Event => {
                    debug!("Queued event: {}", line);
                    self.events.lock().push(line);
                }
                LineKind::Status => {
                    let status = Status::parse(&line)?;
                    return Ok(envelope.finish(status));
                }
                LineKind::Data => envelope.push_data(line),
            }
        }
    }

    /// Take every queued event without touching the connection
    pub fn drain_events(&self) -> Vec<Record> {
        self.events.lock().drain()
    }

    /// Number of events waiting in the queue
    pub fn pending_events(&self) -> usize {
        self.events.lock().len()
    }

    /// Return the oldest queued event, or block reading one line from the
    /// connection
    ///
    /// With `limit` set, expiry yields [`QueryError::Timeout`] and closes the
    /// connection.
    pub async fn wait_event(&self, limit: Option<Duration>) -> Result<Record, QueryError> {
        let mut conn_guard = self.connection.lock().await;
        let queued = self.events.lock().pop();
        if let Some(event) = queued {
            return Ok(event);
        }
        let mut conn = self.checkout(&mut conn_guard)?;
        let in_flight = InFlight::new(&self.state);

        let max_line = self.options.max_line;
        let read = read_nonempty_line(&mut conn.reader, max_line);
        let result = match limit {
            Some(limit) => timeout(limit, read)
                .await
                .unwrap_or(Err(QueryError::Timeout)),
            None => read.await,
        };

        match result {
            Ok(line) => {
                in_flight.complete();
                *conn_guard = Some(conn);
                if classify(&line) != LineKind::Event {
                    warn!("Expected an event line, got: {}", line);
                }
                Ok(parse_once(&line))
            }
            Err(e) => {
                error!("Waiting for event on {} failed: {}", self.peer, e);
                Err(e)
            }
        }
    }

    /// Send `quit` without waiting for the answer and close the connection
    pub async fn disconnect(&self) {
        let mut conn_guard = self.connection.lock().await;
        if let Some(mut conn) = conn_guard.take() {
            debug!("Disconnecting from {}", self.peer);
            let quit = format!("{}{}", QUIT, LINE_TERMINATOR);
            let _ = conn.writer.write_all(quit.as_bytes()).await;
            let _ = conn.writer.shutdown().await;
        }
        self.set_state(State::Closed);
    }

    /// Close the connection without sending anything
    pub async fn close(&self) {
        let mut conn_guard = self.connection.lock().await;
        if let Some(mut conn) = conn_guard.take() {
            debug!("Closing connection to {}", self.peer);
            let _ = conn.writer.shutdown().await;
        }
        self.set_state(State::Closed);
    }
}

/// Marks the client closed when dropped before [`InFlight::complete`]
struct InFlight<'a> {
    state: &'a SyncMutex<State>,
    completed: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a SyncMutex<State>) -> Self {
        Self {
            state,
            completed: false,
        }
    }

    fn complete(mut self) {
        self.completed = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.completed {
            *self.state.lock() = State::Closed;
        }
    }
}

/// Reject command text that would break line framing
fn validate_command(cmd: &str) -> Result<(), QueryError> {
    if cmd.trim().is_empty() {
        return Err(QueryError::Command("empty command".to_string()));
    }
    if cmd.contains(['\n', '\r']) {
        return Err(QueryError::Command(
            "command contains a line break".to_string(),
        ));
    }
    Ok(())
}

/// Read one line, skipping blank ones
///
/// The server terminates lines with `\n\r`, so stray carriage returns are
/// trimmed from both ends. Bytes are decoded lossily.
async fn read_nonempty_line<R>(reader: &mut R, max_line: usize) -> Result<String, QueryError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut raw = Vec::new();
        let n = (&mut *reader)
            .take(max_line as u64)
            .read_until(b'\n', &mut raw)
            .await?;
        if n == 0 {
            return Err(QueryError::ConnectionLost);
        }
        if raw.last() != Some(&b'\n') {
            if raw.len() >= max_line {
                return Err(QueryError::Malformed(format!(
                    "line exceeds {} bytes",
                    max_line
                )));
            }
            return Err(QueryError::ConnectionLost);
        }

        let line = String::from_utf8_lossy(&raw);
        let line = line.trim_matches(|c| c == '\r' || c == '\n');
        if !line.is_empty() {
            return Ok(line.to_string());
        }
    }
}
