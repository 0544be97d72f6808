//! File transfer side channel
//!
//! A transfer runs on its own TCP connection: the client sends the transfer
//! key handed out by the query interface, then reads exactly the announced
//! number of bytes.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info};

use crate::error::QueryError;

/// Default file transfer port
pub const DEFAULT_TRANSFER_PORT: u16 = 30033;

/// Read buffer size for content transfers
const CHUNK_SIZE: usize = 4096;

/// Byte transfer connection, independent from the query connection
pub struct TransferChannel<S = TcpStream> {
    stream: Option<S>,
    read_timeout: Duration,
}

impl TransferChannel<TcpStream> {
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, QueryError> {
        let addr = format!("{}:{}", host, port);
        info!("Opening file transfer connection to {}", addr);

        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| QueryError::ConnectionFailed("connection timeout".to_string()))?
            .map_err(|e| QueryError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_stream(stream, read_timeout))
    }
}

impl<S> TransferChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn from_stream(stream: S, read_timeout: Duration) -> Self {
        Self {
            stream: Some(stream),
            read_timeout,
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Send the transfer key that identifies the upload or download
    pub async fn send_key(&mut self, key: &str) -> Result<(), QueryError> {
        let stream = self.stream.as_mut().ok_or(QueryError::Closed)?;
        debug!("Sending file transfer key");
        let result = async {
            stream.write_all(key.as_bytes()).await?;
            stream.flush().await
        }
        .await;
        if let Err(e) = result {
            self.stream = None;
            return Err(QueryError::Io(e));
        }
        Ok(())
    }

    /// Read exactly `length` bytes of content
    ///
    /// A timeout or early end of stream closes the channel.
    pub async fn read_content(&mut self, length: usize) -> Result<Vec<u8>, QueryError> {
        let stream = self.stream.as_mut().ok_or(QueryError::Closed)?;
        let deadline = Instant::now() + self.read_timeout;

        let mut content = Vec::with_capacity(length);
        let mut buf = [0u8; CHUNK_SIZE];
        let result = loop {
            if content.len() >= length {
                break Ok(());
            }
            let want = (length - content.len()).min(CHUNK_SIZE);
            match timeout_at(deadline, stream.read(&mut buf[..want])).await {
                Ok(Ok(0)) => break Err(QueryError::ConnectionLost),
                Ok(Ok(n)) => content.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => break Err(QueryError::Io(e)),
                Err(_) => break Err(QueryError::Timeout),
            }
        };

        match result {
            Ok(()) => {
                debug!("Received {} bytes of file content", content.len());
                Ok(content)
            }
            Err(e) => {
                self.stream = None;
                Err(e)
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }
}
