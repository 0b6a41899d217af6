//! Carbon plaintext protocol sink.
//!
//! Each point is written as one `<key> <value> <timestamp>\n` line on a single
//! TCP connection. A write failure drops the connection; the next point opens
//! a new one.

use crate::aggregator::MetricSink;
use crate::config::CarbonAddress;
use crate::error::SendError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug)]
pub struct CarbonClient {
    addr: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl CarbonClient {
    /// Connects to `addr`. Failing here means the run cannot deliver anything.
    pub async fn connect(addr: &CarbonAddress, timeout: Duration) -> Result<Self, SendError> {
        let addr = addr.to_string();
        let stream = Self::open(&addr, timeout).await?;
        debug!(%addr, "connected to carbon");
        Ok(Self {
            addr,
            timeout,
            stream: Mutex::new(Some(stream)),
        })
    }

    async fn open(addr: &str, limit: Duration) -> Result<TcpStream, SendError> {
        let stream = timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| SendError::Timeout(limit))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// One plaintext protocol line.
    pub fn line(key: &str, value: &str, timestamp: i64) -> String {
        format!("{} {} {}\n", key, value, timestamp)
    }
}

#[async_trait]
impl MetricSink for CarbonClient {
    async fn send(&self, key: &str, value: &str, timestamp: i64) -> Result<(), SendError> {
        let line = Self::line(key, value, timestamp);
        let mut slot = self.stream.lock().await;

        let mut stream = match slot.take() {
            Some(stream) => stream,
            None => {
                debug!(addr = %self.addr, "reconnecting to carbon");
                Self::open(&self.addr, self.timeout).await?
            }
        };

        match timeout(self.timeout, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => {
                *slot = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(SendError::Timeout(self.timeout)),
        }
    }
}
