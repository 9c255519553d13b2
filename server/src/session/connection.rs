//! Individual device session handling

use anyhow::Result;
use device_link_shared::codec::{self, Utf8Decoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Handle to write to a specific device
#[derive(Clone)]
pub struct SessionHandle {
    pub addr: SocketAddr,
    writer: Arc<Mutex<WriteHalf<TcpStream>>>,
    pub connected_at: Instant,
    last_activity: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    /// Send a newline-terminated line to this device
    pub async fn send_line(&self, text: &str) -> Result<()> {
        let encoded = codec::encode_line(text);
        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        Ok(())
    }

    /// Close our side; the device sees end-of-stream and reconnects
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }

    /// Record that the device sent something
    pub async fn touch(&self) {
        *self.last_activity.lock().await = Instant::now();
    }

    /// Time since the device last sent anything
    pub async fn idle_for(&self) -> Duration {
        self.last_activity.lock().await.elapsed()
    }
}

/// Active device session
pub struct PeerSession {
    pub handle: SessionHandle,
    reader: ReadHalf<TcpStream>,
    decoder: Utf8Decoder,
    read_buf: Vec<u8>,
}

impl PeerSession {
    /// Create a new session from a TCP stream
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let now = Instant::now();

        let handle = SessionHandle {
            addr,
            writer: Arc::new(Mutex::new(writer)),
            connected_at: now,
            last_activity: Arc::new(Mutex::new(now)),
        };

        Self {
            handle,
            reader,
            decoder: Utf8Decoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Get a cloneable handle for writing
    pub fn get_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Read the next chunk of text from this device
    /// Returns None once the connection is closed
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return None,
                Ok(n) => {
                    self.handle.touch().await;
                    if let Some(text) = self.decoder.decode(&self.read_buf[..n]) {
                        return Some(text);
                    }
                }
                Err(e) => {
                    tracing::warn!("Read error from {}: {}", self.handle.addr, e);
                    return None;
                }
            }
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.addr
    }
}
