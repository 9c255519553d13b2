//! Session manager for tracking all connected devices

use super::connection::SessionHandle;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Manages all active device sessions
pub struct SessionManager {
    /// Map of remote address -> session handle
    sessions: Arc<RwLock<HashMap<SocketAddr, SessionHandle>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new device session
    pub async fn register(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle.addr, handle);
    }

    /// Unregister a device session
    pub async fn unregister(&self, addr: &SocketAddr) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(addr);
    }

    /// Send a line to every connected device
    pub async fn broadcast(&self, text: &str) {
        let sessions = self.sessions.read().await;
        for (addr, handle) in sessions.iter() {
            if let Err(e) = handle.send_line(text).await {
                tracing::warn!("Failed to send to {}: {}", addr, e);
            }
        }
    }

    /// Find sessions that have been silent longer than `idle_timeout`
    pub async fn idle_sessions(&self, idle_timeout: Duration) -> Vec<SocketAddr> {
        let sessions = self.sessions.read().await;
        let mut idle = Vec::new();
        for (addr, handle) in sessions.iter() {
            if handle.idle_for().await > idle_timeout {
                idle.push(*addr);
            }
        }
        idle
    }

    /// Close and forget idle sessions, returning their addresses
    pub async fn reap_idle(&self, idle_timeout: Duration) -> Vec<SocketAddr> {
        let idle = self.idle_sessions(idle_timeout).await;
        if !idle.is_empty() {
            let mut sessions = self.sessions.write().await;
            for addr in &idle {
                if let Some(handle) = sessions.remove(addr) {
                    let _ = handle.shutdown().await;
                }
            }
        }
        idle
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::connection::tests::session_pair;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_register_and_unregister() {
        let manager = SessionManager::new();
        let (_device, session) = session_pair().await;

        manager.register(session.get_handle()).await;
        assert_eq!(manager.count().await, 1);

        manager.unregister(&session.addr()).await;
        assert_eq!(manager.count().await, 0);
    }

    #[tokio::test]
    async fn test_reap_idle_closes_session() {
        let manager = SessionManager::new();
        let (mut device, session) = session_pair().await;
        manager.register(session.get_handle()).await;

        assert!(manager.idle_sessions(Duration::from_secs(60)).await.is_empty());

        tokio::time::sleep(Duration::from_millis(30)).await;
        let reaped = manager.reap_idle(Duration::from_millis(10)).await;
        assert_eq!(reaped, vec![session.addr()]);
        assert_eq!(manager.count().await, 0);

        // Device sees end-of-stream
        let mut buf = [0u8; 4];
        assert_eq!(device.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_devices() {
        let manager = SessionManager::new();
        let (mut device, session) = session_pair().await;
        manager.register(session.get_handle()).await;

        manager.broadcast("reboot").await;

        let mut buf = [0u8; 7];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"reboot\n");
    }
}
