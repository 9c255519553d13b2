mod session;

use device_link_shared::defaults;
use session::{PeerSession, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sessions silent for this long are closed
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where received lines are echoed (`LINK_PEER_ECHO`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EchoMode {
    Off,
    /// `1`: back to the device that sent it
    Sender,
    /// `all`: to every connected device
    All,
}

impl EchoMode {
    fn from_env(value: Option<&str>) -> Self {
        match value {
            Some("1") => EchoMode::Sender,
            Some("all") => EchoMode::All,
            _ => EchoMode::Off,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let bind_addr = std::env::var("LINK_PEER_ADDR")
        .unwrap_or_else(|_| format!("0.0.0.0:{}", defaults::DEFAULT_SERVER_PORT));
    let echo = EchoMode::from_env(std::env::var("LINK_PEER_ECHO").ok().as_deref());

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("Peer listening on {} (echo: {:?})", bind_addr, echo);

    let sessions = Arc::new(SessionManager::new());

    // Reap devices that stopped talking (no heartbeat)
    let reaper = sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            for addr in reaper.reap_idle(IDLE_TIMEOUT).await {
                warn!("Closed idle session: {}", addr);
            }
        }
    });

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        let sessions = sessions.clone();
        tokio::spawn(async move {
            let mut session = PeerSession::new(socket, addr);
            let handle = session.get_handle();
            sessions.register(handle.clone()).await;

            while let Some(text) = session.recv().await {
                let line = text.trim_end();
                info!("[{}] {}", addr, line);
                match echo {
                    EchoMode::Off => {}
                    EchoMode::Sender => {
                        if let Err(e) = handle.send_line(line).await {
                            warn!("Echo to {} failed: {}", addr, e);
                            break;
                        }
                    }
                    EchoMode::All => sessions.broadcast(line).await,
                }
            }

            sessions.unregister(&addr).await;
            info!(
                "Device disconnected: {} (after {}s, {} sessions left)",
                addr,
                handle.connected_at.elapsed().as_secs(),
                sessions.count().await
            );
        });
    }
}
