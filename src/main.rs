use anyhow::Context;
use device_link::report::{TimeEvent, TimeReporter};
use device_link::transport::TcpConnector;
use device_link::{ConnectionEvent, ConnectionManager, Settings};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable naming an optional TOML settings file
const CONFIG_ENV: &str = "DEVICE_LINK_CONFIG";

fn load_settings() -> anyhow::Result<Settings> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) => Settings::load(&path).with_context(|| format!("loading {}", path)),
        Err(_) => Ok(Settings::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let settings = load_settings()?;

    info!("Device link starting");
    info!("  Server: {}:{}", settings.host, settings.port);
    info!("  Reconnect interval: {}ms", settings.reconnect_interval_ms);

    let manager = ConnectionManager::new(&settings);
    let (event_tx, mut events) = mpsc::unbounded_channel();
    manager.set_listener(event_tx);

    if let Some(hb) = &settings.heartbeat {
        manager.enable_heartbeat(Duration::from_millis(hb.interval_ms), hb.payload.clone())?;
    }
    manager.connect(settings.host.clone(), settings.port, settings.connect_timeout_ms)?;

    let reporter = TimeReporter::new(manager.clone(), settings.serial_number.clone());
    info!("  Serial number: {:?}", reporter.serial_number());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    // Main event loop: connection events out, console lines in
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            line = stdin.next_line() => {
                match line? {
                    Some(line) => handle_console_line(&line, &manager, &reporter),
                    None => {
                        info!("Console closed");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(ConnectionEvent::Connected) => {
                        info!("{}", manager.connection_info());
                    }
                    Some(ConnectionEvent::Disconnected) => {
                        warn!("Disconnected");
                    }
                    Some(ConnectionEvent::MessageReceived(text)) => {
                        info!("Received: {}", text.trim_end());
                    }
                    Some(ConnectionEvent::Error(e)) if e.is_misuse() => {
                        warn!("Ignored: {}", e);
                    }
                    Some(ConnectionEvent::Error(e)) if e.is_recoverable() => {
                        warn!("Link error, retrying every {}ms: {}", settings.reconnect_interval_ms, e);
                    }
                    Some(ConnectionEvent::Error(e)) => {
                        error!("Link error: {}", e);
                    }
                    None => {
                        error!("Connection manager closed");
                        break;
                    }
                }
            }
        }
    }

    manager.destroy();
    Ok(())
}

/// `/takeoff`, `/landing`, `/disconnect` and `/status` are commands; anything else is sent as a line
fn handle_console_line(
    line: &str,
    manager: &ConnectionManager,
    reporter: &TimeReporter<TcpConnector>,
) {
    // Failures are also reported through the event loop
    let result = match line.trim() {
        "" => return,
        "/takeoff" => reporter.report_event(TimeEvent::Takeoff),
        "/landing" => reporter.report_event(TimeEvent::Landing),
        "/disconnect" => manager.disconnect(),
        "/status" => {
            info!("{} ({})", manager.connection_info(), manager.state());
            return;
        }
        text => manager.send_message(text),
    };

    if let Err(e) = result {
        warn!("Console command failed: {}", e);
    }
}
