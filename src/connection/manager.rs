//! Connection manager with a persistent link and automatic reconnection

use super::heartbeat::{self, HeartbeatTask};
use super::listener::{spawn_dispatcher, ConnectionEvent, ConnectionListener, ListenerSlot, Notifier};
use super::reconnect::{FixedBackoff, ReconnectSlot};
use crate::config::Settings;
use crate::transport::{ConnectionTarget, TcpConnector, TransportConnector, TransportStream};
use bytes::Bytes;
use device_link_shared::{codec, codec::Utf8Decoder, defaults, ConnectionState, LinkError, Trigger};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Tuning for the link, independent of the target
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Bounded read so the read loop can observe cancellation
    pub read_timeout: Duration,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
    /// Delay between reconnect attempts
    pub backoff: FixedBackoff,
}

/// Shortest read timeout or reconnect delay the manager will run with
const MIN_INTERVAL: Duration = Duration::from_millis(10);

impl LinkOptions {
    /// Clamp values that would stall or spin the read and reconnect loops
    fn sanitized(mut self) -> Self {
        // An empty buffer reads as end-of-stream
        self.read_buffer_size = self.read_buffer_size.max(1);
        self.read_timeout = self.read_timeout.max(MIN_INTERVAL);
        if self.backoff.delay(1) < MIN_INTERVAL {
            self.backoff = FixedBackoff::new(MIN_INTERVAL);
        }
        self
    }
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(defaults::READ_TIMEOUT_MS),
            read_buffer_size: defaults::READ_BUFFER_SIZE,
            backoff: FixedBackoff::default(),
        }
    }
}

impl From<&Settings> for LinkOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            read_timeout: settings.read_timeout(),
            read_buffer_size: settings.read_buffer_size,
            backoff: FixedBackoff::new(settings.reconnect_interval()),
        }
    }
}

/// Snapshot returned by [`ConnectionManager::connection_info`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    /// Most recently requested target
    pub target: Option<ConnectionTarget>,
    /// Remote endpoint of the live socket
    pub peer: Option<String>,
    /// Number of sockets established so far
    pub epoch: u64,
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.state, &self.peer) {
            (ConnectionState::Connected, Some(peer)) => write!(f, "Connected to {}", peer),
            _ => write!(f, "Not connected"),
        }
    }
}

/// Resources of one live socket
struct Session {
    epoch: u64,
    peer: String,
    outbound: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Everything guarded by the manager lock
#[derive(Default)]
struct Core {
    state: ConnectionState,
    target: Option<ConnectionTarget>,
    session: Option<Session>,
    /// Tasks of closed sessions that may still be unwinding
    retired: Vec<JoinHandle<()>>,
    reconnect: ReconnectSlot,
    heartbeat: Option<CancellationToken>,
    epochs: u64,
    destroyed: bool,
}

impl Core {
    fn owns_epoch(&self, epoch: u64) -> bool {
        matches!(&self.session, Some(session) if session.epoch == epoch)
    }

    /// Release the live session, if any. Safe to call from every failure path.
    fn teardown(&mut self, trigger: Trigger) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        // Cancelling stops both tasks; their halves close the socket as they drop.
        // Dropping `outbound` discards anything still queued for this epoch.
        session.cancel.cancel();
        self.retired.extend(session.tasks);
        self.state = self
            .state
            .next(trigger)
            .unwrap_or(ConnectionState::Disconnected);
        debug!("[LINK] Session {} released ({:?})", session.epoch, trigger);
        true
    }

    fn stop_heartbeat(&mut self) {
        if let Some(token) = self.heartbeat.take() {
            token.cancel();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Connected,
    Failed,
    /// Another attempt owns the transition, or the manager is gone
    Skipped,
}

struct Inner<C: TransportConnector> {
    connector: C,
    options: LinkOptions,
    core: Mutex<Core>,
    listener: ListenerSlot,
    notifier: Notifier,
    /// Root of every background task
    cancel: CancellationToken,
}

/// Manages one persistent connection to a remote endpoint
///
/// Cloning yields another handle to the same manager. All operations return
/// immediately; outcomes arrive through the registered [`ConnectionListener`].
pub struct ConnectionManager<C: TransportConnector = TcpConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: TransportConnector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionManager<TcpConnector> {
    /// Create a TCP manager from settings. Must be called inside a Tokio runtime.
    pub fn new(settings: &Settings) -> Self {
        Self::with_connector(TcpConnector::new(), LinkOptions::from(settings))
    }
}

impl<C: TransportConnector> ConnectionManager<C> {
    /// Create a manager over any transport. Must be called inside a Tokio runtime.
    pub fn with_connector(connector: C, options: LinkOptions) -> Self {
        let listener: ListenerSlot = Arc::new(RwLock::new(None));
        let (notifier, _dispatcher) = spawn_dispatcher(listener.clone());

        Self {
            inner: Arc::new(Inner {
                connector,
                options: options.sanitized(),
                core: Mutex::new(Core::default()),
                listener,
                notifier,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register the listener, replacing any previous one
    pub fn set_listener<L: ConnectionListener>(&self, listener: L) {
        *self
            .inner
            .listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    /// Start connecting to `host:port`; a `timeout_ms` of zero waits indefinitely
    ///
    /// The target is remembered for every later reconnect, even when the call
    /// is ignored because the link is already up.
    pub fn connect(&self, host: impl Into<String>, port: u16, timeout_ms: u64) -> Result<(), LinkError> {
        let target = ConnectionTarget::new(host, port, Duration::from_millis(timeout_ms));
        {
            let mut core = self.inner.lock_core();
            if core.destroyed {
                return Err(LinkError::Destroyed);
            }
            core.target = Some(target.clone());
            if core.state.is_connected() {
                warn!("[LINK] Already connected, not connecting to {}", target);
                return Ok(());
            }
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if inner.attempt(target).await == AttemptOutcome::Failed {
                inner.schedule_reconnect();
            }
        });
        Ok(())
    }

    /// Close the live connection without scheduling a reconnect
    pub fn disconnect(&self) -> Result<(), LinkError> {
        {
            let mut core = self.inner.lock_core();
            if core.destroyed {
                return Err(LinkError::Destroyed);
            }
            if core.state.is_connected() {
                core.teardown(Trigger::DisconnectRequested);
                core.reconnect.cancel();
                core.stop_heartbeat();
                self.inner.notifier.emit(ConnectionEvent::Disconnected);
                info!("[LINK] Disconnected");
                return Ok(());
            }
        }
        Err(self.inner.misuse("disconnect"))
    }

    /// Queue a newline-terminated text message
    pub fn send_message(&self, text: &str) -> Result<(), LinkError> {
        self.inner.enqueue(codec::encode_line(text), "send message")
    }

    /// Queue raw bytes, written verbatim
    pub fn send_bytes(&self, data: impl Into<Bytes>) -> Result<(), LinkError> {
        self.inner.enqueue(data.into(), "send bytes")
    }

    /// Send `payload` every `interval` while connected, replacing any previous heartbeat
    pub fn enable_heartbeat(&self, interval: Duration, payload: impl Into<String>) -> Result<(), LinkError> {
        let task = HeartbeatTask::new(interval, payload);
        let token = {
            let mut core = self.inner.lock_core();
            if core.destroyed {
                return Err(LinkError::Destroyed);
            }
            core.stop_heartbeat();
            let token = self.inner.cancel.child_token();
            core.heartbeat = Some(token.clone());
            token
        };

        info!(
            "[HEARTBEAT] Every {}ms: {:?}",
            task.interval.as_millis(),
            task.payload
        );
        // Detached; `core.heartbeat` owns it through the token
        let weak = Arc::downgrade(&self.inner);
        let _ = heartbeat::spawn(task, token, move |payload| match weak.upgrade() {
            Some(inner) => {
                inner.send_if_connected(codec::encode_line(payload));
                true
            }
            None => false,
        });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock_core().state.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock_core().state
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        let core = self.inner.lock_core();
        ConnectionInfo {
            state: core.state,
            target: core.target.clone(),
            peer: core.session.as_ref().map(|s| s.peer.clone()),
            epoch: core.epochs,
        }
    }

    /// Whether a reconnect loop is currently running
    pub fn is_reconnecting(&self) -> bool {
        self.inner.lock_core().reconnect.is_active()
    }

    /// Tear everything down. The manager can't be used afterwards.
    pub fn destroy(&self) {
        {
            let mut core = self.inner.lock_core();
            if core.destroyed {
                return;
            }
            core.destroyed = true;
            if core.teardown(Trigger::DisconnectRequested) {
                self.inner.notifier.emit(ConnectionEvent::Disconnected);
            }
            // An attempt in flight is abandoned
            core.state = ConnectionState::Disconnected;
            core.reconnect.cancel();
            core.stop_heartbeat();
        }

        self.inner.cancel.cancel();
        self.inner.notifier.shutdown();
        info!("[LINK] Manager destroyed");
    }
}

impl<C: TransportConnector> Inner<C> {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Report API misuse; no state change, no reconnect
    fn misuse(&self, operation: &'static str) -> LinkError {
        let error = LinkError::NotConnected { operation };
        warn!("[LINK] {}", error);
        self.notifier.emit(ConnectionEvent::Error(error.clone()));
        error
    }

    fn enqueue(&self, data: Bytes, operation: &'static str) -> Result<(), LinkError> {
        {
            let core = self.lock_core();
            if core.destroyed {
                return Err(LinkError::Destroyed);
            }
            if let Some(session) = core.session.as_ref() {
                if session.outbound.send(data).is_ok() {
                    return Ok(());
                }
            }
        }
        Err(self.misuse(operation))
    }

    /// Heartbeat path: silently skip while disconnected
    fn send_if_connected(&self, data: Bytes) {
        let core = self.lock_core();
        match core.session.as_ref() {
            Some(session) => {
                let _ = session.outbound.send(data);
            }
            None => trace!("[HEARTBEAT] Skipped, not connected"),
        }
    }

    async fn connect_stream(&self, target: &ConnectionTarget) -> Result<C::Stream, LinkError> {
        if target.connect_timeout.is_zero() {
            return self.connector.connect(target).await;
        }
        match timeout(target.connect_timeout, self.connector.connect(target)).await {
            Ok(result) => result,
            Err(_) => Err(LinkError::connect_timeout()),
        }
    }

    /// Run one connection attempt against `target`
    async fn attempt(self: &Arc<Self>, target: ConnectionTarget) -> AttemptOutcome {
        let retired = {
            let mut core = self.lock_core();
            if core.destroyed {
                return AttemptOutcome::Skipped;
            }
            match core.state.next(Trigger::ConnectRequested) {
                Some(next) => core.state = next,
                None => {
                    debug!("[LINK] Attempt skipped, state is {}", core.state);
                    return AttemptOutcome::Skipped;
                }
            }
            std::mem::take(&mut core.retired)
        };

        // The previous socket must be fully closed before a new one opens
        futures::future::join_all(retired).await;

        info!("[LINK] Connecting to {} via {}", target, self.connector.name());
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.connect_stream(&target) => Some(result),
        };

        match result {
            Some(Ok(stream)) => self.establish(stream),
            Some(Err(error)) => self.connect_failed(error),
            None => {
                self.lock_core().state = ConnectionState::Disconnected;
                AttemptOutcome::Skipped
            }
        }
    }

    fn connect_failed(&self, error: LinkError) -> AttemptOutcome {
        let mut core = self.lock_core();
        if core.destroyed {
            return AttemptOutcome::Skipped;
        }
        core.state = core
            .state
            .next(Trigger::ConnectFailed)
            .unwrap_or(ConnectionState::Disconnected);
        warn!("[LINK] Connection failed: {}", error);
        self.notifier.emit(ConnectionEvent::Error(error));
        AttemptOutcome::Failed
    }

    fn establish(self: &Arc<Self>, stream: C::Stream) -> AttemptOutcome {
        let peer = stream.peer_description();

        let mut core = self.lock_core();
        if core.destroyed {
            return AttemptOutcome::Skipped;
        }
        let Some(next) = core.state.next(Trigger::Established) else {
            return AttemptOutcome::Skipped;
        };
        core.state = next;
        core.epochs += 1;
        let epoch = core.epochs;
        // A loop still sleeping must not dial again
        core.reconnect.cancel();

        // Connected goes out before the read task can emit anything
        self.notifier.emit(ConnectionEvent::Connected);
        info!("[LINK] Connected to {} (epoch {})", peer, epoch);

        let cancel = self.cancel.child_token();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (reader, writer) = tokio::io::split(stream);

        let read_task = tokio::spawn(read_loop(Arc::clone(self), epoch, reader, cancel.clone()));
        let write_task = tokio::spawn(write_loop(
            Arc::clone(self),
            epoch,
            writer,
            outbound_rx,
            cancel.clone(),
        ));

        core.session = Some(Session {
            epoch,
            peer,
            outbound,
            cancel,
            tasks: vec![read_task, write_task],
        });
        AttemptOutcome::Connected
    }

    /// Forward received text unless the epoch has already ended
    fn deliver(&self, epoch: u64, text: String) {
        let core = self.lock_core();
        if core.owns_epoch(epoch) {
            debug!("[LINK] Received {} bytes", text.len());
            self.notifier.emit(ConnectionEvent::MessageReceived(text));
        }
    }

    /// End an epoch after a transport failure. Only the first caller acts.
    fn fail_epoch(self: &Arc<Self>, epoch: u64, trigger: Trigger, error: Option<LinkError>) {
        {
            let mut core = self.lock_core();
            if !core.owns_epoch(epoch) {
                debug!("[LINK] Epoch {} already closed", epoch);
                return;
            }
            core.teardown(trigger);
            match error {
                Some(error) => {
                    warn!("[LINK] Connection lost: {}", error);
                    self.notifier.emit(ConnectionEvent::Error(error));
                }
                None => warn!("[LINK] {}", LinkError::closed_by_peer()),
            }
            self.notifier.emit(ConnectionEvent::Disconnected);
        }

        if trigger.schedules_reconnect() {
            self.schedule_reconnect();
        }
    }

    /// Start the reconnect loop unless one is already running
    fn schedule_reconnect(self: &Arc<Self>) {
        let (id, token) = {
            let mut core = self.lock_core();
            if core.destroyed || core.state.is_connected() {
                return;
            }
            match core.reconnect.try_claim(&self.cancel) {
                Some(claim) => claim,
                None => {
                    debug!("[LINK] Reconnect already scheduled");
                    return;
                }
            }
        };

        let backoff = self.options.backoff;
        info!(
            "[LINK] Reconnecting every {}ms",
            backoff.delay(1).as_millis()
        );
        tokio::spawn(reconnect_loop(Arc::downgrade(self), id, token, backoff));
    }
}

/// Retry at a fixed interval until connected, cancelled or the manager is gone
async fn reconnect_loop<C: TransportConnector>(
    inner: Weak<Inner<C>>,
    id: u64,
    cancel: CancellationToken,
    backoff: FixedBackoff,
) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(backoff.delay(attempt)) => {}
        }

        let Some(manager) = inner.upgrade() else {
            return;
        };
        let target = {
            let core = manager.lock_core();
            if core.state.is_connected() {
                break;
            }
            core.target.clone()
        };
        let Some(target) = target else {
            break;
        };

        info!("[LINK] Reconnect attempt {} to {}", attempt, target);
        if manager.attempt(target).await == AttemptOutcome::Connected || cancel.is_cancelled() {
            break;
        }
    }

    if let Some(manager) = inner.upgrade() {
        manager.lock_core().reconnect.release(id);
    }
}

async fn read_loop<C, R>(inner: Arc<Inner<C>>, epoch: u64, mut reader: R, cancel: CancellationToken)
where
    C: TransportConnector,
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; inner.options.read_buffer_size];
    // One decoder per epoch, a partial character never crosses a reconnect
    let mut decoder = Utf8Decoder::new();
    let read_timeout = inner.options.read_timeout;

    let (trigger, error) = loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = timeout(read_timeout, reader.read(&mut buf)) => read,
        };

        match read {
            Ok(Ok(0)) => break (Trigger::StreamClosed, None),
            Ok(Ok(n)) => {
                if let Some(text) = decoder.decode(&buf[..n]) {
                    inner.deliver(epoch, text);
                }
            }
            Ok(Err(e)) => {
                break (
                    Trigger::IoFailed,
                    Some(LinkError::IoFailure(format!("read failed: {}", e))),
                )
            }
            Err(_) => {
                // Idle link; the timeout only lets us notice cancellation
                trace!("[LINK] {}, keeping connection", LinkError::ProtocolTimeout);
            }
        }
    };

    inner.fail_epoch(epoch, trigger, error);
}

async fn write_loop<C, W>(
    inner: Arc<Inner<C>>,
    epoch: u64,
    mut writer: W,
    mut outbound_rx: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
) where
    C: TransportConnector,
    W: AsyncWrite + Unpin,
{
    loop {
        let data = tokio::select! {
            _ = cancel.cancelled() => break,
            data = outbound_rx.recv() => match data {
                Some(data) => data,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = cancel.cancelled() => break,
            written = write_frame(&mut writer, &data) => written,
        };

        match written {
            Ok(()) => trace!("[LINK] Sent {} bytes", data.len()),
            Err(e) => {
                inner.fail_epoch(
                    epoch,
                    Trigger::IoFailed,
                    Some(LinkError::IoFailure(format!("write failed: {}", e))),
                );
                return;
            }
        }
    }

    let _ = writer.shutdown().await;
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}
