//! Session state machine and the public client surface
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──login ok──▶ Connected
//!      ▲                        │                        │
//!      │◀──── login failed ─────┘          disconnect /  │
//!      │                                   link lost     ▼
//!      └──────────────────────────────────────── Disconnecting
//! ```
//!
//! With `reconnect_on_packet_loss` enabled, a lost link goes back to
//! `Connecting` and logs in again with the same credentials instead of
//! terminating.

use crate::config::ClientConfig;
use crate::error::{RconError, Result};
use crate::registry::{CommandResponse, ResponseHandler};
use crate::transport::{LoopExit, Transport};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect` was called
    Manual,
    /// The server went silent and reconnecting was disabled or failed
    ConnectionLost,
}

/// Datagrams dropped by the receive cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketProblem {
    Checksum,
    Protocol(String),
    Receive(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { server: SocketAddr },
    ConsoleMessage { sequence: u8, body: String },
    CommandResponse(CommandResponse),
    Reconnecting { attempt: u32 },
    Disconnected(DisconnectReason),
    PacketProblem(PacketProblem),
}

/// Per-command settings for [`Session::send_command_with`].
#[derive(Default)]
pub struct CommandOptions {
    timeout: Option<Duration>,
    handler: Option<ResponseHandler>,
}

impl CommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs `handler` on the receive task when the response arrives, before
    /// the [`SessionEvent::CommandResponse`] event is published. Keep it short.
    pub fn on_response<F>(mut self, handler: F) -> Self
    where
        F: FnOnce(&CommandResponse) + Send + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }
}

/// Returned for every sent command. Drop it for fire-and-forget.
#[derive(Debug)]
pub struct CommandHandle {
    sequence: u8,
    timeout: Duration,
    response: oneshot::Receiver<CommandResponse>,
}

impl CommandHandle {
    pub(crate) fn new(
        sequence: u8,
        timeout: Duration,
        response: oneshot::Receiver<CommandResponse>,
    ) -> Self {
        Self {
            sequence,
            timeout,
            response,
        }
    }

    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// `None` when the command expired, the link went down, or the sequence
    /// number was reused before an answer came back.
    pub async fn response(self) -> Option<CommandResponse> {
        self.response.await.ok()
    }

    pub async fn wait(self) -> Result<CommandResponse> {
        let (sequence, timeout) = (self.sequence, self.timeout);
        self.response()
            .await
            .ok_or(RconError::CommandTimeout { sequence, timeout })
    }
}

#[derive(Debug, Clone)]
struct Credentials {
    server: SocketAddr,
    password: String,
}

struct Shared {
    config: ClientConfig,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<SessionEvent>,
    transport: parking_lot::Mutex<Option<Arc<Transport>>>,
    /// Created when `connect` starts, so `disconnect` can cut the login short
    shutdown: parking_lot::Mutex<Option<watch::Sender<bool>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Session state {:?} -> {:?}", previous, state);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn install(&self, transport: Arc<Transport>) {
        let server = transport.server();
        *self.transport.lock() = Some(transport);
        self.set_state(SessionState::Connected);
        info!("Connected to {}", server);
        self.emit(SessionEvent::Connected { server });
    }

    fn finish(&self, reason: DisconnectReason) {
        self.transport.lock().take();
        self.set_state(SessionState::Disconnected);
        info!("Disconnected ({:?})", reason);
        self.emit(SessionEvent::Disconnected(reason));
    }
}

/// An RCon session with one server.
///
/// Console messages, responses and connection changes are published on the
/// event receiver returned by [`Session::new`].
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    pub fn new(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Disconnected);

        let session = Session {
            shared: Arc::new(Shared {
                config,
                state,
                events,
                transport: parking_lot::Mutex::new(None),
                shutdown: parking_lot::Mutex::new(None),
                task: tokio::sync::Mutex::new(None),
            }),
        };

        (session, receiver)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Commands sent but not yet answered or expired.
    pub fn pending_command_count(&self) -> usize {
        self.shared
            .transport
            .lock()
            .as_ref()
            .map_or(0, |transport| transport.pending_count())
    }

    /// Logs in and starts the receive cycle. A concurrent [`Session::disconnect`]
    /// aborts the login with [`RconError::Interrupted`].
    pub async fn connect(&self, host: &str, port: u16, password: &str) -> Result<()> {
        self.shared.config.validate()?;

        let mut shutdown_rx = {
            let mut shutdown = self.shared.shutdown.lock();
            let claimed = self.shared.state.send_if_modified(|state| {
                if *state != SessionState::Disconnected {
                    return false;
                }
                *state = SessionState::Connecting;
                true
            });
            if !claimed {
                return Err(RconError::AlreadyConnected);
            }

            let (tx, rx) = watch::channel(false);
            *shutdown = Some(tx);
            rx
        };
        debug!("Session state Disconnected -> Connecting");

        // A link that ended on its own still holds a finished task
        let previous = self.shared.task.lock().await.take();
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                error!("Previous receive cycle task failed: {}", e);
            }
        }

        let login = async {
            let server = resolve(host, port).await?;
            let credentials = Credentials {
                server,
                password: password.to_string(),
            };
            let transport = establish(&self.shared, &credentials).await.map_err(|e| {
                warn!("Login to {} failed: {}", credentials.server, e);
                e
            })?;
            Ok::<_, RconError>((transport, credentials))
        };

        let result = tokio::select! {
            result = login => result,
            _ = shutdown_rx.changed() => {
                info!("Login to {}:{} interrupted by disconnect", host, port);
                Err(RconError::Interrupted)
            }
        };

        let (transport, credentials) = match result {
            Ok(established) => established,
            Err(e) => {
                self.abandon_connect();
                return Err(e);
            }
        };

        let mut task = self.shared.task.lock().await;
        // disconnect may have fired between the login and this point
        if *shutdown_rx.borrow() {
            drop(task);
            self.abandon_connect();
            return Err(RconError::Interrupted);
        }

        self.shared.install(Arc::clone(&transport));
        *task = Some(tokio::spawn(supervise(
            Arc::clone(&self.shared),
            transport,
            credentials,
            shutdown_rx,
        )));

        Ok(())
    }

    fn abandon_connect(&self) {
        self.shared.shutdown.lock().take();
        self.shared.set_state(SessionState::Disconnected);
    }

    pub async fn send_command(&self, text: impl Into<String>) -> Result<CommandHandle> {
        self.send_command_with(text, CommandOptions::default()).await
    }

    pub async fn send_command_with(
        &self,
        text: impl Into<String>,
        options: CommandOptions,
    ) -> Result<CommandHandle> {
        if !self.is_connected() {
            return Err(RconError::NotConnected);
        }

        let transport = self
            .shared
            .transport
            .lock()
            .clone()
            .ok_or(RconError::NotConnected)?;

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.shared.config.command_timeout());

        transport.send_command(text.into(), timeout, options.handler).await
    }

    /// Sends a command and waits for its body (`"OK"` for a bare ack).
    pub async fn execute(&self, text: impl Into<String>) -> Result<String> {
        let started = Instant::now();
        let handle = self.send_command(text).await?;

        match handle.wait().await {
            Ok(response) => Ok(response.body),
            // Released before its expiry: the link went down underneath it
            Err(RconError::CommandTimeout { timeout, .. })
                if started.elapsed() < timeout || !self.is_connected() =>
            {
                Err(RconError::ConnectionLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Stops the receive cycle and releases the socket. Pending commands
    /// resolve to "no response". A login still in progress is aborted.
    /// Calling it while disconnected is a no-op.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(shutdown) = self.shared.shutdown.lock().take() else {
            debug!("disconnect called without an active session");
            return Ok(());
        };

        self.shared.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                return false;
            }
            *state = SessionState::Disconnecting;
            true
        });
        let _ = shutdown.send(true);

        let task = self.shared.task.lock().await.take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!("Receive cycle task failed: {}", e);
                    self.shared.finish(DisconnectReason::Manual);
                }
            }
            None => {
                // Interrupted login: connect puts the state back itself
                let mut state = self.shared.state.subscribe();
                while *state.borrow_and_update() != SessionState::Disconnected {
                    if state.changed().await.is_err() {
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shared.shutdown.lock().take() {
            let _ = shutdown.send(true);
        }
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| RconError::ConnectionFailed(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| RconError::ConnectionFailed(format!("no address for {}", host)))
}

async fn establish(shared: &Shared, credentials: &Credentials) -> Result<Arc<Transport>> {
    let transport = Transport::open(credentials.server, shared.config.clone(), shared.events.clone())
        .await
        .map_err(|e| RconError::ConnectionFailed(e.to_string()))?;

    transport.login(&credentials.password).await?;
    Ok(Arc::new(transport))
}

/// Owns the receive cycle for the lifetime of a connection, including any
/// automatic reconnects.
async fn supervise(
    shared: Arc<Shared>,
    mut transport: Arc<Transport>,
    credentials: Credentials,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let exit = Arc::clone(&transport).run(shutdown.clone()).await;

        match exit {
            LoopExit::Shutdown => {
                shared.finish(DisconnectReason::Manual);
                return;
            }
            LoopExit::ConnectionLost(cause) => {
                warn!("Connection to {} lost: {:?}", credentials.server, cause);
                shared.set_state(SessionState::Disconnecting);
                shared.transport.lock().take();

                if !shared.config.reconnect_on_packet_loss {
                    shared.finish(DisconnectReason::ConnectionLost);
                    return;
                }

                match reconnect(&shared, &credentials, &mut shutdown).await {
                    Some(next) => {
                        transport = next;
                        shared.install(Arc::clone(&transport));
                    }
                    None if *shutdown.borrow() => {
                        shared.finish(DisconnectReason::Manual);
                        return;
                    }
                    None => {
                        shared.finish(DisconnectReason::ConnectionLost);
                        return;
                    }
                }
            }
        }
    }
}

async fn reconnect(
    shared: &Shared,
    credentials: &Credentials,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<Arc<Transport>> {
    let attempts = shared.config.max_reconnect_attempts;

    for attempt in 1..=attempts {
        if *shutdown.borrow() {
            return None;
        }

        shared.set_state(SessionState::Connecting);
        shared.emit(SessionEvent::Reconnecting { attempt });
        info!(
            "Reconnecting to {} (attempt {}/{})",
            credentials.server, attempt, attempts
        );

        let result = tokio::select! {
            result = establish(shared, credentials) => result,
            _ = shutdown.changed() => return None,
        };

        match result {
            Ok(transport) => return Some(transport),
            Err(e) if !e.is_transient() => {
                warn!("Giving up on reconnecting: {}", e);
                return None;
            }
            Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
        }

        if attempt < attempts {
            tokio::select! {
                _ = sleep(shared.config.reconnect_delay()) => {},
                _ = shutdown.changed() => return None,
            }
        }
    }

    None
}
