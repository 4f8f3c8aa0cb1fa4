//! Transport loop: socket ownership, login handshake and the receive cycle
//!
//! One [`Transport`] exists per logged-in link. Callers send through it from
//! any task (the UDP socket handles concurrent send and receive), while a
//! single spawned receive cycle decodes inbound datagrams, routes responses
//! to the pending-command registry and console messages to the event
//! stream, and runs the periodic expiry sweep, retransmission and keep-alive
//! checks.

use crate::config::ClientConfig;
use crate::error::{RconError, Result};
use crate::keepalive::{KeepAliveAction, KeepAliveSupervisor};
use crate::ledger::RetransmissionLedger;
use crate::liveness::LivenessMonitor;
use crate::registry::{FragmentOutcome, PendingCommand, PendingRegistry, ResponseHandler};
use crate::session::{CommandHandle, PacketProblem, SessionEvent};
use crate::tracker::SequenceTracker;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use rcon_shared::{decode, encode, Datagram, MAX_DATAGRAM_SIZE};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Identical receive errors are reported at most this often
const RECEIVE_ERROR_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Why the receive cycle stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Shutdown,
    ConnectionLost(LossCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCause {
    /// Nothing arrived from the server while commands were outstanding
    Silence(Duration),
    /// Keep-alive probes went unanswered
    UnansweredProbes(u32),
}

pub(crate) struct Transport {
    socket: UdpSocket,
    server: SocketAddr,
    config: ClientConfig,
    next_sequence: AtomicU8,
    registry: Mutex<PendingRegistry>,
    ledger: Mutex<RetransmissionLedger>,
    keep_alive: Mutex<KeepAliveSupervisor>,
    liveness: Mutex<LivenessMonitor>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl Transport {
    /// Binds an ephemeral local port and connects it to `server`.
    pub async fn open(
        server: SocketAddr,
        config: ClientConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> io::Result<Self> {
        let local: SocketAddr = if server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;
        debug!("Bound {} for {}", socket.local_addr()?, server);

        let now = Instant::now();
        Ok(Transport {
            socket,
            server,
            next_sequence: AtomicU8::new(0),
            registry: Mutex::new(PendingRegistry::new()),
            ledger: Mutex::new(RetransmissionLedger::new(config.resend_after())),
            keep_alive: Mutex::new(KeepAliveSupervisor::new(
                config.keep_alive_interval(),
                config.resend_after(),
                config.max_unanswered_probes,
                now,
            )),
            liveness: Mutex::new(LivenessMonitor::new(config.connection_lost_after(), now)),
            config,
            events,
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Sends the password and waits for the server's verdict.
    pub async fn login(&self, password: &str) -> Result<()> {
        info!("Logging in to {}", self.server);

        self.send_datagram(&Datagram::LoginRequest {
            password: password.to_string(),
        })
        .await
        .map_err(|e| RconError::ConnectionFailed(e.to_string()))?;

        let timeout = self.config.login_timeout();
        match tokio::time::timeout(timeout, self.await_login_response()).await {
            Err(_) => Err(RconError::LoginTimeout(timeout)),
            Ok(Err(e)) => Err(RconError::ConnectionFailed(e.to_string())),
            Ok(Ok(false)) => Err(RconError::InvalidCredentials),
            Ok(Ok(true)) => {
                self.liveness.lock().on_received(Instant::now(), false);
                Ok(())
            }
        }
    }

    async fn await_login_response(&self) -> io::Result<bool> {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

        loop {
            let len = self.socket.recv(&mut buffer).await?;
            match decode(&buffer[..len]) {
                Ok(Datagram::LoginResponse { success }) => return Ok(success),
                Ok(other) => debug!("Ignoring {:?} while waiting for login response", other),
                Err(e) => debug!("Dropping datagram while waiting for login response: {}", e),
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }

    fn next_sequence(&self) -> u8 {
        // fetch_add wraps at 255
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send_command(
        &self,
        text: String,
        timeout: Duration,
        handler: Option<ResponseHandler>,
    ) -> Result<CommandHandle> {
        let sequence = self.next_sequence();
        let now = Instant::now();
        let (tx, rx) = oneshot::channel();

        let mut entry = PendingCommand::new(sequence, text.clone(), now, timeout).with_waiter(tx);
        if let Some(handler) = handler {
            entry = entry.with_handler(handler);
        }

        // Registered before sending so an immediate reply finds its entry
        drop(self.registry.lock().register(entry));
        self.ledger.lock().push(sequence, text.clone());

        debug!("Sending command {}: {:?}", sequence, text);
        if let Err(e) = self.send_datagram(&Datagram::Command { sequence, text }).await {
            drop(self.registry.lock().take(sequence));
            self.ledger.lock().remove(sequence);
            return Err(e.into());
        }

        self.keep_alive.lock().note_command_sent(now);
        self.liveness.lock().on_sent(now);

        Ok(CommandHandle::new(sequence, timeout, rx))
    }

    async fn send_datagram(&self, datagram: &Datagram) -> io::Result<()> {
        let bytes = encode(datagram);
        self.socket.send(&bytes).await?;
        Ok(())
    }

    /// Probes stay out of the liveness monitor; the keep-alive supervisor
    /// counts them instead.
    async fn send_probe(&self, now: Instant) -> io::Result<()> {
        let sequence = self.next_sequence();
        let unanswered = {
            let mut keep_alive = self.keep_alive.lock();
            keep_alive.probe_sent(sequence, now);
            keep_alive.unanswered()
        };

        debug!("Sending keep-alive probe {} ({} in a row)", sequence, unanswered);
        self.send_datagram(&Datagram::Command {
            sequence,
            text: String::new(),
        })
        .await
    }

    /// The receive cycle. Returns when `shutdown` flips to true or the link
    /// is declared lost; pending waiters are released either way.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> LoopExit {
        let mut buffer = [0u8; MAX_DATAGRAM_SIZE];
        let mut tracker = SequenceTracker::new(self.config.duplicate_window);
        let mut receive_errors = ErrorThrottle::new(RECEIVE_ERROR_REPORT_INTERVAL);

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Receive cycle started for {}", self.server);

        let exit = if *shutdown.borrow() {
            LoopExit::Shutdown
        } else {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break LoopExit::Shutdown;
                        }
                    },

                    result = self.socket.recv(&mut buffer) => {
                        match result {
                            Ok(len) => self.handle_bytes(&buffer[..len], &mut tracker).await,
                            Err(e) => {
                                let message = e.to_string();
                                if let Some(suppressed) = receive_errors.admit(&message, Instant::now()) {
                                    warn!(
                                        "Error receiving datagram from {}: {} ({} repeats suppressed)",
                                        self.server, message, suppressed
                                    );
                                    self.report(PacketProblem::Receive(message));
                                }
                                sleep(Duration::from_millis(10)).await;
                            }
                        }
                    },

                    _ = ticker.tick() => {
                        if let Some(exit) = self.on_tick(Instant::now()).await {
                            break exit;
                        }
                    },
                }
            }
        };

        self.release_waiters();
        info!("Receive cycle for {} stopped: {:?}", self.server, exit);
        exit
    }

    async fn handle_bytes(&self, bytes: &[u8], tracker: &mut SequenceTracker) {
        let datagram = match decode(bytes) {
            Ok(datagram) => datagram,
            Err(e) if e.is_checksum() => {
                debug!("Dropping corrupted datagram: {}", e);
                self.report(PacketProblem::Checksum);
                return;
            }
            Err(e) => {
                warn!("Dropping invalid datagram: {}", e);
                self.report(PacketProblem::Protocol(e.to_string()));
                return;
            }
        };

        let now = Instant::now();
        trace!("Received {:?}", datagram);

        match datagram {
            Datagram::CommandAck { sequence } => self.resolve(sequence, None),
            Datagram::CommandResponse { sequence, body } => self.resolve(sequence, Some(body)),
            Datagram::CommandResponsePart {
                sequence,
                index,
                total,
                fragment,
            } => {
                let outcome = self
                    .registry
                    .lock()
                    .accept_fragment(sequence, index, total, fragment);

                match outcome {
                    FragmentOutcome::Pending { received, total } => {
                        trace!("Command {}: {}/{} parts", sequence, received, total)
                    }
                    FragmentOutcome::Complete(body) => self.resolve(sequence, Some(body)),
                    FragmentOutcome::Unknown => {
                        debug!("Fragment {} of {} for unknown command {}", index, total, sequence)
                    }
                    FragmentOutcome::Discarded(error) => {
                        warn!("Discarding multi-part response {}: {}", sequence, error);
                        self.report(PacketProblem::Protocol(error.to_string()));
                    }
                }
            }
            Datagram::ConsoleMessage { sequence, body } => {
                // Always acknowledge, otherwise the server keeps re-sending
                if let Err(e) = self.send_datagram(&Datagram::MessageAck { sequence }).await {
                    warn!("Failed to acknowledge console message {}: {}", sequence, e);
                }

                if tracker.observe(sequence) {
                    self.emit(SessionEvent::ConsoleMessage { sequence, body });
                } else {
                    debug!("Duplicate console message {}", sequence);
                }
            }
            Datagram::LoginResponse { success } => {
                debug!("Ignoring late login response (success: {})", success)
            }
            Datagram::LoginRequest { .. } | Datagram::Command { .. } | Datagram::MessageAck { .. } => {
                warn!("Server sent a client-side datagram")
            }
        }

        let outstanding = self.has_outstanding();
        self.liveness.lock().on_received(now, outstanding);
    }

    /// Unacknowledged commands keep the silence window running
    fn has_outstanding(&self) -> bool {
        !self.ledger.lock().is_empty()
    }

    fn resolve(&self, sequence: u8, body: Option<String>) {
        let entry = self.registry.lock().take(sequence);
        self.ledger.lock().remove(sequence);
        let probe = self.keep_alive.lock().acknowledge(sequence);

        match entry {
            Some(entry) => {
                let response = entry.complete(body);
                debug!(
                    "Command {} ({:?}) answered with {} bytes",
                    sequence,
                    response.command,
                    response.body.len()
                );
                self.emit(SessionEvent::CommandResponse(response));
            }
            None if probe => trace!("Keep-alive probe {} acknowledged", sequence),
            None => debug!("Response for command {} arrived after it was resolved or expired", sequence),
        }
    }

    async fn on_tick(&self, now: Instant) -> Option<LoopExit> {
        let expired = self.registry.lock().sweep_expired(now);
        drop(expired);

        let (silence, lost, last_received) = {
            let liveness = self.liveness.lock();
            (liveness.silence(now), liveness.is_lost(now), liveness.last_received())
        };
        if lost {
            warn!(
                "No answer from {} for {:?}, last datagram {:?} ago",
                self.server,
                silence,
                now.saturating_duration_since(last_received)
            );
            return Some(LoopExit::ConnectionLost(LossCause::Silence(silence)));
        }

        let resend = self.ledger.lock().due_for_resend(now, silence);
        if let Some(entry) = resend {
            info!(
                "Re-sending command {} ({:?}) after {:?} of silence",
                entry.sequence, entry.text, silence
            );
            let datagram = Datagram::Command {
                sequence: entry.sequence,
                text: entry.text,
            };
            if let Err(e) = self.send_datagram(&datagram).await {
                warn!("Failed to re-send command {}: {}", entry.sequence, e);
            }
        }

        let action = self.keep_alive.lock().poll(now);
        match action {
            KeepAliveAction::Idle => {}
            KeepAliveAction::SendProbe => {
                if let Err(e) = self.send_probe(now).await {
                    warn!("Failed to send keep-alive probe: {}", e);
                }
            }
            KeepAliveAction::LinkDead { unanswered } => {
                warn!("{} keep-alive probes to {} went unanswered", unanswered, self.server);
                return Some(LoopExit::ConnectionLost(LossCause::UnansweredProbes(unanswered)));
            }
        }

        None
    }

    /// Drops every pending command so awaiting callers observe "no response".
    fn release_waiters(&self) {
        let released = self.registry.lock().drain();
        let unacknowledged = {
            let mut ledger = self.ledger.lock();
            let count = ledger.len();
            ledger.clear();
            count
        };
        if !released.is_empty() || unacknowledged > 0 {
            debug!(
                "Released {} pending commands, dropped {} unacknowledged",
                released.len(),
                unacknowledged
            );
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is not an error
        let _ = self.events.send(event);
    }

    fn report(&self, problem: PacketProblem) {
        self.emit(SessionEvent::PacketProblem(problem));
    }
}

/// Collapses bursts of identical errors into one report per interval.
#[derive(Debug)]
struct ErrorThrottle {
    interval: Duration,
    last: Option<(String, Instant)>,
    suppressed: u32,
}

impl ErrorThrottle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Returns the number of repeats suppressed since the previous report
    /// when `message` should be reported now, `None` otherwise.
    fn admit(&mut self, message: &str, now: Instant) -> Option<u32> {
        if let Some((last, reported_at)) = &self.last {
            if last == message && now.saturating_duration_since(*reported_at) < self.interval {
                self.suppressed += 1;
                return None;
            }
        }

        self.last = Some((message.to_string(), now));
        Some(std::mem::take(&mut self.suppressed))
    }
}
