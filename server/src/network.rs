//! Server network layer handling UDP communication with remote consoles

use crate::client_manager::ClientManager;
use crate::commands::respond;
use crate::ServerError;
use log::{debug, error, info, trace, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use rcon_shared::{decode_request, encode, Datagram, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Development server behaviour, including fault injection
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub password: String,
    /// Probability of silently dropping an outbound datagram
    pub drop_rate: f64,
    /// Send the parts of multi-part responses in random order
    pub shuffle_fragments: bool,
    /// Largest response body sent in a single datagram
    pub fragment_size: usize,
    /// Unacknowledged console messages are re-sent after this long
    pub message_resend_after: Duration,
    pub max_message_attempts: u32,
    /// Clients silent for longer than this are forgotten
    pub client_timeout: Duration,
    /// Names listed by the `players` command
    pub players: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            password: "secret".to_string(),
            drop_rate: 0.0,
            shuffle_fragments: false,
            fragment_size: 1024,
            message_resend_after: Duration::from_secs(2),
            max_message_attempts: 5,
            client_timeout: Duration::from_secs(45),
            players: vec!["Miller".to_string(), "Kerry".to_string()],
        }
    }
}

/// Messages sent to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived { bytes: Vec<u8>, addr: SocketAddr },
    Broadcast(String),
    Shutdown,
}

/// Cloneable handle for controlling a running [`Server`]
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    /// Sends `text` as a console message to every logged-in client
    pub fn broadcast(&self, text: impl Into<String>) {
        if let Err(e) = self.tx.send(ServerMessage::Broadcast(text.into())) {
            error!("Failed to queue broadcast: {}", e);
        }
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(ServerMessage::Shutdown);
    }
}

pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    clients: ClientManager,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("RCon server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            config,
            clients: ClientManager::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            tx: self.server_tx.clone(),
        }
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) -> tokio::task::JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let message = ServerMessage::DatagramReceived {
                            bytes: buffer[..len].to_vec(),
                            addr,
                        };
                        if server_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // ICMP port unreachable from a vanished client surfaces here
                        debug!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    fn should_drop(&self) -> bool {
        self.config.drop_rate > 0.0 && rand::thread_rng().gen_bool(self.config.drop_rate.min(1.0))
    }

    async fn send(&self, datagram: &Datagram, addr: SocketAddr) {
        if self.should_drop() {
            trace!("Dropping {:?} to {}", datagram, addr);
            return;
        }

        if let Err(e) = self.socket.send_to(&encode(datagram), addr).await {
            warn!("Failed to send datagram to {}: {}", addr, e);
        }
    }

    async fn handle_datagram(&mut self, bytes: &[u8], addr: SocketAddr) {
        let datagram = match decode_request(bytes) {
            Ok(datagram) => datagram,
            Err(e) => {
                warn!("Dropping invalid datagram from {}: {}", addr, e);
                return;
            }
        };

        let now = Instant::now();
        match datagram {
            Datagram::LoginRequest { password } => {
                let success = password == self.config.password;
                if success {
                    self.clients.login(addr, now);
                } else {
                    info!("Rejected login from {}", addr);
                }
                self.send(&Datagram::LoginResponse { success }, addr).await;
            }

            Datagram::Command { sequence, text } => {
                let Some(client) = self.clients.get_mut(&addr) else {
                    debug!("Command from {} without login", addr);
                    return;
                };
                client.touch(now);

                debug!("Command {} from {}: {:?}", sequence, addr, text);
                let mut reply = respond(sequence, &text, &self.config);
                if self.config.shuffle_fragments && reply.datagrams.len() > 1 {
                    reply.datagrams.shuffle(&mut rand::thread_rng());
                }

                for datagram in &reply.datagrams {
                    self.send(datagram, addr).await;
                }
                if let Some(text) = reply.broadcast {
                    self.broadcast(&text).await;
                }
            }

            Datagram::MessageAck { sequence } => {
                if let Some(client) = self.clients.get_mut(&addr) {
                    client.touch(now);
                    if !client.acknowledge(sequence) {
                        trace!("Repeated ack {} from {}", sequence, addr);
                    }
                }
            }

            other => warn!("Unexpected {:?} from {}", other, addr),
        }
    }

    async fn broadcast(&mut self, text: &str) {
        if self.clients.is_empty() {
            debug!("No clients to broadcast to");
            return;
        }

        let now = Instant::now();
        let mut outgoing = Vec::new();

        for client in self.clients.clients_mut() {
            let message = client.queue_message(text, now);
            outgoing.push((
                client.addr,
                Datagram::ConsoleMessage {
                    sequence: message.sequence,
                    body: message.body,
                },
            ));
        }

        for (addr, datagram) in &outgoing {
            self.send(datagram, *addr).await;
        }
    }

    async fn on_tick(&mut self) {
        let now = Instant::now();
        self.clients.check_timeouts(now, self.config.client_timeout);

        let mut outgoing = Vec::new();
        for client in self.clients.clients_mut() {
            for message in client.due_for_resend(
                now,
                self.config.message_resend_after,
                self.config.max_message_attempts,
            ) {
                debug!(
                    "Re-sending console message {} to {} (attempt {})",
                    message.sequence, client.addr, message.attempts
                );
                outgoing.push((
                    client.addr,
                    Datagram::ConsoleMessage {
                        sequence: message.sequence,
                        body: message.body,
                    },
                ));
            }
        }

        for (addr, datagram) in &outgoing {
            self.send(datagram, *addr).await;
        }
    }

    /// Main server loop; returns after a shutdown request
    pub async fn run(&mut self) -> Result<(), ServerError> {
        let receiver = self.spawn_network_receiver();

        let mut tick_interval = interval(Duration::from_millis(250));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::DatagramReceived { bytes, addr }) => {
                            self.handle_datagram(&bytes, addr).await;
                        },
                        Some(ServerMessage::Broadcast(text)) => {
                            info!("Broadcasting to {} clients: {}", self.clients.len(), text);
                            self.broadcast(&text).await;
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => self.on_tick().await,
            }
        }

        receiver.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = assert_ok!(Server::bind("127.0.0.1:0", ServerConfig::default()).await);
        let addr = assert_ok!(server.local_addr());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let mut server = assert_ok!(Server::bind("127.0.0.1:0", ServerConfig::default()).await);
        let handle = server.handle();
        handle.shutdown();
        assert_ok!(server.run().await);
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.password, "secret");
        assert_eq!(config.drop_rate, 0.0);
        assert_eq!(config.client_timeout, Duration::from_secs(45));
    }
}
