//! # RCon Development Server Library
//!
//! This library provides a small stand-in for a game server's remote console
//! endpoint. It speaks the same "BE" datagram protocol as a real server and
//! exists so the client can be exercised end to end without one: in the
//! integration tests, and from the command line while developing tools on
//! top of the client.
//!
//! ## Core Responsibilities
//!
//! ### Login
//! Checks the password of every login request and remembers the addresses
//! that logged in successfully. Commands from anyone else are ignored.
//!
//! ### Command Replies
//! Answers a handful of well-known commands. Empty commands (keep-alive
//! probes) get a bare ack, `players` a single-datagram body and
//! `getplayersmulti` a ten-part response. Everything else is answered with
//! "Unknown command".
//!
//! ### Console Messages
//! Broadcasts console messages with a per-client sequence number and
//! re-delivers them until the client acknowledges them.
//!
//! ## Fault Injection
//!
//! [`network::ServerConfig`] can drop a share of outbound datagrams at random
//! and shuffle the parts of multi-part responses, which is what the
//! client's retransmission and reassembly logic has to cope with on a real
//! network.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Logged-in clients, console message numbering and re-delivery, timeouts.
//!
//! ### Commands Module (`commands`)
//! The canned replies and body splitting into multi-part responses.
//!
//! ### Network Module (`network`)
//! Socket handling and the main event loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rcon_server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rcon_server::ServerError> {
//!     let mut server = Server::bind("127.0.0.1:2302", ServerConfig::default()).await?;
//!
//!     let handle = server.handle();
//!     handle.broadcast("Server restart in 5 minutes");
//!
//!     server.run().await
//! }
//! ```

pub mod client_manager;
pub mod commands;
pub mod network;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid server configuration: {0}")]
    Config(String),
}
