//! # RCon Client Library
//!
//! This library implements the client side of the "BE" remote console
//! protocol: a small UDP protocol used to administer game servers. It handles
//! the login handshake, command submission, response correlation,
//! reassembly of responses split over several datagrams, and delivery of
//! console messages pushed by the server.
//!
//! ## Architecture Overview
//!
//! UDP gives no delivery guarantee, so the client layers a small amount of
//! reliability on top of it:
//!
//! ### Sequence Numbers
//! Every command carries a one-byte sequence number that wraps after 255.
//! The server echoes it in its ack or response, which is how answers find
//! their way back to the caller that sent the command.
//!
//! ### Retransmission and Liveness
//! Commands stay in a ledger until the server acknowledges them. When the
//! server goes quiet while commands are outstanding, the oldest one is sent
//! again. Prolonged silence marks the link as lost.
//!
//! ### Keep-Alive
//! The server forgets clients that stay quiet for too long. An empty command
//! is sent as a probe whenever nothing else has gone out for a while.
//!
//! ## Module Organization
//!
//! ### Session (`session`)
//! The public surface: connect, send commands, disconnect, and the event
//! stream carrying console messages, responses and connection changes.
//!
//! ### Transport (`transport`)
//! Owns the socket and runs the receive cycle that decodes datagrams and
//! drives the periodic expiry, retransmission and keep-alive checks.
//!
//! ### Bookkeeping (`registry`, `assembler`, `ledger`, `tracker`)
//! Pending commands keyed by sequence number, multi-part reassembly, the
//! retransmission ledger and the duplicate console message window.
//!
//! ### Timing Policies (`liveness`, `keepalive`)
//! Pure state machines fed with timestamps by the receive cycle.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use rcon_client::{ClientConfig, Session, SessionEvent};
//!
//! # async fn example() -> Result<(), rcon_client::RconError> {
//! let (session, mut events) = Session::new(ClientConfig::default());
//! session.connect("127.0.0.1", 2302, "secret").await?;
//!
//! let players = session.execute("players").await?;
//! println!("{}", players);
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::ConsoleMessage { body, .. } = event {
//!         println!("{}", body);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod commands;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod ledger;
pub mod liveness;
pub mod registry;
pub mod session;
pub mod tracker;
mod transport;

pub use commands::{ServerCommand, ALL_PLAYERS};
pub use config::ClientConfig;
pub use error::{RconError, Result};
pub use registry::CommandResponse;
pub use session::{
    CommandHandle, CommandOptions, DisconnectReason, PacketProblem, Session, SessionEvent,
    SessionState,
};
pub use transport::{LossCause, LoopExit};
