use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Transport noise (corrupted or duplicate datagrams) never shows up here;
/// it is dropped inside the receive cycle and reported through
/// [`crate::session::SessionEvent::PacketProblem`] at most.
#[derive(Debug, Error)]
pub enum RconError {
    /// The server rejected the password.
    #[error("server rejected the login credentials")]
    InvalidCredentials,

    /// Socket-level failure while connecting.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No login response arrived in time.
    #[error("no login response within {0:?}")]
    LoginTimeout(Duration),

    #[error("not connected")]
    NotConnected,

    #[error("session is already connected or connecting")]
    AlreadyConnected,

    /// `disconnect` was called before the login finished.
    #[error("connect was interrupted by disconnect")]
    Interrupted,

    /// The command received neither an ack nor a response before it expired.
    #[error("command {sequence} received no response within {timeout:?}")]
    CommandTimeout { sequence: u8, timeout: Duration },

    /// The link went silent and was torn down while a command was waiting.
    #[error("connection lost")]
    ConnectionLost,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RconError {
    /// Whether a reconnect attempt could succeed after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RconError::ConnectionFailed(_) | RconError::LoginTimeout(_) | RconError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RconError>;
