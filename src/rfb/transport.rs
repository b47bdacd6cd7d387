/// Boundary to the remote-framebuffer client library.
///
/// The wire protocol lives outside this crate; an embedding application
/// supplies an `RfbConnector` that hands out live `RfbClient`s. Mouse and
/// keyboard primitives only queue events; `drain` flushes them to the server.
use async_trait::async_trait;
use thiserror::Error;

use crate::config::Endpoint;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Authentication was rejected during the handshake.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The connection is gone: socket closed, reset, or handshake aborted.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A single request failed but the connection is still usable.
    #[error("transient failure: {0}")]
    Transient(String),
}

impl TransportError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, TransportError::ConnectionLost(_))
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof => TransportError::ConnectionLost(e.to_string()),
            _ => TransportError::Transient(e.to_string()),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One live connection to a remote-framebuffer server.
#[async_trait]
pub trait RfbClient: Send {
    /// Full-screen RGBA snapshot of the framebuffer.
    async fn screenshot(&mut self) -> TransportResult<image::RgbaImage>;

    fn mouse_move(&mut self, x: i32, y: i32) -> TransportResult<()>;

    /// Press and release a 0-indexed button at the current pointer position.
    fn mouse_click(&mut self, button: u8) -> TransportResult<()>;

    /// Press every key in order, then release them in reverse order.
    fn key_press(&mut self, keys: &[String]) -> TransportResult<()>;

    /// Type a run of characters.
    fn key_write(&mut self, text: &str) -> TransportResult<()>;

    /// Flush queued events to the server.
    async fn drain(&mut self) -> TransportResult<()>;

    /// Release the connection. Implementations should also release it on
    /// drop, since a manager dropped outside a runtime cannot call this.
    async fn close(&mut self) -> TransportResult<()>;
}

#[async_trait]
pub trait RfbConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        password: &str,
    ) -> TransportResult<Box<dyn RfbClient>>;
}
