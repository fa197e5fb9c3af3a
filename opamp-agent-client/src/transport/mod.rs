//! Transports moving frames between the agent and the server.
//!
//! [`HttpTransport`] posts one request per outbound frame. [`StreamingTransport`] keeps a
//! duplex connection open and owns it from a dedicated I/O thread.

use thiserror::Error;

use crate::common::framing::FramingError;
use crate::common::message_processor::FrameProcessor;
use crate::opamp::proto::AgentToServer;

pub mod config;
pub mod http;
pub mod http_client;
pub mod streaming;
pub mod websocket;

pub use config::{HttpConfig, HttpConfigError};
pub use self::http::HttpTransport;
pub use http_client::{HttpClient, HttpClientError, HttpClientReqwest};
pub use streaming::{Connection, Connector, StreamingTransport};
pub use websocket::{WebSocketConnection, WebSocketConnector};

/// Errors raised while moving frames.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request failed or the server answered with an error status.
    #[error("`{0}`")]
    Http(#[from] HttpClientError),
    /// WebSocket protocol or connection error.
    #[error("`{0}`")]
    WebSocket(#[from] tungstenite::Error),
    /// Frame header could not be written.
    #[error("`{0}`")]
    Framing(#[from] FramingError),
    /// The connection is closed, either by the peer or by `close`.
    #[error("connection closed")]
    Closed,
    /// `send` was called before `connect`.
    #[error("transport not connected")]
    NotConnected,
    /// `connect` was called twice.
    #[error("transport already connected")]
    AlreadyConnected,
    /// Indicates a poison error, where a thread panicked while holding a lock.
    #[error("poison error, a thread panicked while holding a lock")]
    PoisonError,
    /// The I/O thread panicked.
    #[error("error while joining the I/O thread")]
    JoinError,
}

/// Moves frames to the server and hands inbound ones to a [`FrameProcessor`].
///
/// Implementations are shared between the client and its heartbeat, so every operation
/// takes `&self`.
pub trait Transport: Send + Sync {
    /// Prepares the transport and registers where inbound frames go.
    fn connect(&self, processor: FrameProcessor) -> Result<(), TransportError>;

    /// Sends one frame. Returns once it was written, or, for HTTP, once the response arrived.
    fn send(&self, frame: &AgentToServer) -> Result<(), TransportError>;

    /// Releases the connection. Later sends fail with [`TransportError::Closed`].
    fn close(&self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&self, processor: FrameProcessor) -> Result<(), TransportError> {
        (**self).connect(processor)
    }

    fn send(&self, frame: &AgentToServer) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }
}
