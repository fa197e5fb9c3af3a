//! This module defines a set of error types and result types related to the OpAMP client and management.

use thiserror::Error;

use crate::heartbeat::HeartbeatError;
use crate::operation::settings::ConfigurationError;
use crate::transport::{HttpClientError, TransportError};

/// Represents various errors that can occur while a started client talks to the server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Indicates a poison error, where a thread panicked while holding a lock.
    #[error("poison error, a thread panicked while holding a lock")]
    PoisonError,
    /// Represents a transport error.
    #[error("`{0}`")]
    TransportError(#[from] TransportError),
    /// Represents a heartbeat error.
    #[error("`{0}`")]
    HeartbeatError(#[from] HeartbeatError),
}

/// Represents errors raised while building or starting a client.
#[derive(Error, Debug)]
pub enum NotStartedClientError {
    /// Invalid client settings.
    #[error("`{0}`")]
    ConfigurationError(#[from] ConfigurationError),
    /// The HTTP client could not be built.
    #[error("`{0}`")]
    HttpClientError(#[from] HttpClientError),
    /// Connecting or sending the first message failed.
    #[error("`{0}`")]
    TransportError(#[from] TransportError),
    /// The heartbeat could not be started.
    #[error("`{0}`")]
    HeartbeatError(#[from] HeartbeatError),
}

/// Represents errors related to the OpAMP started client.
#[derive(Error, Debug)]
pub enum StartedClientError {
    /// Represents a client error.
    #[error("`{0}`")]
    ClientError(#[from] ClientError),
    /// Represents a heartbeat error.
    #[error("`{0}`")]
    HeartbeatError(#[from] HeartbeatError),
    /// Represents a transport error.
    #[error("`{0}`")]
    TransportError(#[from] TransportError),
}

/// A type alias for results from OpAMP operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// A type alias for results from the OpAMP not started client.
pub type NotStartedClientResult<T> = Result<T, NotStartedClientError>;

/// A type alias for results from the OpAMP started client.
pub type StartedClientResult<T> = Result<T, StartedClientError>;
