//! Background services run by a started client.

use thiserror::Error;

use crate::operation::settings::ConfigurationError;

pub mod service;

pub use service::{HealthReportSender, HeartbeatService};

/// Errors raised by the heartbeat lifecycle.
#[derive(Error, Debug)]
pub enum HeartbeatError {
    /// `start` was called before `configure`.
    #[error("heartbeat service is not configured")]
    NotConfigured,
    /// The service already started; it cannot be configured or started again.
    #[error("heartbeat service already started")]
    AlreadyStarted,
    /// The heartbeat thread panicked.
    #[error("error while joining the heartbeat thread")]
    JoinError,
    /// Indicates a poison error, where a thread panicked while holding a lock.
    #[error("poison error, a thread panicked while holding a lock")]
    PoisonError,
    /// Invalid heartbeat settings.
    #[error("`{0}`")]
    Configuration(#[from] ConfigurationError),
}

/// Lifecycle of a service running in the background of a client.
///
/// `configure` must precede `start`. `start` may only succeed once. `stop` returns once
/// the background work has finished and is a no-op when repeated.
pub trait BackgroundService {
    /// Settings accepted by `configure`.
    type Settings;
    /// Lifecycle error.
    type Error: std::error::Error;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Applies `settings` before the service starts.
    fn configure(&mut self, settings: Self::Settings) -> Result<(), Self::Error>;

    /// Starts the background work.
    fn start(&mut self) -> Result<(), Self::Error>;

    /// Stops the background work and waits for it to finish.
    fn stop(&mut self) -> Result<(), Self::Error>;
}
