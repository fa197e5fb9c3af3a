//! Parameters for building an OpAMP client for a specific agent.
//!
//! Settings are validated once when the client is built and immutable afterwards.

use std::time::Duration;

use thiserror::Error;

use super::agent_description::AgentDescription;
use super::capabilities::Capabilities;
use super::health::HealthStatus;
use super::instance_uid::InstanceUid;
use crate::transport::config::{HttpConfig, HttpConfigError};

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Errors found while validating the client settings.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Invalid url or headers.
    #[error("`{0}`")]
    Http(#[from] HttpConfigError),
    /// The url scheme does not match the connection type.
    #[error("scheme `{scheme}` is not supported by the {connection_type:?} connection type")]
    UnsupportedScheme {
        /// Scheme of the configured url.
        scheme: String,
        /// Selected connection type.
        connection_type: ConnectionType,
    },
    /// Heartbeats were enabled with a zero interval.
    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,
}

/// How the client talks to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionType {
    /// One HTTP POST per outbound frame, inbound frames arrive as responses.
    #[default]
    Http,
    /// A persistent WebSocket connection carrying frames both ways.
    Streaming,
}

impl ConnectionType {
    fn supports_scheme(self, scheme: &str) -> bool {
        match self {
            ConnectionType::Http => matches!(scheme, "http" | "https"),
            ConnectionType::Streaming => matches!(scheme, "ws" | "wss"),
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Whether the client runs the heartbeat service.
    pub enabled: bool,
    /// Time between two heartbeats.
    pub interval: Duration,
    /// Skip heartbeats until the agent reports its first status.
    /// Ignored when `initial_status` is set.
    pub wait_for_first_status: bool,
    /// Status reported until the agent updates it.
    pub initial_status: Option<HealthStatus>,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            wait_for_first_status: true,
            initial_status: None,
        }
    }
}

impl HeartbeatSettings {
    /// Settings with heartbeats turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Sets the time between two heartbeats.
    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    /// Sets whether heartbeats wait for the first reported status.
    pub fn with_wait_for_first_status(self, wait_for_first_status: bool) -> Self {
        Self {
            wait_for_first_status,
            ..self
        }
    }

    /// Sets the status reported before the first update.
    pub fn with_initial_status(self, status: HealthStatus) -> Self {
        Self {
            initial_status: Some(status),
            ..self
        }
    }

    /// Checks the settings are usable by a running heartbeat.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.enabled && self.interval.is_zero() {
            return Err(ConfigurationError::ZeroHeartbeatInterval);
        }
        Ok(())
    }
}

/// Everything needed to build a client.
///
/// ```rust
/// use std::time::Duration;
/// use opamp_agent_client::operation::settings::{ClientSettings, ConnectionType, HeartbeatSettings};
///
/// let settings = ClientSettings::new("wss://my-server.com/v1/opamp")
///     .unwrap()
///     .with_connection_type(ConnectionType::Streaming)
///     .with_heartbeat(HeartbeatSettings::default().with_interval(Duration::from_secs(15)))
///     .with_headers([("api-key", "secret")])
///     .unwrap();
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ClientSettings {
    instance_uid: InstanceUid,
    connection_type: ConnectionType,
    http: HttpConfig,
    heartbeat: HeartbeatSettings,
    agent_description: AgentDescription,
    capabilities: Capabilities,
}

impl ClientSettings {
    /// Settings for a server at `url`, with a freshly generated instance uid.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provided URL is not valid.
    pub fn new(url: &str) -> Result<Self, ConfigurationError> {
        Ok(Self {
            instance_uid: InstanceUid::create(),
            connection_type: ConnectionType::default(),
            http: HttpConfig::new(url)?,
            heartbeat: HeartbeatSettings::default(),
            agent_description: AgentDescription::default(),
            capabilities: Capabilities::default(),
        })
    }

    /// Reuses a previously persisted instance uid.
    pub fn with_instance_uid(self, instance_uid: InstanceUid) -> Self {
        Self {
            instance_uid,
            ..self
        }
    }

    /// Selects the transport.
    pub fn with_connection_type(self, connection_type: ConnectionType) -> Self {
        Self {
            connection_type,
            ..self
        }
    }

    /// Replaces the heartbeat settings.
    pub fn with_heartbeat(self, heartbeat: HeartbeatSettings) -> Self {
        Self { heartbeat, ..self }
    }

    /// Sets the description sent on the first frame.
    pub fn with_agent_description(self, agent_description: AgentDescription) -> Self {
        Self {
            agent_description,
            ..self
        }
    }

    /// Sets the capabilities the agent declares.
    pub fn with_capabilities(self, capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            ..self
        }
    }

    /// Adds custom headers to every request.
    ///
    /// # Errors
    ///
    /// This function will return an error if a header name or value is not valid.
    pub fn with_headers<I, K, V>(self, headers: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Ok(Self {
            http: self.http.with_headers(headers)?,
            ..self
        })
    }

    /// Enables gzip compression of HTTP bodies.
    pub fn with_gzip_compression(self, compression: bool) -> Self {
        Self {
            http: self.http.with_gzip_compression(compression),
            ..self
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            http: self.http.with_timeout(timeout),
            ..self
        }
    }

    /// Checks the url scheme against the connection type and the heartbeat settings.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let scheme = self.http.url().scheme();
        if !self.connection_type.supports_scheme(scheme) {
            return Err(ConfigurationError::UnsupportedScheme {
                scheme: scheme.to_string(),
                connection_type: self.connection_type,
            });
        }
        self.heartbeat.validate()
    }

    /// The agent instance uid.
    pub fn instance_uid(&self) -> InstanceUid {
        self.instance_uid
    }

    /// The selected transport.
    pub fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    /// Endpoint, headers, compression and timeout.
    pub fn http_config(&self) -> &HttpConfig {
        &self.http
    }

    /// The heartbeat settings.
    pub fn heartbeat(&self) -> &HeartbeatSettings {
        &self.heartbeat
    }

    /// The description sent on the first frame.
    pub fn agent_description(&self) -> &AgentDescription {
        &self.agent_description
    }

    /// The declared capabilities.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}
