//! Typed messages extracted from a `ServerToAgent` frame.
//!
//! Each populated optional field of an inbound frame becomes one [`ServerMessage`].
//! The set of kinds is closed: supporting a new field means adding a variant here.

use std::fmt::{Display, Formatter};

use crate::opamp::proto::{
    AgentIdentification, AgentRemoteConfig, ConnectionSettingsOffers, CustomMessage,
    PackagesAvailable, ServerCapabilities, ServerErrorResponse, ServerToAgentCommand,
    ServerToAgentFlags,
};

/// The kind of a [`ServerMessage`], used as the listener registry key.
/// Declared in the protobuf field order of `ServerToAgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// `ServerToAgent.error_response`
    ErrorResponse,
    /// `ServerToAgent.remote_config`
    RemoteConfig,
    /// `ServerToAgent.connection_settings`
    ConnectionSettings,
    /// `ServerToAgent.packages_available`
    PackagesAvailable,
    /// `ServerToAgent.flags`
    Flags,
    /// `ServerToAgent.capabilities`
    Capabilities,
    /// `ServerToAgent.agent_identification`
    AgentIdentification,
    /// `ServerToAgent.command`
    Command,
    /// `ServerToAgent.custom_message`
    CustomMessage,
}

impl MessageKind {
    /// Every kind, in dispatch order.
    pub const ALL: [MessageKind; 9] = [
        MessageKind::ErrorResponse,
        MessageKind::RemoteConfig,
        MessageKind::ConnectionSettings,
        MessageKind::PackagesAvailable,
        MessageKind::Flags,
        MessageKind::Capabilities,
        MessageKind::AgentIdentification,
        MessageKind::Command,
        MessageKind::CustomMessage,
    ];

    /// The protobuf field name the kind comes from.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ErrorResponse => "error_response",
            MessageKind::RemoteConfig => "remote_config",
            MessageKind::ConnectionSettings => "connection_settings",
            MessageKind::PackagesAvailable => "packages_available",
            MessageKind::Flags => "flags",
            MessageKind::Capabilities => "capabilities",
            MessageKind::AgentIdentification => "agent_identification",
            MessageKind::Command => "command",
            MessageKind::CustomMessage => "custom_message",
        }
    }
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `ServerToAgent.flags` bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerFlags(pub u64);

impl ServerFlags {
    /// Checks whether the server set `flag`.
    pub fn contains(self, flag: ServerToAgentFlags) -> bool {
        self.0 & flag as u64 != 0
    }
}

/// `ServerToAgent.capabilities` bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerCapabilitySet(pub u64);

impl ServerCapabilitySet {
    /// Checks whether the server declared `capability`.
    pub fn has_capability(self, capability: ServerCapabilities) -> bool {
        self.0 & capability as u64 != 0
    }
}

/// One inbound message, carrying exactly the sub-message of its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The server rejected or failed to process a previous frame.
    ErrorResponse(ServerErrorResponse),
    /// A remote configuration offer.
    RemoteConfig(AgentRemoteConfig),
    /// Connection settings offered by the server.
    ConnectionSettings(ConnectionSettingsOffers),
    /// Packages the server makes available.
    PackagesAvailable(PackagesAvailable),
    /// Server to agent flags, e.g. a full state report request.
    Flags(ServerFlags),
    /// Capabilities of the server.
    Capabilities(ServerCapabilitySet),
    /// A new instance uid assigned by the server.
    AgentIdentification(AgentIdentification),
    /// A command such as restart.
    Command(ServerToAgentCommand),
    /// A custom message.
    CustomMessage(CustomMessage),
}

impl ServerMessage {
    /// The kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::ErrorResponse(_) => MessageKind::ErrorResponse,
            ServerMessage::RemoteConfig(_) => MessageKind::RemoteConfig,
            ServerMessage::ConnectionSettings(_) => MessageKind::ConnectionSettings,
            ServerMessage::PackagesAvailable(_) => MessageKind::PackagesAvailable,
            ServerMessage::Flags(_) => MessageKind::Flags,
            ServerMessage::Capabilities(_) => MessageKind::Capabilities,
            ServerMessage::AgentIdentification(_) => MessageKind::AgentIdentification,
            ServerMessage::Command(_) => MessageKind::Command,
            ServerMessage::CustomMessage(_) => MessageKind::CustomMessage,
        }
    }
}
