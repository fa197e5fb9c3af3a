//! OpAMP client traits.
//!
//! A client is built as a [`NotStartedClient`], where listeners are registered, and turns
//! into a [`StartedClient`] on `start`. Listeners cannot be added once started.

use crate::common::nextmessage::FrameBuilder;
use crate::error::{ClientResult, NotStartedClientResult, StartedClientResult};
use crate::operation::agent_description::AgentDescription;
use crate::operation::health::HealthStatus;
use crate::operation::instance_uid::InstanceUid;

/// Client defines the communication methods with the OpAMP server.
/// It must be shared among threads safely.
pub trait Client: Send + Sync {
    /// The instance uid sent on every frame. Constant for the client lifetime.
    fn instance_uid(&self) -> InstanceUid;

    /// Returns an empty builder for this agent. Pass it to `send` once filled.
    fn frame_builder(&self) -> FrameBuilder;

    /// Sends the frame built by `builder`, tagged with the next sequence number.
    fn send(&self, builder: &FrameBuilder) -> ClientResult<()>;

    /// Sends an identity-only frame. HTTP servers only answer requests, so this is how
    /// an HTTP client asks for pending messages.
    fn poll(&self) -> ClientResult<()>;

    /// set_agent_description replaces the attributes of the Agent and sends them to the Server.
    fn set_agent_description(&self, description: AgentDescription) -> ClientResult<()>;
    /// agent_description returns the attributes last sent to the Server.
    fn agent_description(&self) -> ClientResult<AgentDescription>;

    /// Records the agent health. The next heartbeat reports it; with heartbeats disabled
    /// it is sent right away.
    fn update_status(&self, status: HealthStatus) -> ClientResult<()>;
}

/// A trait defining the methods necessary for managing a client in the OpAMP library.
pub trait NotStartedClient {
    /// The type of the client that is started.
    type StartedClient: StartedClient;

    /// Connects the transport, sends the first frame, carrying the agent description and
    /// capabilities, and starts the heartbeat when enabled.
    ///
    /// Unless the startup check is disabled, a failure to send the first frame makes start
    /// fail and closes the transport.
    fn start(self) -> NotStartedClientResult<Self::StartedClient>;
}

/// A trait defining the `stop()` method for stopping a client in the OpAMP library. Implements the `Client` trait.
pub trait StartedClient: Client {
    /// Stops the heartbeat, waiting for an in-flight report, tells the server the agent is
    /// disconnecting and closes the transport.
    /// Once stopped the client cannot be started again.
    fn stop(self) -> StartedClientResult<()>;
}
