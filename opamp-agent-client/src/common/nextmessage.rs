//! Assembles outbound `AgentToServer` frames.

use crate::opamp::proto::{
    AgentDescription, AgentDisconnect, AgentToServer, ComponentHealth, CustomCapabilities,
    CustomMessage,
};
use crate::operation::capabilities::Capabilities;
use crate::operation::health::HealthReport;
use crate::operation::instance_uid::InstanceUid;

/// Assembles one outbound `AgentToServer` frame.
///
/// Every frame carries the instance uid. Each `add_*` call overwrites the field it sets,
/// so the last value wins. The sequence number is assigned by the client on send.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    frame: AgentToServer,
}

impl FrameBuilder {
    /// Starts a frame identified by `instance_uid`.
    pub fn new(instance_uid: InstanceUid) -> Self {
        Self {
            frame: AgentToServer {
                instance_uid: instance_uid.into(),
                ..Default::default()
            },
        }
    }

    /// Sets the agent description.
    pub fn add_agent_description(&mut self, description: impl Into<AgentDescription>) -> &mut Self {
        self.frame.agent_description = Some(description.into());
        self
    }

    /// Sets the component health from `report`.
    pub fn add_health(&mut self, report: &HealthReport) -> &mut Self {
        self.frame.health = Some(ComponentHealth::from(report));
        self
    }

    /// Sets the declared capabilities.
    pub fn add_capabilities(&mut self, capabilities: Capabilities) -> &mut Self {
        self.frame.capabilities = capabilities.into();
        self
    }

    /// Marks the frame as the last one before disconnecting.
    pub fn add_agent_disconnect(&mut self) -> &mut Self {
        self.frame.agent_disconnect = Some(AgentDisconnect {});
        self
    }

    /// Sets the custom capabilities the agent supports.
    pub fn add_custom_capabilities(
        &mut self,
        custom_capabilities: CustomCapabilities,
    ) -> &mut Self {
        self.frame.custom_capabilities = Some(custom_capabilities);
        self
    }

    /// Sets a custom message.
    pub fn add_custom_message(&mut self, custom_message: CustomMessage) -> &mut Self {
        self.frame.custom_message = Some(custom_message);
        self
    }

    /// True while nothing besides the instance uid has been added.
    pub fn is_identity_only(&self) -> bool {
        let AgentToServer {
            instance_uid: _,
            sequence_num: _,
            agent_description,
            capabilities,
            health,
            agent_disconnect,
            flags,
            custom_capabilities,
            custom_message,
        } = &self.frame;

        agent_description.is_none()
            && *capabilities == 0
            && health.is_none()
            && agent_disconnect.is_none()
            && *flags == 0
            && custom_capabilities.is_none()
            && custom_message.is_none()
    }

    /// Returns the assembled frame. The builder can keep being used.
    pub fn build(&self) -> AgentToServer {
        self.frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opamp::proto::AgentCapabilities;
    use crate::operation::agent_description::AgentDescription as Description;
    use crate::operation::health::HealthStatus;

    #[test]
    fn new_frame_only_carries_identity() {
        let instance_uid = InstanceUid::create();
        let builder = FrameBuilder::new(instance_uid);

        assert!(builder.is_identity_only());
        let frame = builder.build();
        assert_eq!(frame.instance_uid, instance_uid.as_bytes().to_vec());
        assert_eq!(frame.sequence_num, 0);
    }

    #[test]
    fn add_operations_chain_and_overwrite() {
        let mut builder = FrameBuilder::new(InstanceUid::create());
        builder
            .add_agent_description(Description::default().with_identifying("service.name", "a"))
            .add_capabilities(crate::capabilities!(AgentCapabilities::ReportsHealth))
            .add_custom_message(CustomMessage {
                data: b"first".to_vec(),
                ..Default::default()
            })
            .add_custom_message(CustomMessage {
                data: b"second".to_vec(),
                ..Default::default()
            });

        assert!(!builder.is_identity_only());
        let frame = builder.build();
        assert_eq!(
            frame.capabilities,
            AgentCapabilities::ReportsHealth as u64
        );
        assert_eq!(frame.custom_message.unwrap().data, b"second".to_vec());
        assert_eq!(frame.agent_description.unwrap().identifying_attributes.len(), 1);
    }

    #[test]
    fn health_and_disconnect() {
        let report = HealthReport {
            start_time_unix_nano: 5_000_000,
            status_time_unix_nano: 6_000_000,
            status: HealthStatus::healthy("running"),
        };

        let mut builder = FrameBuilder::new(InstanceUid::create());
        builder.add_health(&report).add_agent_disconnect();
        let frame = builder.build();

        let health = frame.health.unwrap();
        assert!(health.healthy);
        assert_eq!(health.start_time_unix_nano, 5_000_000);
        assert_eq!(frame.agent_disconnect, Some(AgentDisconnect {}));
    }
}
