//! Agent instance identifier, generated once per client.

use std::fmt::{Display, Formatter};
use thiserror::Error;
use uuid::Uuid;

/// Holds possible errors that can occur when parsing an instance uid.
#[derive(Error, Debug)]
pub enum InstanceUidError {
    /// The value is not a 16 byte UUID.
    #[error("invalid instance_uid format: {0}")]
    InvalidFormat(String),
}

/// An [Agent Instance UID](https://github.com/open-telemetry/opamp-spec/blob/main/specification.md#agenttoserverinstance_uid)
/// backed by a UUID v7, so identifiers sort by creation time.
///
/// Displayed uppercase with no hyphens:
/// ```
/// use opamp_agent_client::operation::instance_uid::InstanceUid;
///
/// let instance_uid = InstanceUid::try_from("0190592a-8287-7fb1-a6d9-1ecaa57032bd").unwrap();
/// assert_eq!(instance_uid.to_string(), "0190592A82877FB1A6D91ECAA57032BD".to_string());
/// ```
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash)]
pub struct InstanceUid(Uuid);

impl InstanceUid {
    /// Creates a new random identifier.
    pub fn create() -> Self {
        Self(Uuid::now_v7())
    }

    /// The 16 raw bytes carried in `AgentToServer.instance_uid`.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for InstanceUid {
    fn default() -> Self {
        Self::create()
    }
}

impl TryFrom<&[u8]> for InstanceUid {
    type Error = InstanceUidError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Uuid::from_slice(value)
            .map(Self)
            .map_err(|e| InstanceUidError::InvalidFormat(e.to_string()))
    }
}

impl TryFrom<&str> for InstanceUid {
    type Error = InstanceUidError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Uuid::try_parse(value)
            .map(Self)
            .map_err(|e| InstanceUidError::InvalidFormat(e.to_string()))
    }
}

impl From<InstanceUid> for Vec<u8> {
    fn from(val: InstanceUid) -> Self {
        val.as_bytes().to_vec()
    }
}

impl Display for InstanceUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_simple().to_string().to_uppercase())
    }
}
