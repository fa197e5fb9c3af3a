//! Provides an abstraction over the OpAMP AgentCapabilities protobuffer definition.

use crate::opamp::proto::AgentCapabilities;

/// A set of agent capabilities represented as bit flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities(u64);

impl Capabilities {
    /// Creates a new `Capabilities` instance from a list of `AgentCapabilities`.
    ///
    /// # Example
    ///
    /// ```
    /// use opamp_agent_client::operation::capabilities::Capabilities;
    /// use opamp_agent_client::opamp::proto::AgentCapabilities;
    ///
    /// let caps = Capabilities::new(vec![AgentCapabilities::ReportsHealth]);
    /// assert!(caps.has_capability(AgentCapabilities::ReportsHealth));
    /// ```
    pub fn new(caps: Vec<AgentCapabilities>) -> Self {
        Self(caps.into_iter().fold(0u64, |acc, cap| acc | cap as u64))
    }

    /// Checks if the set has a specific capability.
    pub fn has_capability(self, capability: AgentCapabilities) -> bool {
        self.0 & capability as u64 != 0
    }

    /// Returns a copy of the set including `capability`.
    pub fn with(self, capability: AgentCapabilities) -> Self {
        Self(self.0 | capability as u64)
    }
}

/// A macro for creating a `Capabilities` instance with multiple capabilities.
///
/// # Example
///
/// ```
/// use opamp_agent_client::capabilities;
/// use opamp_agent_client::opamp::proto::AgentCapabilities;
///
/// let caps = capabilities!(
///     AgentCapabilities::ReportsStatus,
///     AgentCapabilities::ReportsHealth
/// );
/// assert!(caps.has_capability(AgentCapabilities::ReportsHealth));
/// ```
#[macro_export]
macro_rules! capabilities {
    ($($cap:expr),* $(,)?) => {{
        let caps: Vec<$crate::opamp::proto::AgentCapabilities> =
            vec![$crate::opamp::proto::AgentCapabilities::Unspecified $(, $cap)*];
        $crate::operation::capabilities::Capabilities::new(caps)
    }};
}

impl From<Capabilities> for u64 {
    fn from(value: Capabilities) -> Self {
        value.0
    }
}
