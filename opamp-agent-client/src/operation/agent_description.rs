//! Agent description attributes and their value union.

use std::collections::BTreeMap;

use crate::opamp::proto::{
    AgentDescription as ProtobufAgentDescription, AnyValue, KeyValue, any_value::Value,
};

/// A closed union of the attribute value types this client reports.
/// The active variant is fixed when the value is built.
#[derive(Debug, PartialEq, Clone)]
pub enum AnyValueUnion {
    /// String wrapper
    String(String),
    /// bool wrapper
    Bool(bool),
    /// i64 wrapper
    Int(i64),
    /// f64 wrapper
    Double(f64),
}

impl From<AnyValueUnion> for AnyValue {
    fn from(value: AnyValueUnion) -> Self {
        let value = match value {
            AnyValueUnion::String(s) => Value::StringValue(s),
            AnyValueUnion::Bool(b) => Value::BoolValue(b),
            AnyValueUnion::Int(i) => Value::IntValue(i),
            AnyValueUnion::Double(d) => Value::DoubleValue(d),
        };
        AnyValue { value: Some(value) }
    }
}

impl TryFrom<AnyValue> for AnyValueUnion {
    type Error = AnyValue;

    /// Fails, handing the value back, when no variant is set.
    fn try_from(value: AnyValue) -> Result<Self, Self::Error> {
        match value.value {
            Some(Value::StringValue(s)) => Ok(Self::String(s)),
            Some(Value::BoolValue(b)) => Ok(Self::Bool(b)),
            Some(Value::IntValue(i)) => Ok(Self::Int(i)),
            Some(Value::DoubleValue(d)) => Ok(Self::Double(d)),
            None => Err(value),
        }
    }
}

impl From<&str> for AnyValueUnion {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AnyValueUnion {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for AnyValueUnion {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AnyValueUnion {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for AnyValueUnion {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

/// Internal representation of the OpAMP [AgentDescription](https://github.com/open-telemetry/opamp-spec/blob/main/specification.md#agentdescription-message).
///
/// Attributes are kept sorted by key so the serialized description is stable.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct AgentDescription {
    /// Attributes that identify the Agent, e.g. `service.name`.
    pub identifying_attributes: BTreeMap<String, AnyValueUnion>,

    /// Attributes that help describe where the Agent runs, e.g. `host.name`.
    pub non_identifying_attributes: BTreeMap<String, AnyValueUnion>,
}

impl AgentDescription {
    /// Adds an identifying attribute, replacing any previous value for `key`.
    pub fn with_identifying(
        mut self,
        key: impl Into<String>,
        value: impl Into<AnyValueUnion>,
    ) -> Self {
        self.identifying_attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a non identifying attribute, replacing any previous value for `key`.
    pub fn with_non_identifying(
        mut self,
        key: impl Into<String>,
        value: impl Into<AnyValueUnion>,
    ) -> Self {
        self.non_identifying_attributes
            .insert(key.into(), value.into());
        self
    }
}

impl From<AgentDescription> for ProtobufAgentDescription {
    fn from(agent_description: AgentDescription) -> Self {
        ProtobufAgentDescription {
            identifying_attributes: key_values(agent_description.identifying_attributes),
            non_identifying_attributes: key_values(agent_description.non_identifying_attributes),
        }
    }
}

fn key_values(attrs: BTreeMap<String, AnyValueUnion>) -> Vec<KeyValue> {
    attrs
        .into_iter()
        .map(|(key, value)| KeyValue {
            key,
            value: Some(value.into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_supports_every_variant() {
        let description = AgentDescription::default()
            .with_identifying("service.name", "collector")
            .with_identifying("service.instance", 3i64)
            .with_non_identifying("host.arch.64bit", true)
            .with_non_identifying("load", 0.25);

        let proto: ProtobufAgentDescription = description.into();

        assert_eq!(
            proto.identifying_attributes,
            vec![
                KeyValue {
                    key: "service.instance".to_string(),
                    value: Some(AnyValue {
                        value: Some(Value::IntValue(3))
                    }),
                },
                KeyValue {
                    key: "service.name".to_string(),
                    value: Some(AnyValue {
                        value: Some(Value::StringValue("collector".to_string()))
                    }),
                },
            ]
        );
        assert_eq!(
            proto.non_identifying_attributes,
            vec![
                KeyValue {
                    key: "host.arch.64bit".to_string(),
                    value: Some(AnyValue {
                        value: Some(Value::BoolValue(true))
                    }),
                },
                KeyValue {
                    key: "load".to_string(),
                    value: Some(AnyValue {
                        value: Some(Value::DoubleValue(0.25))
                    }),
                },
            ]
        );
    }

    #[test]
    fn later_values_replace_earlier_ones() {
        let description = AgentDescription::default()
            .with_identifying("service.name", "old")
            .with_identifying("service.name", "new");

        assert_eq!(
            description.identifying_attributes.get("service.name"),
            Some(&AnyValueUnion::String("new".to_string()))
        );
    }

    #[test]
    fn any_value_without_variant_is_rejected() {
        let empty = AnyValue { value: None };
        assert_eq!(AnyValueUnion::try_from(empty.clone()), Err(empty));

        let int = AnyValue::from(AnyValueUnion::Int(-4));
        assert_eq!(AnyValueUnion::try_from(int), Ok(AnyValueUnion::Int(-4)));
    }
}
