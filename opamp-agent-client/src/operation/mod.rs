//! Agent-side data model: identity, description, capabilities, health, settings and
//! the typed server messages with their listeners.

pub mod agent_description;
pub mod capabilities;
pub mod health;
pub mod instance_uid;
pub mod listener;
pub mod messages;
pub mod settings;
