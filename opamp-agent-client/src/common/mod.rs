//! Wire-level building blocks: framing, byte chains, body compression and the
//! processing and building of frames.

pub mod chunks;
pub(crate) mod compression;
pub mod framing;
pub mod message_processor;
pub mod nextmessage;
