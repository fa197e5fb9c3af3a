//! OpAMP client library.
//!
//! Keeps a telemetry agent connected to an OpAMP server over HTTP or a WebSocket,
//! reports its health on a fixed interval and routes inbound server messages to the
//! listeners registered for them.

#![warn(missing_docs)]

pub mod common;
pub mod heartbeat;
pub mod operation;
pub mod transport;

// OpAMP protobuffers module files will be excluded from documentation.
#[doc(hidden)]
#[allow(unknown_lints)]
#[allow(clippy::mixed_attributes_style)]
pub mod opamp {
    //! The opamp module contains all those entities defined by the
    //! [Opamp specification](https://github.com/open-telemetry/opamp-spec/blob/main/specification.md)
    pub mod proto;
}

pub mod error;
pub use error::{
    ClientError, ClientResult, NotStartedClientError, NotStartedClientResult, StartedClientError,
    StartedClientResult,
};

pub mod client;
pub use client::*;

pub mod managed_client;
pub use managed_client::{NotStartedOpampClient, StartedOpampClient};
