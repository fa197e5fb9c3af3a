//! Turns inbound `ServerToAgent` frames into typed messages and dispatches them.

use std::sync::Arc;

use bytes::Buf;
use prost::Message;
use thiserror::Error;
use tracing::{debug, error, trace};

use super::chunks::ChunkChain;
use super::framing::{FramingError, verify_header};
use crate::opamp::proto::{ServerErrorResponseType, ServerToAgent};
use crate::operation::listener::ListenerRegistry;
use crate::operation::messages::{ServerCapabilitySet, ServerFlags, ServerMessage};

/// Errors raised while turning inbound bytes into messages.
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The body is not a valid `ServerToAgent`.
    #[error("decoding ServerToAgent: `{0}`")]
    Decode(#[from] prost::DecodeError),
    /// The streaming frame header is invalid.
    #[error("invalid frame header: `{0}`")]
    Framing(#[from] FramingError),
}

/// Decodes inbound `ServerToAgent` frames and hands every message they carry to the listeners.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    registry: Arc<ListenerRegistry>,
}

impl FrameProcessor {
    /// Creates a processor dispatching to `registry`.
    pub fn new(registry: Arc<ListenerRegistry>) -> Self {
        Self { registry }
    }

    /// Processes a raw protobuf body, as received from an HTTP response.
    /// Returns the number of messages dispatched.
    pub fn on_server_frame<B: Buf>(&self, body: B) -> Result<usize, ProcessError> {
        let frame = ServerToAgent::decode(body)
            .inspect_err(|err| error!(%err, "discarding malformed ServerToAgent frame"))?;
        Ok(self.process(frame))
    }

    /// Processes a header prefixed frame, as received from a streaming connection.
    pub fn on_framed_message(&self, mut framed: ChunkChain) -> Result<usize, ProcessError> {
        verify_header(&mut framed)
            .inspect_err(|err| error!(%err, "discarding frame with invalid header"))?;
        self.on_server_frame(framed)
    }

    fn process(&self, frame: ServerToAgent) -> usize {
        if let Some(err) = &frame.error_response {
            let err_type = ServerErrorResponseType::try_from(err.r#type)
                .unwrap_or(ServerErrorResponseType::Unknown);
            error!(
                error_type = ?err_type,
                error_message = %err.error_message,
                "received an error response from server"
            );
        }

        let messages = messages_from_frame(frame);
        trace!(count = messages.len(), "dispatching server messages");
        for msg in &messages {
            let report = self.registry.dispatch(msg);
            debug!(
                kind = %msg.kind(),
                delivered = report.delivered,
                failed = report.errors.len(),
                "server message dispatched"
            );
        }
        messages.len()
    }
}

/// Extracts every populated field of `frame` in protobuf field order.
/// Zero valued flags and capabilities count as absent.
pub fn messages_from_frame(frame: ServerToAgent) -> Vec<ServerMessage> {
    let ServerToAgent {
        instance_uid: _,
        error_response,
        remote_config,
        connection_settings,
        packages_available,
        flags,
        capabilities,
        agent_identification,
        command,
        custom_message,
    } = frame;

    [
        error_response.map(ServerMessage::ErrorResponse),
        remote_config.map(ServerMessage::RemoteConfig),
        connection_settings.map(ServerMessage::ConnectionSettings),
        packages_available.map(ServerMessage::PackagesAvailable),
        (flags != 0).then_some(ServerMessage::Flags(ServerFlags(flags))),
        (capabilities != 0).then_some(ServerMessage::Capabilities(ServerCapabilitySet(
            capabilities,
        ))),
        agent_identification.map(ServerMessage::AgentIdentification),
        command.map(ServerMessage::Command),
        custom_message.map(ServerMessage::CustomMessage),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use bytes::Bytes;
    use tracing_test::traced_test;

    use super::*;
    use crate::common::framing::encode_frame;
    use crate::opamp::proto::{
        AgentIdentification, CustomMessage, ServerErrorResponse, ServerToAgentCommand,
        ServerToAgentFlags,
    };
    use crate::operation::listener::ListenerResult;
    use crate::operation::messages::MessageKind;

    fn recording_processor(
        kinds: &[MessageKind],
    ) -> (FrameProcessor, Arc<Mutex<Vec<ServerMessage>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        let sink = Arc::clone(&received);
        registry.register(
            kinds.iter().copied(),
            move |msg: &ServerMessage| -> ListenerResult {
                sink.lock().unwrap().push(msg.clone());
                Ok(())
            },
        );
        (FrameProcessor::new(Arc::new(registry)), received)
    }

    fn custom(data: &str) -> CustomMessage {
        CustomMessage {
            capability: "io.opentelemetry.echo".to_string(),
            r#type: "echo".to_string(),
            data: data.as_bytes().to_vec(),
        }
    }

    #[test]
    fn messages_follow_field_order() {
        let frame = ServerToAgent {
            custom_message: Some(custom("hello")),
            command: Some(ServerToAgentCommand::default()),
            flags: ServerToAgentFlags::ReportFullState as u64,
            agent_identification: Some(AgentIdentification {
                new_instance_uid: vec![1; 16],
            }),
            ..Default::default()
        };

        let kinds: Vec<_> = messages_from_frame(frame)
            .iter()
            .map(ServerMessage::kind)
            .collect();

        assert_eq!(
            kinds,
            vec![
                MessageKind::Flags,
                MessageKind::AgentIdentification,
                MessageKind::Command,
                MessageKind::CustomMessage,
            ]
        );
    }

    #[test]
    fn empty_frame_has_no_messages() {
        assert!(messages_from_frame(ServerToAgent::default()).is_empty());
    }

    #[test]
    fn dispatches_decoded_body() {
        let (processor, received) = recording_processor(&[MessageKind::CustomMessage]);
        let body = ServerToAgent {
            custom_message: Some(custom("hello")),
            command: Some(ServerToAgentCommand::default()),
            ..Default::default()
        }
        .encode_to_vec();

        assert_eq!(processor.on_server_frame(body.as_slice()).unwrap(), 2);
        assert_eq!(
            *received.lock().unwrap(),
            vec![ServerMessage::CustomMessage(custom("hello"))]
        );
    }

    #[test]
    fn framed_message_across_chunks() {
        let (processor, received) = recording_processor(&[MessageKind::CustomMessage]);
        let frame = encode_frame(&ServerToAgent {
            custom_message: Some(custom("split across chunks")),
            ..Default::default()
        })
        .unwrap();

        let chain: ChunkChain = frame.chunks(3).map(Bytes::copy_from_slice).collect();

        assert_eq!(processor.on_framed_message(chain).unwrap(), 1);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    #[traced_test]
    fn malformed_frames_do_not_affect_later_frames() {
        let (processor, received) = recording_processor(&[MessageKind::CustomMessage]);

        // field 1 declared as length delimited with a length past the end of the body
        let malformed: &[u8] = &[0x0a, 0xff, 0x01, 0x00];
        assert_matches!(
            processor.on_server_frame(malformed),
            Err(ProcessError::Decode(_))
        );
        assert!(logs_contain("discarding malformed ServerToAgent frame"));

        let wrong_indicator = ChunkChain::from(vec![0x01, 0x00]);
        assert_matches!(
            processor.on_framed_message(wrong_indicator),
            Err(ProcessError::Framing(FramingError::InvalidIndicator(1)))
        );

        let valid = ServerToAgent {
            custom_message: Some(custom("hello")),
            ..Default::default()
        }
        .encode_to_vec();
        assert_eq!(processor.on_server_frame(valid.as_slice()).unwrap(), 1);
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    #[traced_test]
    fn error_responses_are_logged_and_dispatched() {
        let (processor, received) = recording_processor(&[MessageKind::ErrorResponse]);
        let body = ServerToAgent {
            error_response: Some(ServerErrorResponse {
                r#type: ServerErrorResponseType::BadRequest as i32,
                error_message: "unknown agent".to_string(),
                details: None,
            }),
            ..Default::default()
        }
        .encode_to_vec();

        assert_eq!(processor.on_server_frame(body.as_slice()).unwrap(), 1);
        assert!(logs_contain("received an error response from server"));
        assert!(logs_contain("unknown agent"));
        assert_eq!(received.lock().unwrap().len(), 1);
    }
}
