//! Request/response transport: one HTTP POST per outbound frame.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Buf;
use prost::Message;
use tracing::{debug, trace};

use super::config::HttpConfig;
use super::http_client::{HttpClient, HttpClientError, HttpClientReqwest};
use super::{Transport, TransportError};
use crate::common::chunks::ChunkChain;
use crate::common::compression::{Compressor, compress, decompress};
use crate::common::message_processor::FrameProcessor;
use crate::opamp::proto::AgentToServer;

/// Sends every frame as the body of an HTTP POST and processes the response body as the
/// server reply. HTTP bodies carry no frame header.
pub struct HttpTransport<C>
where
    C: HttpClient,
{
    client: C,
    compressor: Compressor,
    processor: OnceLock<FrameProcessor>,
    closed: AtomicBool,
}

impl<C> HttpTransport<C>
where
    C: HttpClient,
{
    /// Creates a transport posting through `client`, compressing bodies as `config` requests.
    pub fn new(client: C, config: &HttpConfig) -> Self {
        Self::with_compressor(client, Compressor::from(config))
    }

    pub(crate) fn with_compressor(client: C, compressor: Compressor) -> Self {
        Self {
            client,
            compressor,
            processor: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn post(&self, frame: &AgentToServer) -> Result<http::Response<ChunkChain>, HttpClientError> {
        let body = compress(self.compressor, frame.encode_to_vec())?;
        let response = self.client.post(body)?;

        // return error if status code is not within 200-299.
        if !response.status().is_success() {
            return Err(HttpClientError::UnsuccessfulResponse(
                response.status().as_u16(),
                response
                    .status()
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string(),
            ));
        }
        Ok(response)
    }
}

impl HttpTransport<HttpClientReqwest> {
    /// Creates a transport backed by a blocking reqwest client.
    pub fn from_config(config: &HttpConfig) -> Result<Self, HttpClientError> {
        Ok(Self::new(HttpClientReqwest::new(config)?, config))
    }
}

impl<C> Transport for HttpTransport<C>
where
    C: HttpClient + Send + Sync,
{
    fn connect(&self, processor: FrameProcessor) -> Result<(), TransportError> {
        self.processor
            .set(processor)
            .map_err(|_| TransportError::AlreadyConnected)
    }

    fn send(&self, frame: &AgentToServer) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let processor = self.processor.get().ok_or(TransportError::NotConnected)?;

        trace!(sequence_num = frame.sequence_num, "posting AgentToServer");
        let response = self.post(frame)?;

        let compressor = match response.headers().get(http::header::CONTENT_ENCODING) {
            Some(algorithm) => {
                Compressor::try_from(algorithm.as_bytes()).map_err(HttpClientError::from)?
            }
            None => Compressor::Plain,
        };
        let body = decompress(compressor, response.into_body()).map_err(HttpClientError::from)?;

        if !body.has_remaining() {
            debug!("empty response body, nothing to process");
            return Ok(());
        }
        // malformed replies are logged by the processor and do not fail the send
        let _ = processor.on_server_frame(body);
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
