//! # Blocking HTTP Client Module
use std::io;

use http::Response;
use url::Url;

use super::config::HttpConfig;
use crate::common::chunks::{ChunkChain, DEFAULT_CHUNK_SIZE};
pub use crate::common::compression::{CompressorError, DecoderError, EncoderError};

/// An enumeration of potential errors related to the HTTP client.
#[derive(thiserror::Error, Debug)]
pub enum HttpClientError {
    /// Represents reqwest crate error.
    #[error("`{0}`")]
    ReqwestError(#[from] reqwest::Error),
    /// Unsuccessful HTTP response.
    #[error("Status code: `{0}` Canonical reason: `{1}`")]
    UnsuccessfulResponse(u16, String),
    /// Represents a decode error.
    #[error("`{0}`")]
    DecoderError(#[from] DecoderError),
    /// Represents an encode error.
    #[error("`{0}`")]
    EncoderError(#[from] EncoderError),
    /// Represents a compression error.
    #[error("`{0}`")]
    CompressionError(#[from] CompressorError),
    /// Represents an io reader error.
    #[error("`{0}`")]
    IOError(#[from] io::Error),
    /// Represents an http crate consume body error.
    #[error("`{0}`")]
    HTTPBodyError(#[from] http::Error),
}

/// A synchronous trait that defines the internal methods for HTTP clients.
pub trait HttpClient {
    /// Posts `body` to the server and returns the whole response.
    fn post(&self, body: Vec<u8>) -> Result<Response<ChunkChain>, HttpClientError>;
}

/// An implementation of the `HttpClient` trait using the blocking reqwest client.
pub struct HttpClientReqwest {
    client: reqwest::blocking::Client,
    url: Url,
}

impl HttpClientReqwest {
    /// Construct a new `HttpClientReqwest` from the given `HttpConfig`.
    ///
    /// # Examples
    ///
    /// ```
    /// use opamp_agent_client::transport::{HttpClientReqwest, HttpConfig};
    ///
    /// let config = HttpConfig::new("http://my-server.com/v1/opamp").unwrap();
    /// let client = HttpClientReqwest::new(&config).unwrap();
    /// ```
    pub fn new(config: &HttpConfig) -> Result<Self, HttpClientError> {
        Ok(Self {
            client: reqwest::blocking::Client::try_from(config)?,
            url: config.url.clone(),
        })
    }
}

/// Implement TryFrom trait to create a blocking reqwest client from HttpConfig
impl TryFrom<&HttpConfig> for reqwest::blocking::Client {
    type Error = HttpClientError;
    fn try_from(value: &HttpConfig) -> Result<Self, Self::Error> {
        Ok(reqwest::blocking::Client::builder()
            .default_headers(value.headers.clone())
            .connect_timeout(value.timeout)
            .timeout(value.timeout)
            .build()?)
    }
}

impl HttpClient for HttpClientReqwest {
    fn post(&self, body: Vec<u8>) -> Result<Response<ChunkChain>, HttpClientError> {
        let response = self.client.post(self.url.clone()).body(body).send()?;
        build_response(response)
    }
}

fn build_response(
    response: reqwest::blocking::Response,
) -> Result<Response<ChunkChain>, HttpClientError> {
    let mut response_builder = http::Response::builder()
        .status(response.status())
        .version(response.version());
    for (name, value) in response.headers() {
        response_builder = response_builder.header(name, value);
    }

    let body = ChunkChain::read_from(response, DEFAULT_CHUNK_SIZE)?;

    Ok(response_builder.body(body)?)
}
