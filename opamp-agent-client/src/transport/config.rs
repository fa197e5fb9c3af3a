//! # Connection configuration shared by the transports.

use http::header::{InvalidHeaderName, InvalidHeaderValue};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;
use std::time::Duration;
use url::{ParseError, Url};

use crate::common::compression::Compressor;

/// Default client timeout is 30 seconds
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Server endpoint, request headers, body compression and timeout.
///
/// The HTTP transport applies all of them to every request. The streaming transport
/// uses the url, the custom headers on the upgrade request and the timeout while connecting.
///
/// ```rust
/// use std::time::Duration;
/// use opamp_agent_client::transport::HttpConfig;
///
/// let config = HttpConfig::new("https://my-server.com/v1/opamp")
///     .unwrap()
///     .with_headers(vec![("Authorization", "Bearer <token>")])
///     .unwrap()
///     .with_gzip_compression(true)
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) compression: bool,
    pub(crate) timeout: Duration,
}

/// An enumeration of potential errors related to the connection configuration.
#[derive(thiserror::Error, Debug)]
pub enum HttpConfigError {
    /// Invalid url.
    #[error("`{0}`")]
    InvalidUrl(#[from] ParseError),
    /// Invalid header value.
    #[error("`{0}`")]
    InvalidHeader(#[from] InvalidHeaderValue),
    /// Invalid header name.
    #[error("`{0}`")]
    InvalidHeaderName(#[from] InvalidHeaderName),
}

impl HttpConfig {
    /// Construct a new `HttpConfig` with a given URL as a string.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provided URL is not valid.
    pub fn new(url: &str) -> Result<Self, HttpConfigError> {
        Ok(Self {
            url: Url::from_str(url)?,
            headers: opamp_headers(),
            compression: false,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        })
    }

    /// Optionally include custom headers into the requests.
    ///
    /// If the key already exists in the current header map, the new value will overwrite the old one.
    ///
    /// # Errors
    ///
    /// This function will return an error if the provided key or value is not valid.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Result<Self, HttpConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (ref key, ref val) in headers {
            let _ = self
                .headers
                .insert(HeaderName::from_str(key.as_ref())?, val.as_ref().parse()?);
        }
        Ok(self)
    }

    /// Enable or disable gzip compression for the HTTP requests.
    pub fn with_gzip_compression(mut self, compression: bool) -> Self {
        if compression {
            self.headers
                .insert(http::header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            self.headers
                .insert(http::header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        } else {
            self.headers.remove(http::header::CONTENT_ENCODING);
            self.headers.remove(http::header::ACCEPT_ENCODING);
        }
        self.compression = compression;
        self
    }

    /// Define a custom timeout for the client.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// The server endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Headers sent with every HTTP request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Headers configured by the user, without the ones describing the HTTP body.
    pub(crate) fn custom_headers(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers.iter().filter(|(name, _)| {
            ![
                http::header::CONTENT_TYPE,
                http::header::CONTENT_ENCODING,
                http::header::ACCEPT_ENCODING,
            ]
            .contains(*name)
        })
    }
}

impl From<&HttpConfig> for Compressor {
    fn from(value: &HttpConfig) -> Self {
        if value.compression {
            return Compressor::Gzip;
        }
        Compressor::Plain
    }
}

/// Returns a HeaderMap pre-populated with common HTTP headers used in an OpAMP connection
fn opamp_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-protobuf"),
    );

    headers
}
