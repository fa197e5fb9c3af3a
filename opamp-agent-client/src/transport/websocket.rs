//! WebSocket [`Connector`] built on blocking `tungstenite` sockets.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use http::HeaderMap;
use tracing::{debug, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::error::UrlError;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Message, WebSocket};
use url::Url;

use super::TransportError;
use super::config::HttpConfig;
use super::streaming::{Connection, Connector};
use crate::common::chunks::ChunkChain;

/// Default time a read waits for an inbound message before the I/O thread checks for
/// outbound frames and shutdown again.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// Reads attempted while waiting for the server to acknowledge a close.
const CLOSE_ATTEMPTS: usize = 10;

/// Opens plain `ws://` connections. Custom headers of the [`HttpConfig`] are sent on the
/// upgrade request and its timeout bounds connecting and writing.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    headers: HeaderMap,
    timeout: Duration,
    poll_interval: Duration,
}

impl WebSocketConnector {
    /// Creates a connector for the server configured in `config`.
    pub fn new(config: &HttpConfig) -> Self {
        Self {
            url: config.url().clone(),
            headers: config
                .custom_headers()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            timeout: config.timeout(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how long a read waits for inbound messages. Bounds the shutdown latency.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..self
        }
    }

    fn open_stream(&self) -> Result<TcpStream, TransportError> {
        let addrs = self.url.socket_addrs(|| None).map_err(io_error)?;
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
        for addr in addrs {
            match connect_tcp(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => {
                    debug!(%addr, %err, "connecting");
                    last_err = err;
                }
            }
        }
        Err(io_error(last_err))
    }
}

impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;

    fn connect(&self) -> Result<WebSocketConnection, TransportError> {
        match self.url.scheme() {
            "ws" => {}
            "wss" => return Err(tungstenite::Error::Url(UrlError::TlsFeatureNotEnabled).into()),
            _ => return Err(tungstenite::Error::Url(UrlError::UnsupportedUrlScheme).into()),
        }

        let mut request = self.url.as_str().into_client_request()?;
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }

        let stream = self.open_stream()?;
        let timeout = non_zero(self.timeout);
        stream.set_read_timeout(timeout).map_err(io_error)?;
        stream.set_write_timeout(timeout).map_err(io_error)?;

        let (socket, response) = tungstenite::client(request, stream).map_err(|err| match err {
            HandshakeError::Failure(err) => TransportError::from(err),
            HandshakeError::Interrupted(_) => io_error(io::ErrorKind::TimedOut.into()),
        })?;
        debug!(status = %response.status(), "websocket handshake completed");

        socket
            .get_ref()
            .set_read_timeout(non_zero(self.poll_interval))
            .map_err(io_error)?;
        Ok(WebSocketConnection { socket })
    }
}

/// A connected WebSocket. Frames travel as binary messages.
#[derive(Debug)]
pub struct WebSocketConnection {
    socket: WebSocket<TcpStream>,
}

impl Connection for WebSocketConnection {
    fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.socket.send(Message::binary(frame))?;
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<ChunkChain>, TransportError> {
        match self.socket.read() {
            Ok(Message::Binary(data)) => Ok(Some(ChunkChain::from(data))),
            Ok(Message::Text(_)) => {
                warn!("ignoring text message");
                Ok(None)
            }
            // pings and close requests are answered by the socket itself
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(err)) if timed_out(&err) => Ok(None),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(TransportError::Closed)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.socket.close(None) {
            Ok(()) => {}
            Err(tungstenite::Error::Io(err)) if timed_out(&err) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }

        for _ in 0..CLOSE_ATTEMPTS {
            match self.socket.read() {
                Ok(_) => {}
                Err(tungstenite::Error::Io(err)) if timed_out(&err) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        }
        debug!("server did not acknowledge the close in time");
        Ok(())
    }
}

fn connect_tcp(addr: &SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    match non_zero(timeout) {
        Some(timeout) => TcpStream::connect_timeout(addr, timeout),
        None => TcpStream::connect(addr),
    }
}

// Socket timeouts reject zero durations.
fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

fn timed_out(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn io_error(err: io::Error) -> TransportError {
    TransportError::WebSocket(tungstenite::Error::Io(err))
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread::spawn;

    use assert_matches::assert_matches;
    use prost::Message as _;
    use tungstenite::handshake::server::{Request, Response};

    use super::*;
    use crate::common::framing::{encode_frame, verify_header};
    use crate::opamp::proto::{AgentToServer, CustomMessage, ServerToAgent};

    fn config_for(listener: &TcpListener) -> HttpConfig {
        let addr = listener.local_addr().unwrap();
        HttpConfig::new(&format!("ws://{addr}/v1/opamp"))
            .unwrap()
            .with_headers([("api-key", "secret")])
            .unwrap()
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn exchanges_binary_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let connector = WebSocketConnector::new(&config_for(&listener))
            .with_poll_interval(Duration::from_millis(20));

        let server = spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept_hdr(stream, |req: &Request, resp: Response| {
                assert_eq!(req.uri().path(), "/v1/opamp");
                assert_eq!(req.headers().get("api-key").unwrap(), "secret");
                assert!(req.headers().get("content-type").is_none());
                Ok(resp)
            })
            .unwrap();

            let Message::Binary(data) = socket.read().unwrap() else {
                panic!("expected a binary message");
            };
            let mut frame = data.as_ref();
            verify_header(&mut frame).unwrap();
            let agent_to_server = AgentToServer::decode(frame).unwrap();
            assert_eq!(agent_to_server.sequence_num, 1);

            let reply = encode_frame(&ServerToAgent {
                custom_message: Some(CustomMessage {
                    data: b"hello".to_vec(),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .unwrap();
            socket.send(Message::binary(reply)).unwrap();

            // wait for the client close
            while socket.read().is_ok() {}
        });

        let mut connection = connector.connect().unwrap();
        let frame = encode_frame(&AgentToServer {
            sequence_num: 1,
            ..Default::default()
        })
        .unwrap();
        connection.send_frame(frame).unwrap();

        let mut received = None;
        for _ in 0..250 {
            if let Some(framed) = connection.receive().unwrap() {
                received = Some(framed);
                break;
            }
        }
        let mut framed = received.expect("no frame received");
        verify_header(&mut framed).unwrap();
        let reply = ServerToAgent::decode(framed).unwrap();
        assert_eq!(reply.custom_message.unwrap().data, b"hello".to_vec());

        connection.close().unwrap();
        server.join().unwrap();
    }

    #[test]
    fn server_close_is_reported_as_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let connector = WebSocketConnector::new(&config_for(&listener))
            .with_poll_interval(Duration::from_millis(20));

        let server = spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut socket = tungstenite::accept(stream).unwrap();
            socket.close(None).unwrap();
            while socket.read().is_ok() {}
        });

        let mut connection = connector.connect().unwrap();
        let mut result = Ok(None);
        for _ in 0..250 {
            result = connection.receive();
            if result.is_err() {
                break;
            }
        }
        assert_matches!(result, Err(TransportError::Closed));
        server.join().unwrap();
    }

    #[test]
    fn unsupported_schemes_are_rejected() {
        let tls = WebSocketConnector::new(&HttpConfig::new("wss://localhost/v1/opamp").unwrap());
        assert_matches!(
            tls.connect(),
            Err(TransportError::WebSocket(tungstenite::Error::Url(
                UrlError::TlsFeatureNotEnabled
            )))
        );

        let http = WebSocketConnector::new(&HttpConfig::new("http://localhost/v1/opamp").unwrap());
        assert_matches!(
            http.connect(),
            Err(TransportError::WebSocket(tungstenite::Error::Url(
                UrlError::UnsupportedUrlScheme
            )))
        );
    }
}
