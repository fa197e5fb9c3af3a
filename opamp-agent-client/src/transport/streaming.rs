//! Persistent-connection transport.
//!
//! A single I/O thread owns the [`Connection`]. Senders hand it encoded frames over a
//! channel and wait for the write result. Between writes the thread polls the connection
//! for inbound frames and queues them for a dispatch thread running the [`FrameProcessor`].

use std::sync::Mutex;
use std::thread::{JoinHandle, current, spawn};

use crossbeam::channel::{Receiver, Sender, bounded, select_biased, unbounded};
use tracing::{debug, error, info_span, trace, warn};

use super::{Transport, TransportError};
use crate::common::chunks::ChunkChain;
use crate::common::framing::encode_frame;
use crate::common::message_processor::FrameProcessor;
use crate::opamp::proto::AgentToServer;

/// A duplex message stream carrying header prefixed frames.
pub trait Connection: Send {
    /// Writes one frame as a single message.
    fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Waits a bounded time for the next inbound frame. `Ok(None)` means nothing arrived
    /// in time. A closed connection yields [`TransportError::Closed`].
    fn receive(&mut self) -> Result<Option<ChunkChain>, TransportError>;

    /// Closes the connection.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens [`Connection`]s.
pub trait Connector: Send + Sync {
    /// The connection type produced.
    type Connection: Connection + 'static;

    /// Opens a connection to the server.
    fn connect(&self) -> Result<Self::Connection, TransportError>;
}

type SendResult = Result<(), TransportError>;

struct Outbound {
    frame: Vec<u8>,
    reply: Sender<SendResult>,
}

struct IoThread {
    outbound: Sender<Outbound>,
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Streams frames over a connection opened by `K`.
pub struct StreamingTransport<K>
where
    K: Connector,
{
    connector: K,
    io: Mutex<Option<IoThread>>,
}

impl<K> StreamingTransport<K>
where
    K: Connector,
{
    /// Creates a transport connecting through `connector` on [`Transport::connect`].
    pub fn new(connector: K) -> Self {
        Self {
            connector,
            io: Mutex::new(None),
        }
    }

    fn outbound(&self) -> Result<Sender<Outbound>, TransportError> {
        self.io
            .lock()
            .map_err(|_| TransportError::PoisonError)?
            .as_ref()
            .map(|io| io.outbound.clone())
            .ok_or(TransportError::NotConnected)
    }

    fn is_connected(&self) -> Result<bool, TransportError> {
        Ok(self
            .io
            .lock()
            .map_err(|_| TransportError::PoisonError)?
            .is_some())
    }
}

impl<K> Transport for StreamingTransport<K>
where
    K: Connector,
{
    fn connect(&self, processor: FrameProcessor) -> Result<(), TransportError> {
        if self.is_connected()? {
            return Err(TransportError::AlreadyConnected);
        }

        // the lock is not held while connecting so concurrent sends fail fast
        let mut connection = self.connector.connect()?;
        debug!("streaming connection established");

        let mut io = self.io.lock().map_err(|_| TransportError::PoisonError)?;
        if io.is_some() {
            let _ = connection.close();
            return Err(TransportError::AlreadyConnected);
        }

        let (outbound, outbound_rx) = unbounded();
        let (shutdown, shutdown_rx) = bounded(1);
        let (inbound, inbound_rx) = unbounded();
        let dispatcher = spawn(move || run_dispatch_loop(processor, inbound_rx));
        let handle = spawn(move || run_io_loop(connection, inbound, outbound_rx, shutdown_rx));

        *io = Some(IoThread {
            outbound,
            shutdown,
            handle,
            dispatcher,
        });
        Ok(())
    }

    fn send(&self, frame: &AgentToServer) -> Result<(), TransportError> {
        let encoded = encode_frame(frame)?;
        let outbound = self.outbound()?;

        let (reply, result) = bounded(1);
        outbound
            .send(Outbound {
                frame: encoded,
                reply,
            })
            .map_err(|_| TransportError::Closed)?;
        // the I/O thread drops the reply sender without answering only when it exits
        result.recv().map_err(|_| TransportError::Closed)?
    }

    fn close(&self) -> Result<(), TransportError> {
        let io = self
            .io
            .lock()
            .map_err(|_| TransportError::PoisonError)?
            .take();
        let Some(IoThread {
            outbound,
            shutdown,
            handle,
            dispatcher,
        }) = io
        else {
            return Ok(());
        };

        let _ = shutdown.try_send(());
        drop(outbound);
        handle.join().map_err(|_| TransportError::JoinError)?;

        // a listener closing the transport runs on the dispatch thread itself
        if dispatcher.thread().id() == current().id() {
            return Ok(());
        }
        dispatcher.join().map_err(|_| TransportError::JoinError)
    }
}

impl<K> Drop for StreamingTransport<K>
where
    K: Connector,
{
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(%err, "closing streaming transport");
        }
    }
}

fn run_io_loop<C: Connection>(
    mut connection: C,
    inbound: Sender<ChunkChain>,
    outbound: Receiver<Outbound>,
    shutdown: Receiver<()>,
) {
    let _guard = info_span!("opamp_streaming").entered();
    loop {
        select_biased! {
            recv(shutdown) -> _ => {
                debug!("gracefully shutting down the streaming connection");
                break;
            }
            recv(outbound) -> msg => {
                let Ok(Outbound { frame, reply }) = msg else {
                    debug!("all senders dropped, closing the streaming connection");
                    break;
                };
                let result = connection.send_frame(frame);
                if let Err(err) = &result {
                    error!(%err, "writing frame");
                }
                let _ = reply.send(result);
            }
            default => match connection.receive() {
                Ok(Some(framed)) => {
                    trace!(len = framed.len(), "inbound frame");
                    if inbound.send(framed).is_err() {
                        warn!("dispatch thread gone, dropping inbound frame");
                    }
                }
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    warn!("streaming connection closed by the server");
                    break;
                }
                Err(err) => {
                    error!(%err, "reading from the streaming connection");
                    break;
                }
            },
        }
    }

    if let Err(err) = connection.close() {
        debug!(%err, "closing the streaming connection");
    }
    debug!("streaming I/O thread stopped");
}

// Listeners run here, off the I/O thread, so they may send through the transport.
// Ends once the I/O thread drops its sender and the queued frames are processed.
fn run_dispatch_loop(processor: FrameProcessor, inbound: Receiver<ChunkChain>) {
    let _guard = info_span!("opamp_dispatch").entered();
    for framed in inbound {
        // invalid frames are logged by the processor and skipped
        let _ = processor.on_framed_message(framed);
    }
    debug!("streaming dispatch thread stopped");
}
