//! Implementation of the [`NotStartedClient`] and [`StartedClient`] traits for OpAMP

use std::sync::atomic::{AtomicU64, Ordering};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock};

use tracing::{debug, error, instrument, trace};

use crate::client::{Client, NotStartedClient, StartedClient};
use crate::common::message_processor::FrameProcessor;
use crate::common::nextmessage::FrameBuilder;
use crate::error::{
    ClientError, ClientResult, NotStartedClientResult, StartedClientError, StartedClientResult,
};
use crate::heartbeat::{BackgroundService, HealthReportSender, HeartbeatService};
use crate::opamp::proto::AgentToServer;
use crate::operation::agent_description::AgentDescription;
use crate::operation::health::{
    HealthReport, HealthStatus, process_start_time_unix_nano, unix_nanos_now,
};
use crate::operation::instance_uid::InstanceUid;
use crate::operation::listener::{Listener, ListenerId, ListenerRegistry};
use crate::operation::messages::MessageKind;
use crate::operation::settings::{ClientSettings, ConnectionType};
use crate::transport::{
    HttpTransport, StreamingTransport, Transport, TransportError, WebSocketConnector,
};

/// Transport picked from the connection type of the settings.
pub type DynTransport = Box<dyn Transport>;

/// A client being configured. Listeners can only be registered at this stage.
pub struct NotStartedOpampClient<T>
where
    T: Transport,
{
    settings: ClientSettings,
    transport: T,
    registry: ListenerRegistry,
    perform_startup_check: bool,
}

/// A started client. Owns the heartbeat thread, if enabled, and the transport.
pub struct StartedOpampClient<T>
where
    T: Transport + 'static,
{
    core: Arc<ClientCore<T>>,
    heartbeat: Option<HeartbeatService<ClientCore<T>>>,
    agent_description: RwLock<AgentDescription>,
}

// Shared by the client and its heartbeat.
struct ClientCore<T> {
    instance_uid: InstanceUid,
    transport: T,
    sequence_num: AtomicU64,
}

impl NotStartedOpampClient<DynTransport> {
    /// Creates a client using the transport selected by the connection type.
    ///
    /// # Errors
    ///
    /// Fails if the settings are invalid or the HTTP client cannot be built.
    pub fn new(settings: ClientSettings) -> NotStartedClientResult<Self> {
        settings.validate()?;
        let transport: DynTransport = match settings.connection_type() {
            ConnectionType::Http => Box::new(HttpTransport::from_config(settings.http_config())?),
            ConnectionType::Streaming => Box::new(StreamingTransport::new(
                WebSocketConnector::new(settings.http_config()),
            )),
        };
        Self::with_transport(settings, transport)
    }
}

impl<T> NotStartedOpampClient<T>
where
    T: Transport + 'static,
{
    /// Creates a client sending through `transport`.
    pub fn with_transport(settings: ClientSettings, transport: T) -> NotStartedClientResult<Self> {
        settings.validate()?;
        // pins the start time reported in every health message
        process_start_time_unix_nano();
        Ok(Self {
            settings,
            transport,
            registry: ListenerRegistry::new(),
            perform_startup_check: true,
        })
    }

    /// Registers `listener` for messages of `kinds`.
    pub fn register_listener<I, L>(&mut self, kinds: I, listener: L) -> ListenerId
    where
        I: IntoIterator<Item = MessageKind>,
        L: Listener + 'static,
    {
        self.registry.register(kinds, listener)
    }

    /// Returns a new instance with the startup check disabled. The client's start method will not fail if
    /// there is an error sending the first message.
    pub fn with_startup_check_disabled(self) -> Self {
        Self {
            perform_startup_check: false,
            ..self
        }
    }

    /// The instance uid the client will send.
    pub fn instance_uid(&self) -> InstanceUid {
        self.settings.instance_uid()
    }
}

impl<T> Debug for NotStartedOpampClient<T>
where
    T: Transport,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotStartedOpampClient")
            .field("instance_uid", &self.settings.instance_uid())
            .field("connection_type", &self.settings.connection_type())
            .field("registry", &self.registry)
            .field("perform_startup_check", &self.perform_startup_check)
            .finish_non_exhaustive()
    }
}

impl<T> NotStartedClient for NotStartedOpampClient<T>
where
    T: Transport + 'static,
{
    type StartedClient = StartedOpampClient<T>;

    #[instrument(name = "opamp", fields(instance_uid = %self.settings.instance_uid()), skip_all)]
    fn start(self) -> NotStartedClientResult<StartedOpampClient<T>> {
        let NotStartedOpampClient {
            settings,
            transport,
            registry,
            perform_startup_check,
        } = self;
        let instance_uid = settings.instance_uid();

        debug!(listeners = registry.len(), "connecting transport");
        transport.connect(FrameProcessor::new(Arc::new(registry)))?;

        let core = Arc::new(ClientCore {
            instance_uid,
            transport,
            sequence_num: AtomicU64::new(1),
        });

        debug!("sending first AgentToServer message");
        let mut first = FrameBuilder::new(instance_uid);
        first
            .add_agent_description(settings.agent_description().clone())
            .add_capabilities(settings.capabilities());
        if let Err(err) = core.send(first.build()) {
            if perform_startup_check {
                let _ = core
                    .transport
                    .close()
                    .inspect_err(|err| error!(%err, "error closing transport"));
                return Err(err.into());
            }
            error!(%err, "error sending first AgentToServer message");
        }

        let heartbeat = if settings.heartbeat().enabled {
            let mut heartbeat = HeartbeatService::new(Arc::clone(&core), instance_uid);
            heartbeat.configure(settings.heartbeat().clone())?;
            heartbeat.start()?;
            Some(heartbeat)
        } else {
            debug!("heartbeat disabled");
            None
        };

        Ok(StartedOpampClient {
            core,
            heartbeat,
            agent_description: RwLock::new(settings.agent_description().clone()),
        })
    }
}

impl<T> ClientCore<T>
where
    T: Transport,
{
    fn send(&self, mut frame: AgentToServer) -> Result<(), TransportError> {
        frame.sequence_num = self.sequence_num.fetch_add(1, Ordering::SeqCst);
        trace!(sequence_num = frame.sequence_num, "sending AgentToServer message");
        self.transport.send(&frame)
    }
}

impl<T> HealthReportSender for ClientCore<T>
where
    T: Transport,
{
    fn send_health(&self, report: &HealthReport) -> Result<(), TransportError> {
        let mut builder = FrameBuilder::new(self.instance_uid);
        builder.add_health(report);
        self.send(builder.build())
    }
}

impl<T> Client for StartedOpampClient<T>
where
    T: Transport + 'static,
{
    fn instance_uid(&self) -> InstanceUid {
        self.core.instance_uid
    }

    fn frame_builder(&self) -> FrameBuilder {
        FrameBuilder::new(self.core.instance_uid)
    }

    fn send(&self, builder: &FrameBuilder) -> ClientResult<()> {
        Ok(self.core.send(builder.build())?)
    }

    fn poll(&self) -> ClientResult<()> {
        Ok(self.core.send(self.frame_builder().build())?)
    }

    fn set_agent_description(&self, description: AgentDescription) -> ClientResult<()> {
        *self
            .agent_description
            .write()
            .map_err(|_| ClientError::PoisonError)? = description.clone();

        let mut builder = self.frame_builder();
        builder.add_agent_description(description);
        self.send(&builder)
    }

    fn agent_description(&self) -> ClientResult<AgentDescription> {
        let description = self
            .agent_description
            .read()
            .map_err(|_| ClientError::PoisonError)?;
        Ok(description.clone())
    }

    fn update_status(&self, status: HealthStatus) -> ClientResult<()> {
        match &self.heartbeat {
            Some(heartbeat) => Ok(heartbeat.update_status(status)?),
            None => {
                let report = HealthReport {
                    start_time_unix_nano: process_start_time_unix_nano(),
                    status_time_unix_nano: unix_nanos_now(),
                    status,
                };
                Ok(self.core.send_health(&report)?)
            }
        }
    }
}

impl<T> Debug for StartedOpampClient<T>
where
    T: Transport + 'static,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedOpampClient")
            .field("instance_uid", &self.core.instance_uid)
            .field(
                "sequence_num",
                &self.core.sequence_num.load(Ordering::SeqCst),
            )
            .field(
                "heartbeat_running",
                &self.heartbeat.as_ref().is_some_and(|h| h.is_running()),
            )
            .finish_non_exhaustive()
    }
}

impl<T> StartedClient for StartedOpampClient<T>
where
    T: Transport + 'static,
{
    #[instrument(name = "opamp", fields(instance_uid = %self.core.instance_uid), skip_all)]
    fn stop(mut self) -> StartedClientResult<()> {
        if let Some(mut heartbeat) = self.heartbeat.take() {
            heartbeat.stop()?;
        }

        debug!("sending AgentDisconnect message");
        let mut disconnect = self.frame_builder();
        disconnect.add_agent_disconnect();
        let _ = self
            .core
            .send(disconnect.build())
            .inspect_err(|err| error!(%err, "error sending AgentDisconnect message"));

        self.core
            .transport
            .close()
            .map_err(StartedClientError::TransportError)
    }
}
