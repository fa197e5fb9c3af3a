use std::thread::sleep;
use std::time::Duration;

use tracing::{info, warn};

use opamp_agent_client::opamp::proto::AgentCapabilities;
use opamp_agent_client::operation::agent_description::AgentDescription;
use opamp_agent_client::operation::health::HealthStatus;
use opamp_agent_client::operation::listener::ListenerResult;
use opamp_agent_client::operation::messages::{MessageKind, ServerMessage};
use opamp_agent_client::operation::settings::{ClientSettings, HeartbeatSettings};
use opamp_agent_client::{
    Client, NotStartedClient, NotStartedOpampClient, StartedClient, capabilities,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .init();

    let settings = ClientSettings::new("http://127.0.0.1:4320/v1/opamp")
        .unwrap()
        .with_headers([("super-key", "5UP4H-K3Y")])
        .unwrap()
        .with_timeout(Duration::from_secs(5))
        .with_heartbeat(HeartbeatSettings::default().with_interval(Duration::from_secs(10)))
        .with_capabilities(capabilities!(
            AgentCapabilities::ReportsStatus,
            AgentCapabilities::ReportsHealth
        ))
        .with_agent_description(
            AgentDescription::default()
                .with_identifying("service.name", "com.example.agent")
                .with_identifying("service.version", "0.1.0")
                .with_non_identifying("host.cores", 8i64)
                .with_non_identifying("debug", true),
        );

    let mut not_started_client = NotStartedOpampClient::new(settings).unwrap();
    not_started_client.register_listener(
        [MessageKind::CustomMessage, MessageKind::Command],
        |msg: &ServerMessage| -> ListenerResult {
            info!(kind = %msg.kind(), "message received");
            Ok(())
        },
    );
    not_started_client.register_listener(
        [MessageKind::ErrorResponse],
        |msg: &ServerMessage| -> ListenerResult {
            warn!(?msg, "server reported an error");
            Ok(())
        },
    );

    let client = not_started_client
        .with_startup_check_disabled()
        .start()
        .unwrap();

    client.update_status(HealthStatus::healthy("running")).unwrap();
    info!("sleeping");
    sleep(Duration::from_secs(30));

    client
        .update_status(HealthStatus::unhealthy("wow! what an error"))
        .unwrap();
    sleep(Duration::from_secs(15));

    if let Err(err) = client.poll() {
        warn!(%err, "polling for pending messages");
    }
    client.stop().unwrap()
}
