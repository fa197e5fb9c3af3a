//! Periodic health reports.
//!
//! A dedicated thread races a `tick` against the shutdown channel, so `stop` never waits
//! for the rest of an interval. Every tick reports the last recorded status; nothing is
//! sent until a status exists.

use std::sync::{Arc, RwLock};
use std::thread::{JoinHandle, spawn};

use crossbeam::channel::{Receiver, Sender, bounded, select_biased, tick};
use tracing::{debug, error, info_span, instrument, trace};

use super::{BackgroundService, HeartbeatError};
use crate::operation::health::{
    HealthReport, HealthStatus, process_start_time_unix_nano, unix_nanos_now,
};
use crate::operation::instance_uid::InstanceUid;
use crate::operation::settings::HeartbeatSettings;
use crate::transport::TransportError;

/// Delivers health reports to the server.
pub trait HealthReportSender: Send + Sync {
    /// Sends one report.
    fn send_health(&self, report: &HealthReport) -> Result<(), TransportError>;
}

#[derive(Debug)]
struct StatusSnapshot {
    status: HealthStatus,
    updated_at: u64,
}

type LastStatus = Arc<RwLock<Option<Arc<StatusSnapshot>>>>;

enum State {
    Idle,
    Configured(HeartbeatSettings),
    Running {
        shutdown: Sender<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Sends the agent health on a fixed interval from a background thread.
pub struct HeartbeatService<S>
where
    S: HealthReportSender + 'static,
{
    sender: Arc<S>,
    instance_uid: InstanceUid,
    last_status: LastStatus,
    state: State,
}

impl<S> HeartbeatService<S>
where
    S: HealthReportSender + 'static,
{
    /// Creates an idle service reporting through `sender`.
    pub fn new(sender: Arc<S>, instance_uid: InstanceUid) -> Self {
        Self {
            sender,
            instance_uid,
            last_status: Arc::default(),
            state: State::Idle,
        }
    }

    /// Records `status`; the next tick reports it. Allowed in any state.
    pub fn update_status(&self, status: HealthStatus) -> Result<(), HeartbeatError> {
        let snapshot = Arc::new(StatusSnapshot {
            status,
            updated_at: unix_nanos_now(),
        });
        *self
            .last_status
            .write()
            .map_err(|_| HeartbeatError::PoisonError)? = Some(snapshot);
        Ok(())
    }

    /// Returns true while the heartbeat thread runs.
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }
}

impl<S> BackgroundService for HeartbeatService<S>
where
    S: HealthReportSender + 'static,
{
    type Settings = HeartbeatSettings;
    type Error = HeartbeatError;

    fn name(&self) -> &'static str {
        "heartbeat"
    }

    fn configure(&mut self, settings: HeartbeatSettings) -> Result<(), HeartbeatError> {
        if matches!(self.state, State::Running { .. } | State::Stopped) {
            return Err(HeartbeatError::AlreadyStarted);
        }
        settings.validate()?;

        match &settings.initial_status {
            Some(status) => self.update_status(status.clone())?,
            None if !settings.wait_for_first_status => {
                self.update_status(HealthStatus::default())?
            }
            None => {}
        }
        self.state = State::Configured(settings);
        Ok(())
    }

    #[instrument(name = "opamp", fields(instance_uid = %self.instance_uid), skip_all)]
    fn start(&mut self) -> Result<(), HeartbeatError> {
        let settings = match &self.state {
            State::Idle => return Err(HeartbeatError::NotConfigured),
            State::Running { .. } | State::Stopped => return Err(HeartbeatError::AlreadyStarted),
            State::Configured(settings) => settings.clone(),
        };

        let (shutdown, exit) = bounded::<()>(1);
        let handle = spawn({
            let sender = Arc::clone(&self.sender);
            let last_status = Arc::clone(&self.last_status);
            let instance_uid = self.instance_uid;
            let start_time_unix_nano = process_start_time_unix_nano();
            move || {
                run_heartbeat_loop(
                    sender,
                    last_status,
                    instance_uid,
                    start_time_unix_nano,
                    settings,
                    exit,
                )
            }
        });
        debug!(name = self.name(), "background service started");

        self.state = State::Running { shutdown, handle };
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HeartbeatError> {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running { shutdown, handle } => {
                let _ = shutdown.try_send(());
                handle.join().map_err(|_| HeartbeatError::JoinError)?;
                debug!(name = self.name(), "background service stopped");
                Ok(())
            }
            State::Idle | State::Configured(_) | State::Stopped => Ok(()),
        }
    }
}

impl<S> Drop for HeartbeatService<S>
where
    S: HealthReportSender + 'static,
{
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!(%err, "stopping heartbeat service");
        }
    }
}

fn run_heartbeat_loop<S: HealthReportSender>(
    sender: Arc<S>,
    last_status: LastStatus,
    instance_uid: InstanceUid,
    start_time_unix_nano: u64,
    settings: HeartbeatSettings,
    exit: Receiver<()>,
) {
    let ticker = tick(settings.interval);
    loop {
        // Each cycle gets its own span carrying the instance uid
        let _guard = info_span!("opamp", instance_uid = %instance_uid).entered();
        select_biased! {
            recv(exit) -> _ => {
                debug!("gracefully shutting down the heartbeat task");
                break;
            }
            recv(ticker) -> _ => {
                let snapshot = match last_status.read() {
                    Ok(last) => last.clone(),
                    Err(_) => {
                        error!("status lock poisoned, stopping heartbeats");
                        break;
                    }
                };
                match snapshot {
                    Some(snapshot) => {
                        let report = HealthReport {
                            start_time_unix_nano,
                            status_time_unix_nano: snapshot.updated_at,
                            status: snapshot.status.clone(),
                        };
                        debug!(healthy = report.status.healthy, "sending heartbeat");
                        let _ = sender
                            .send_health(&report)
                            .inspect_err(|err| error!(%err, "error while sending heartbeat"));
                    }
                    None => trace!("no status recorded yet, skipping heartbeat"),
                }
            }
        }
    }
    debug!("heartbeat task stopped");
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    use assert_matches::assert_matches;
    use mockall::mock;

    use super::*;
    use crate::operation::settings::ConfigurationError;

    const INTERVAL: Duration = Duration::from_millis(20);

    mock! {
        pub(crate) HealthReportSenderMockall {}

        impl HealthReportSender for HealthReportSenderMockall {
            fn send_health(&self, report: &HealthReport) -> Result<(), TransportError>;
        }
    }

    fn service(
        sender: MockHealthReportSenderMockall,
    ) -> HeartbeatService<MockHealthReportSenderMockall> {
        HeartbeatService::new(Arc::new(sender), InstanceUid::create())
    }

    fn settings() -> HeartbeatSettings {
        HeartbeatSettings::default().with_interval(INTERVAL)
    }

    // Forwards every report to a channel
    fn forwarding_sender(reports: Sender<HealthReport>) -> MockHealthReportSenderMockall {
        let mut sender = MockHealthReportSenderMockall::new();
        sender.expect_send_health().returning(move |report| {
            let _ = reports.send(report.clone());
            Ok(())
        });
        sender
    }

    #[test]
    fn lifecycle_order_is_enforced() {
        let mut heartbeat = service(MockHealthReportSenderMockall::new());
        assert_eq!(heartbeat.name(), "heartbeat");

        assert_matches!(heartbeat.start(), Err(HeartbeatError::NotConfigured));

        heartbeat.configure(settings()).unwrap();
        heartbeat.start().unwrap();
        assert!(heartbeat.is_running());

        assert_matches!(heartbeat.start(), Err(HeartbeatError::AlreadyStarted));
        assert_matches!(
            heartbeat.configure(settings()),
            Err(HeartbeatError::AlreadyStarted)
        );

        heartbeat.stop().unwrap();
        heartbeat.stop().unwrap();
        assert!(!heartbeat.is_running());
        assert_matches!(heartbeat.start(), Err(HeartbeatError::AlreadyStarted));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut heartbeat = service(MockHealthReportSenderMockall::new());
        assert_matches!(
            heartbeat.configure(HeartbeatSettings::default().with_interval(Duration::ZERO)),
            Err(HeartbeatError::Configuration(
                ConfigurationError::ZeroHeartbeatInterval
            ))
        );
    }

    #[test]
    fn nothing_is_sent_before_the_first_status() {
        let mut sender = MockHealthReportSenderMockall::new();
        sender.expect_send_health().never();

        let mut heartbeat = service(sender);
        heartbeat.configure(settings()).unwrap();
        heartbeat.start().unwrap();

        sleep(INTERVAL * 5);
        heartbeat.stop().unwrap();
    }

    #[test]
    fn sends_after_status_update() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut heartbeat = service(forwarding_sender(reports));
        heartbeat.configure(settings()).unwrap();
        heartbeat.start().unwrap();

        heartbeat
            .update_status(HealthStatus::unhealthy("exporter down"))
            .unwrap();

        let report = received.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(report.status, HealthStatus::unhealthy("exporter down"));
        assert!(report.status_time_unix_nano >= report.start_time_unix_nano);

        heartbeat.stop().unwrap();
    }

    #[test]
    fn later_updates_replace_the_reported_status() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut heartbeat = service(forwarding_sender(reports));
        heartbeat.configure(settings()).unwrap();
        heartbeat.start().unwrap();

        heartbeat
            .update_status(HealthStatus::healthy("starting"))
            .unwrap();
        let first = received.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.status, HealthStatus::healthy("starting"));

        sleep(Duration::from_millis(2));
        heartbeat
            .update_status(HealthStatus::unhealthy("exporter down"))
            .unwrap();
        let second = std::iter::from_fn(|| received.recv_timeout(Duration::from_secs(2)).ok())
            .find(|report| report.status != first.status)
            .unwrap();
        assert_eq!(second.status, HealthStatus::unhealthy("exporter down"));
        assert!(second.status_time_unix_nano > first.status_time_unix_nano);

        // every later report keeps the latest status
        for _ in 0..3 {
            let report = received.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(report.status, second.status);
        }
        heartbeat.stop().unwrap();
    }

    #[test]
    fn start_time_is_the_process_start_time() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut heartbeat = service(forwarding_sender(reports.clone()));
        heartbeat
            .configure(settings().with_wait_for_first_status(false))
            .unwrap();
        heartbeat.start().unwrap();
        let first = received.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = received.recv_timeout(Duration::from_secs(2)).unwrap();
        heartbeat.stop().unwrap();

        // a service started later reports the same start time
        sleep(Duration::from_millis(5));
        let mut restarted = service(forwarding_sender(reports));
        restarted
            .configure(settings().with_wait_for_first_status(false))
            .unwrap();
        restarted.start().unwrap();
        while received.try_recv().is_ok() {}
        let third = received.recv_timeout(Duration::from_secs(2)).unwrap();
        restarted.stop().unwrap();

        let expected = process_start_time_unix_nano();
        assert_eq!(first.start_time_unix_nano, expected);
        assert_eq!(second.start_time_unix_nano, expected);
        assert_eq!(third.start_time_unix_nano, expected);
    }

    #[test]
    fn initial_status_is_reported_without_waiting() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut heartbeat = service(forwarding_sender(reports));
        heartbeat
            .configure(settings().with_initial_status(HealthStatus::healthy("starting")))
            .unwrap();
        heartbeat.start().unwrap();

        let report = received.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(report.status, HealthStatus::healthy("starting"));

        heartbeat.stop().unwrap();
    }

    #[test]
    fn default_status_when_not_waiting() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut heartbeat = service(forwarding_sender(reports));
        heartbeat
            .configure(settings().with_wait_for_first_status(false))
            .unwrap();
        heartbeat.start().unwrap();

        let report = received.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(report.status, HealthStatus::default());

        heartbeat.stop().unwrap();
    }

    #[test]
    fn send_errors_do_not_stop_the_loop() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut sender = MockHealthReportSenderMockall::new();
        sender.expect_send_health().returning(move |report| {
            let _ = reports.send(report.clone());
            Err(TransportError::Closed)
        });

        let mut heartbeat = service(sender);
        heartbeat
            .configure(settings().with_wait_for_first_status(false))
            .unwrap();
        heartbeat.start().unwrap();

        for _ in 0..3 {
            received.recv_timeout(Duration::from_secs(2)).unwrap();
        }
        heartbeat.stop().unwrap();
    }

    #[test]
    fn stop_does_not_wait_for_the_interval() {
        let mut heartbeat = service(MockHealthReportSenderMockall::new());
        heartbeat
            .configure(HeartbeatSettings::default().with_interval(Duration::from_secs(10)))
            .unwrap();
        heartbeat.start().unwrap();
        sleep(Duration::from_millis(100));

        let stopping = Instant::now();
        heartbeat.stop().unwrap();
        assert!(stopping.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn drop_stops_the_thread() {
        let (reports, received) = crossbeam::channel::unbounded();
        let mut heartbeat = service(forwarding_sender(reports));
        heartbeat
            .configure(settings().with_wait_for_first_status(false))
            .unwrap();
        heartbeat.start().unwrap();
        received.recv_timeout(Duration::from_secs(2)).unwrap();

        drop(heartbeat);
        // the sender, owned by the thread, is gone once the thread has been joined
        while received.try_recv().is_ok() {}
        assert!(received.recv_timeout(INTERVAL * 5).is_err());
    }
}
