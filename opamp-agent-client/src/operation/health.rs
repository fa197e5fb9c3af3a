//! Health status reported by the agent and the report built from it on every heartbeat.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::opamp::proto::ComponentHealth;

const NANOS_PER_MILLI: u64 = 1_000_000;

static PROCESS_START: OnceLock<u64> = OnceLock::new();

/// Current wall-clock time as nanoseconds since the Unix epoch, with millisecond granularity.
pub fn unix_nanos_now() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    u64::try_from(millis)
        .unwrap_or(u64::MAX / NANOS_PER_MILLI)
        .saturating_mul(NANOS_PER_MILLI)
}

/// When this process started reporting, in the units of [`unix_nanos_now`].
///
/// Pinned by the first call and constant afterwards, so every report of the process
/// carries the same start time.
pub fn process_start_time_unix_nano() -> u64 {
    *PROCESS_START.get_or_init(unix_nanos_now)
}

/// The latest health known to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    /// Whether the agent considers itself healthy.
    pub healthy: bool,
    /// Free text describing the status, e.g. the last error.
    pub status: String,
}

impl HealthStatus {
    /// A healthy status.
    pub fn healthy(status: impl Into<String>) -> Self {
        Self {
            healthy: true,
            status: status.into(),
        }
    }

    /// An unhealthy status.
    pub fn unhealthy(status: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: status.into(),
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::healthy("")
    }
}

/// A health report as sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// When the reporting process started.
    pub start_time_unix_nano: u64,
    /// When `status` was last updated.
    pub status_time_unix_nano: u64,
    /// The reported status.
    pub status: HealthStatus,
}

impl From<&HealthReport> for ComponentHealth {
    fn from(report: &HealthReport) -> Self {
        let last_error = if report.status.healthy {
            String::new()
        } else {
            report.status.status.clone()
        };
        ComponentHealth {
            healthy: report.status.healthy,
            start_time_unix_nano: report.start_time_unix_nano,
            last_error,
            status: report.status.status.clone(),
            status_time_unix_nano: report.status_time_unix_nano,
        }
    }
}
