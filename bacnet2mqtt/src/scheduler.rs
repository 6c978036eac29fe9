//! Per-device polling scheduler.
//!
//! One cancellable job per device id. Replacing a device's schedule
//! cancels the prior job before installing the new one, with no await
//! point in between, so two jobs can never coexist for the same id.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::MqttBridge;
use crate::config::DeviceDescriptor;
use crate::transport::BacnetTransport;

/// Scheduler errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid schedule '{expr}': {message}")]
    Schedule { expr: String, message: String },
}

/// A running poll job.
struct PollJob {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Mapping from device id to its single active poll job.
pub struct PollingScheduler {
    jobs: HashMap<String, PollJob>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }

    /// Install (or replace) the poll job for a device.
    ///
    /// The cron expression is parsed before the existing job is
    /// touched, so an invalid schedule leaves the old job running.
    pub fn start_polling(
        &mut self,
        descriptor: &DeviceDescriptor,
        transport: Arc<BacnetTransport>,
        bridge: Arc<MqttBridge>,
    ) -> Result<(), SchedulerError> {
        let expr = descriptor.polling.schedule.clone();
        let schedule = Schedule::from_str(&expr).map_err(|e| SchedulerError::Schedule {
            expr: expr.clone(),
            message: e.to_string(),
        })?;

        let device_id = descriptor.device.device_id.clone();

        // Cancel-old-then-install-new without an intervening await.
        if let Some(previous) = self.jobs.remove(&device_id) {
            previous.cancel.cancel();
            previous.handle.abort();
            info!(device_id = %device_id, "Replacing poll job");
        }

        let cancel = CancellationToken::new();
        let job_cancel = cancel.clone();
        let descriptor = descriptor.clone();

        info!(device_id = %device_id, schedule = %expr, "Starting poll job");

        let handle = tokio::spawn(async move {
            run_poll_loop(descriptor, schedule, transport, bridge, job_cancel).await;
        });

        self.jobs.insert(device_id, PollJob { cancel, handle });
        Ok(())
    }

    /// Tear down the poll job for a device. Returns whether one existed.
    pub fn stop(&mut self, device_id: &str) -> bool {
        match self.jobs.remove(device_id) {
            Some(job) => {
                job.cancel.cancel();
                job.handle.abort();
                info!(device_id = %device_id, "Stopped poll job");
                true
            }
            None => false,
        }
    }

    /// Whether a job is installed for this device.
    pub fn is_polling(&self, device_id: &str) -> bool {
        self.jobs.contains_key(device_id)
    }

    /// Number of active jobs.
    pub fn active_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel every job (shutdown path).
    pub fn shutdown(&mut self) {
        for (device_id, job) in self.jobs.drain() {
            job.cancel.cancel();
            job.handle.abort();
            debug!(device_id = %device_id, "Cancelled poll job");
        }
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// The per-device poll loop.
///
/// The read is awaited before the next occurrence is computed, so
/// reads for one device are strictly sequential: a tick that overruns
/// skips the missed occurrences instead of overlapping. A failed tick
/// is logged and the schedule continues.
async fn run_poll_loop(
    descriptor: DeviceDescriptor,
    schedule: Schedule,
    transport: Arc<BacnetTransport>,
    bridge: Arc<MqttBridge>,
    cancel: CancellationToken,
) {
    let device = &descriptor.device;
    let objects = descriptor.object_ids();

    loop {
        let next = match schedule.upcoming(Utc).next() {
            Some(next) => next,
            None => {
                warn!(device_id = %device.device_id, "Schedule has no upcoming occurrence, stopping");
                return;
            }
        };

        let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        match transport.read_values(device, &objects).await {
            Ok(values) => {
                debug!(
                    device_id = %device.device_id,
                    values = values.len(),
                    "Poll tick complete"
                );
                if let Err(e) = bridge.publish_values(&values).await {
                    warn!(device_id = %device.device_id, error = %e, "Failed to publish poll results");
                }
            }
            Err(e) => {
                error!(device_id = %device.device_id, error = %e, "Poll tick failed");
            }
        }
    }
}
