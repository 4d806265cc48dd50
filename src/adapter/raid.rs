//! RAID controller metric adapter.

use super::MetricSource;
use crate::error::{IoShelferError, Result};
use crate::probe::ProbeHub;
use crate::types::{DeviceKind, RaidSample, Sample};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::trace;

/// Pulls RAID controller telemetry from the probe hub.
pub struct RaidAdapter {
    hub: Arc<ProbeHub>,
}

impl RaidAdapter {
    pub fn new(hub: Arc<ProbeHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl MetricSource for RaidAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Raid
    }

    async fn sample(&self, device_id: &str) -> Result<Sample> {
        let reading = match self.hub.latest_raid(device_id) {
            None => {
                return Err(IoShelferError::UnknownDevice(format!(
                    "raid controller {} is not registered",
                    device_id
                )))
            }
            Some(None) => {
                return Err(IoShelferError::AdapterTransient(format!(
                    "no probe data yet for raid controller {}",
                    device_id
                )))
            }
            Some(Some(r)) => r,
        };

        // Raw retry counts cover the probe window; the detector expects a
        // per-hour rate.
        let window_secs = reading.window.as_secs().max(1);
        let error_retry_rate =
            ((reading.error_retries as u64 * 3600) / window_secs) as u32;

        trace!(
            device_id,
            queue_depth = reading.queue_depth,
            error_retry_rate,
            "sampled raid controller"
        );

        Ok(Sample::raid(
            Utc::now(),
            RaidSample {
                queue_depth: reading.queue_depth,
                avg_latency: reading.avg_latency,
                error_retry_rate,
                firmware_version: reading.firmware_version,
            },
        ))
    }
}
