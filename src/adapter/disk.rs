//! Disk (SMART) metric adapter.

use super::MetricSource;
use crate::error::{IoShelferError, Result};
use crate::probe::ProbeHub;
use crate::types::{DeviceKind, DiskSample, Sample};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::trace;

/// Pulls disk telemetry from the probe hub and derives IOPS variance across
/// the ring of recent readings.
pub struct DiskAdapter {
    hub: Arc<ProbeHub>,
}

impl DiskAdapter {
    pub fn new(hub: Arc<ProbeHub>) -> Self {
        Self { hub }
    }
}

/// Population variance. A single reading has no spread.
fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

#[async_trait]
impl MetricSource for DiskAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Disk
    }

    async fn sample(&self, device_id: &str) -> Result<Sample> {
        let readings = self.hub.disk_readings(device_id).ok_or_else(|| {
            IoShelferError::UnknownDevice(format!("disk {} is not registered", device_id))
        })?;

        let latest = readings.last().cloned().ok_or_else(|| {
            IoShelferError::AdapterTransient(format!(
                "no probe data yet for disk {}",
                device_id
            ))
        })?;

        let iops_series: Vec<f64> = readings.iter().map(|r| r.iops).collect();
        let iops_variance = variance(&iops_series);

        trace!(
            device_id,
            reallocated = latest.smart.reallocated_sectors,
            iops_variance,
            "sampled disk"
        );

        Ok(Sample::disk(
            Utc::now(),
            DiskSample {
                smart: latest.smart,
                iops_variance,
                temperature_c: latest.temperature_c,
                power_on_hours: latest.power_on_hours,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::DiskProbeReading;
    use crate::types::SmartAttrs;

    fn smart() -> SmartAttrs {
        SmartAttrs {
            reallocated_sectors: 2,
            read_error_rate: 0.0,
            pending_sectors: 0,
            device_model: "TST".into(),
            serial: "S0".into(),
        }
    }

    fn reading(iops: f64) -> DiskProbeReading {
        DiskProbeReading {
            smart: smart(),
            temperature_c: 38,
            power_on_hours: 500,
            iops,
        }
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[5.0]), 0.0);
        assert_eq!(variance(&[2.0, 2.0, 2.0]), 0.0);
        // Values 1..5 have population variance 2.
        assert!((variance(&[1.0, 2.0, 3.0, 4.0, 5.0]) - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_sample_computes_variance_over_ring() {
        let hub = ProbeHub::new();
        hub.register_disk("sda");
        for iops in [1000.0, 1000.0, 1000.0] {
            hub.push_disk("sda", reading(iops));
        }
        let adapter = DiskAdapter::new(hub.clone());

        let sample = adapter.sample("sda").await.unwrap();
        match sample.metrics {
            crate::types::SampleMetrics::Disk(disk) => {
                assert_eq!(disk.iops_variance, 0.0);
                assert_eq!(disk.smart.reallocated_sectors, 2);
            }
            other => panic!("expected disk metrics, got {:?}", other),
        }

        // A wildly different reading raises the variance.
        hub.push_disk("sda", reading(4000.0));
        let sample = adapter.sample("sda").await.unwrap();
        match sample.metrics {
            crate::types::SampleMetrics::Disk(disk) => assert!(disk.iops_variance > 0.0),
            other => panic!("expected disk metrics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_disk() {
        let adapter = DiskAdapter::new(ProbeHub::new());
        assert!(matches!(
            adapter.sample("nvme0n1").await.unwrap_err(),
            IoShelferError::UnknownDevice(_)
        ));
    }
}
