//! Chaos experiments for detection validation.
//!
//! A [`FaultInjector`] wraps a metric source and perturbs the samples it
//! returns while an experiment is active; production adapters and the
//! detector never learn that a fault was injected. The
//! [`ChaosController`] runs an experiment end to end and reports whether
//! detection flagged the device within the expected number of samples.

use crate::adapter::MetricSource;
use crate::config::Thresholds;
use crate::detector;
use crate::error::{IoShelferError, Result};
use crate::types::{DeviceId, DeviceKind, HealthStatus, Sample, SampleMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Kind of fault to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Add latency to network samples (magnitude in milliseconds).
    NetworkLatency,
    /// Add packet loss to network samples (magnitude as a rate).
    PacketLoss,
    /// Inflate disk IOPS variance (magnitude added directly).
    DiskIopsVariance,
    /// Inflate RAID queue depth (magnitude added directly).
    RaidQueueDepth,
}

/// Configuration of one chaos experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub device_id: DeviceId,
    pub kind: DeviceKind,
    pub fault: FaultKind,
    /// Fault strength; unit depends on the fault kind.
    pub magnitude: f64,
    /// Samples to draw while the fault is active.
    pub samples: usize,
}

impl ExperimentSpec {
    fn fault_matches_kind(&self) -> bool {
        matches!(
            (self.fault, self.kind),
            (FaultKind::NetworkLatency, DeviceKind::Network)
                | (FaultKind::PacketLoss, DeviceKind::Network)
                | (FaultKind::DiskIopsVariance, DeviceKind::Disk)
                | (FaultKind::RaidQueueDepth, DeviceKind::Raid)
        )
    }
}

/// Outcome of an experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub device_id: DeviceId,
    pub fault: FaultKind,
    /// Whether the detector flagged the device while the fault was active.
    pub detected: bool,
    /// Samples drawn before the first non-healthy verdict, if any.
    pub samples_to_detect: Option<usize>,
    /// Whether the device classified Healthy again after the fault cleared.
    pub recovered: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ActiveFault {
    fault: FaultKind,
    magnitude: f64,
}

/// Metric source wrapper that perturbs samples for devices under experiment.
pub struct FaultInjector {
    inner: Arc<dyn MetricSource>,
    active: RwLock<HashMap<DeviceId, ActiveFault>>,
}

impl FaultInjector {
    pub fn new(inner: Arc<dyn MetricSource>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            active: RwLock::new(HashMap::new()),
        })
    }

    /// Start perturbing samples for a device.
    pub fn inject(&self, device_id: &str, fault: FaultKind, magnitude: f64) {
        info!(device_id, fault = ?fault, magnitude, "injecting fault");
        self.active.write().insert(
            device_id.to_string(),
            ActiveFault { fault, magnitude },
        );
    }

    /// Stop perturbing samples for a device.
    pub fn clear(&self, device_id: &str) {
        if self.active.write().remove(device_id).is_some() {
            info!(device_id, "fault cleared");
        }
    }

    fn perturb(metrics: &mut SampleMetrics, fault: &ActiveFault) {
        match (&fault.fault, metrics) {
            (FaultKind::NetworkLatency, SampleMetrics::Network(net)) => {
                net.latency_p95 += Duration::from_millis(fault.magnitude as u64);
            }
            (FaultKind::PacketLoss, SampleMetrics::Network(net)) => {
                net.packet_loss_rate = (net.packet_loss_rate + fault.magnitude).clamp(0.0, 1.0);
            }
            (FaultKind::DiskIopsVariance, SampleMetrics::Disk(disk)) => {
                disk.iops_variance += fault.magnitude;
            }
            (FaultKind::RaidQueueDepth, SampleMetrics::Raid(raid)) => {
                raid.queue_depth = raid.queue_depth.saturating_add(fault.magnitude as u32);
            }
            _ => {
                warn!(fault = ?fault.fault, "fault kind does not match sample kind");
            }
        }
    }
}

#[async_trait]
impl MetricSource for FaultInjector {
    fn kind(&self) -> DeviceKind {
        self.inner.kind()
    }

    async fn sample(&self, device_id: &str) -> Result<Sample> {
        let mut sample = self.inner.sample(device_id).await?;
        if let Some(fault) = self.active.read().get(device_id).cloned() {
            Self::perturb(&mut sample.metrics, &fault);
        }
        Ok(sample)
    }
}

/// Runs chaos experiments against the detection rules.
pub struct ChaosController {
    injector: Arc<FaultInjector>,
    thresholds: Thresholds,
}

impl ChaosController {
    pub fn new(injector: Arc<FaultInjector>, thresholds: Thresholds) -> Self {
        Self {
            injector,
            thresholds,
        }
    }

    /// Inject the fault, draw the configured number of samples through the
    /// injector, and check that detection fires. The fault is always
    /// cleared before returning, and a final sample verifies recovery.
    pub async fn run(&self, spec: &ExperimentSpec) -> Result<ExperimentReport> {
        if !spec.fault_matches_kind() {
            return Err(IoShelferError::Config(format!(
                "fault {:?} cannot target a {} device",
                spec.fault, spec.kind
            )));
        }
        if spec.samples == 0 {
            return Err(IoShelferError::Config(
                "experiment needs at least one sample".to_string(),
            ));
        }

        let started_at = Utc::now();
        self.injector
            .inject(&spec.device_id, spec.fault, spec.magnitude);

        let mut samples_to_detect = None;
        for i in 0..spec.samples {
            let sample = match self.injector.sample(&spec.device_id).await {
                Ok(sample) => sample,
                Err(e) => {
                    self.injector.clear(&spec.device_id);
                    return Err(e);
                }
            };
            let verdict = detector::classify(&sample, &self.thresholds);
            if verdict.status != HealthStatus::Healthy {
                samples_to_detect = Some(i + 1);
                break;
            }
        }

        self.injector.clear(&spec.device_id);

        // With the fault cleared, the very next sample should classify
        // Healthy again for a well-behaved probe.
        let recovered = match self.injector.sample(&spec.device_id).await {
            Ok(sample) => {
                detector::classify(&sample, &self.thresholds).status == HealthStatus::Healthy
            }
            Err(_) => false,
        };

        let report = ExperimentReport {
            device_id: spec.device_id.clone(),
            fault: spec.fault,
            detected: samples_to_detect.is_some(),
            samples_to_detect,
            recovered,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            device_id = %report.device_id,
            detected = report.detected,
            recovered = report.recovered,
            "chaos experiment finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetworkSample;

    /// Source that always returns a fixed healthy network sample.
    struct HealthyNetSource;

    #[async_trait]
    impl MetricSource for HealthyNetSource {
        fn kind(&self) -> DeviceKind {
            DeviceKind::Network
        }

        async fn sample(&self, _device_id: &str) -> Result<Sample> {
            Ok(Sample::network(
                Utc::now(),
                NetworkSample {
                    latency_p95: Duration::from_millis(2),
                    packet_loss_rate: 0.0,
                    bytes_per_second: 1_000_000,
                },
            ))
        }
    }

    #[tokio::test]
    async fn test_injector_perturbs_only_targeted_device() {
        let injector = FaultInjector::new(Arc::new(HealthyNetSource));
        injector.inject("eth0", FaultKind::PacketLoss, 0.5);

        let hit = injector.sample("eth0").await.unwrap();
        match hit.metrics {
            SampleMetrics::Network(net) => assert!(net.packet_loss_rate > 0.4),
            other => panic!("unexpected metrics {:?}", other),
        }

        let miss = injector.sample("eth1").await.unwrap();
        match miss.metrics {
            SampleMetrics::Network(net) => assert_eq!(net.packet_loss_rate, 0.0),
            other => panic!("unexpected metrics {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_experiment_detects_and_recovers() {
        let injector = FaultInjector::new(Arc::new(HealthyNetSource));
        let controller = ChaosController::new(injector, Thresholds::default());

        let report = controller
            .run(&ExperimentSpec {
                device_id: "eth0".into(),
                kind: DeviceKind::Network,
                fault: FaultKind::PacketLoss,
                magnitude: 0.2,
                samples: 3,
            })
            .await
            .unwrap();

        assert!(report.detected);
        assert_eq!(report.samples_to_detect, Some(1));
        assert!(report.recovered);
    }

    #[tokio::test]
    async fn test_mismatched_fault_is_rejected() {
        let injector = FaultInjector::new(Arc::new(HealthyNetSource));
        let controller = ChaosController::new(injector, Thresholds::default());

        let err = controller
            .run(&ExperimentSpec {
                device_id: "eth0".into(),
                kind: DeviceKind::Network,
                fault: FaultKind::RaidQueueDepth,
                magnitude: 100.0,
                samples: 3,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IoShelferError::Config(_)));
    }

    #[tokio::test]
    async fn test_sub_threshold_fault_goes_undetected() {
        let injector = FaultInjector::new(Arc::new(HealthyNetSource));
        let controller = ChaosController::new(injector, Thresholds::default());

        // Loss below the 0.01 threshold never triggers detection.
        let report = controller
            .run(&ExperimentSpec {
                device_id: "eth0".into(),
                kind: DeviceKind::Network,
                fault: FaultKind::PacketLoss,
                magnitude: 0.005,
                samples: 3,
            })
            .await
            .unwrap();

        assert!(!report.detected);
        assert!(report.recovered);
    }
}
