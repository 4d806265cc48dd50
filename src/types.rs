//! Core type definitions for IOShelfer.
//!
//! This module contains the fundamental data types used throughout the
//! detection-prediction-remediation pipeline: per-kind telemetry samples,
//! health verdicts, failure forecasts, and per-device policy state.
//!
//! # Key Types
//!
//! - [`Sample`]: one timestamped observation for one device
//! - [`HealthVerdict`]: the detector's classification of a single sample
//! - [`Forecast`]: trend-based failure projection over a horizon
//! - [`DeviceHealth`]: the composite record written to the history store
//! - [`PolicyState`]: per-device remediation state
//!
//! # Examples
//!
//! ```rust
//! use ioshelfer::types::{HealthStatus, RiskLevel};
//!
//! // Statuses are totally ordered: worse states compare greater.
//! assert!(HealthStatus::Failed > HealthStatus::SubHealthy);
//! assert_eq!(HealthStatus::Healthy.max(HealthStatus::SubHealthy), HealthStatus::SubHealthy);
//!
//! // Risk levels derive from fixed probability bands.
//! assert_eq!(RiskLevel::from_probability(0.85), RiskLevel::High);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stable, opaque identifier for a monitored device.
pub type DeviceId = String;

/// The kind of monitored device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// RAID controller.
    Raid,
    /// Block device with SMART attributes.
    Disk,
    /// Network interface.
    Network,
}

impl DeviceKind {
    /// Stable lowercase label, used in file paths and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Raid => "raid",
            DeviceKind::Disk => "disk",
            DeviceKind::Network => "network",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Telemetry for a RAID controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidSample {
    /// Current queue depth.
    pub queue_depth: u32,
    /// Average I/O latency.
    pub avg_latency: Duration,
    /// Error retries normalized to a per-hour rate.
    pub error_retry_rate: u32,
    /// Controller firmware version string.
    pub firmware_version: String,
}

/// SMART attributes for a disk device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartAttrs {
    /// Number of reallocated sectors.
    pub reallocated_sectors: u32,
    /// Raw read error rate in [0, 1].
    pub read_error_rate: f64,
    /// Sectors pending reallocation.
    pub pending_sectors: u32,
    /// Device model string.
    pub device_model: String,
    /// Serial number.
    pub serial: String,
}

/// Telemetry for a disk device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSample {
    /// SMART attributes read from the device.
    pub smart: SmartAttrs,
    /// Variance in IOPS over the probe window.
    pub iops_variance: f64,
    /// Disk temperature in Celsius.
    pub temperature_c: i32,
    /// Total power-on hours.
    pub power_on_hours: u64,
}

/// Telemetry for a network interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    /// 95th percentile latency.
    pub latency_p95: Duration,
    /// Packet loss rate in [0, 1].
    pub packet_loss_rate: f64,
    /// Throughput in bytes per second.
    pub bytes_per_second: u64,
}

/// Kind-specific metric payload of a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SampleMetrics {
    Raid(RaidSample),
    Disk(DiskSample),
    Network(NetworkSample),
}

impl SampleMetrics {
    pub fn kind(&self) -> DeviceKind {
        match self {
            SampleMetrics::Raid(_) => DeviceKind::Raid,
            SampleMetrics::Disk(_) => DeviceKind::Disk,
            SampleMetrics::Network(_) => DeviceKind::Network,
        }
    }
}

/// One observation for one device at one instant.
///
/// Samples are immutable after creation and bear a monotonic timestamp
/// (enforced per device by the history store on append).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Observation timestamp.
    pub ts: DateTime<Utc>,
    /// Kind-specific metrics.
    pub metrics: SampleMetrics,
}

impl Sample {
    pub fn raid(ts: DateTime<Utc>, raid: RaidSample) -> Self {
        Self {
            ts,
            metrics: SampleMetrics::Raid(raid),
        }
    }

    pub fn disk(ts: DateTime<Utc>, disk: DiskSample) -> Self {
        Self {
            ts,
            metrics: SampleMetrics::Disk(disk),
        }
    }

    pub fn network(ts: DateTime<Utc>, net: NetworkSample) -> Self {
        Self {
            ts,
            metrics: SampleMetrics::Network(net),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.metrics.kind()
    }
}

/// Three-state health classification.
///
/// The ordering is by severity: `Healthy < SubHealthy < Failed`, so the worst
/// of several rule outcomes is simply the maximum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Device operating normally.
    Healthy,
    /// Degraded but not failed; detectable only by threshold or trend.
    SubHealthy,
    /// Hard failure.
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::SubHealthy => "subhealthy",
            HealthStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detector's classification of a single sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthVerdict {
    /// Overall status: the maximum over triggered rule outcomes.
    pub status: HealthStatus,
    /// Confidence in (0, 1]: the minimum over triggered rules, 1.0 if none.
    pub confidence: f64,
    /// Short stable rule names, sorted by decreasing severity.
    pub issues: Vec<String>,
    /// Human-readable recommendation from the highest-severity rule.
    pub recommendation: String,
}

impl HealthVerdict {
    /// A verdict for a device with no triggered rules.
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            confidence: 1.0,
            issues: Vec::new(),
            recommendation: "no action required".to_string(),
        }
    }
}

/// Direction of a per-axis trend over a history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Stable,
    Decreasing,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TrendDirection::Increasing => "increasing",
            TrendDirection::Stable => "stable",
            TrendDirection::Decreasing => "decreasing",
        };
        f.write_str(s)
    }
}

/// Per-axis trend directions derived from a history window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendSet {
    pub latency: TrendDirection,
    pub iops: TrendDirection,
    pub errors: TrendDirection,
}

impl TrendSet {
    pub fn stable() -> Self {
        Self {
            latency: TrendDirection::Stable,
            iops: TrendDirection::Stable,
            errors: TrendDirection::Stable,
        }
    }
}

/// Risk band derived from failure probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map a probability to its risk band: <0.3 low, <0.7 medium, else high.
    pub fn from_probability(p: f64) -> Self {
        if p < 0.3 {
            RiskLevel::Low
        } else if p < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Trend-based probabilistic projection of future failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Probability of failure within the horizon, in [0, 1].
    pub failure_probability: f64,
    /// Risk band of the probability.
    pub risk_level: RiskLevel,
    /// Projection horizon.
    pub horizon: Duration,
    /// Axes whose normalized contribution is significant, descending.
    pub contributing_factors: Vec<String>,
    /// Per-axis trend directions.
    pub trend: TrendSet,
}

impl Forecast {
    /// The forecast returned when a window holds fewer than three entries.
    pub fn low_data(horizon: Duration) -> Self {
        Self {
            failure_probability: 0.0,
            risk_level: RiskLevel::Low,
            horizon,
            contributing_factors: Vec::new(),
            trend: TrendSet::stable(),
        }
    }
}

/// Isolation strategy for a remediation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationStrategy {
    /// Device may return to service after recovery.
    Temporary,
    /// Device is withdrawn pending replacement.
    Permanent,
}

impl std::fmt::Display for IsolationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IsolationStrategy::Temporary => "temporary",
            IsolationStrategy::Permanent => "permanent",
        };
        f.write_str(s)
    }
}

/// The action the remediation engine selected for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum RemediationAction {
    /// Remove the device from the active path.
    Isolate { strategy: IsolationStrategy },
    /// Return a previously isolated device to service.
    Recover,
    /// No action; `reason` explains why.
    Noop { reason: String },
}

impl RemediationAction {
    /// Stable label for events and logs.
    pub fn label(&self) -> String {
        match self {
            RemediationAction::Isolate { strategy } => format!("isolate-{}", strategy),
            RemediationAction::Recover => "recover".to_string(),
            RemediationAction::Noop { reason } => format!("noop ({})", reason),
        }
    }
}

/// Outcome of a remediation evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationResult {
    pub device_id: DeviceId,
    pub kind: DeviceKind,
    pub action: RemediationAction,
    pub dispatched: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-device remediation state.
///
/// Created on first observation, mutated only by the remediation engine under
/// the device lock, destroyed only on explicit device removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    /// Whether the device is currently isolated.
    pub isolated: bool,
    /// Timestamp of the last dispatched action.
    pub last_action_ts: Option<DateTime<Utc>>,
    /// Consecutive ticks with a SubHealthy verdict.
    pub consecutive_subhealth_ticks: u32,
    /// Non-isolated siblings remaining after the last dispatched isolation.
    pub preserved_siblings: u32,
}

/// Composite per-tick record written to the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHealth {
    pub device_id: DeviceId,
    pub kind: DeviceKind,
    /// Timestamp of the sample this record classifies. Strictly increasing
    /// per device.
    pub sample_ts: DateTime<Utc>,
    pub verdict: HealthVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Forecast>,
    /// Snapshot of the device's policy state at composition time.
    pub policy: PolicyState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering() {
        assert!(HealthStatus::Healthy < HealthStatus::SubHealthy);
        assert!(HealthStatus::SubHealthy < HealthStatus::Failed);
        assert_eq!(
            HealthStatus::SubHealthy.max(HealthStatus::Failed),
            HealthStatus::Failed
        );
    }

    #[test]
    fn test_risk_bands() {
        assert_eq!(RiskLevel::from_probability(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.69), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(1.0), RiskLevel::High);
    }

    #[test]
    fn test_sample_kind() {
        let s = Sample::network(
            Utc::now(),
            NetworkSample {
                latency_p95: Duration::from_millis(5),
                packet_loss_rate: 0.0,
                bytes_per_second: 1_000_000,
            },
        );
        assert_eq!(s.kind(), DeviceKind::Network);
    }

    #[test]
    fn test_sample_roundtrip_json() {
        let s = Sample::disk(
            Utc::now(),
            DiskSample {
                smart: SmartAttrs {
                    reallocated_sectors: 4,
                    read_error_rate: 0.00001,
                    pending_sectors: 0,
                    device_model: "WDC-TEST".into(),
                    serial: "WX123".into(),
                },
                iops_variance: 12.5,
                temperature_c: 38,
                power_on_hours: 4200,
            },
        );
        let json = serde_json::to_string(&s).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_healthy_verdict_has_no_issues() {
        let v = HealthVerdict::healthy();
        assert_eq!(v.status, HealthStatus::Healthy);
        assert!(v.issues.is_empty());
        assert_eq!(v.confidence, 1.0);
    }

    #[test]
    fn test_action_labels() {
        let a = RemediationAction::Isolate {
            strategy: IsolationStrategy::Temporary,
        };
        assert_eq!(a.label(), "isolate-temporary");
        assert_eq!(RemediationAction::Recover.label(), "recover");
    }
}
