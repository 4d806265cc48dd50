//! Service-level objective validation.
//!
//! Maps service-level indicators for a device onto the three-state health
//! model by checking them against the SLO bound to the device's service
//! tier. Validation is pure and deterministic, like the detector.

use crate::types::{DeviceId, DeviceKind, HealthStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Criticality level of the business service a device backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceTier {
    Critical,
    NonCritical,
}

impl std::fmt::Display for ServiceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceTier::Critical => "critical",
            ServiceTier::NonCritical => "non_critical",
        };
        f.write_str(s)
    }
}

/// SLO requirements for one (kind, tier) pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloConfig {
    pub tier: ServiceTier,
    /// Maximum acceptable I/O latency.
    pub max_latency: Duration,
    /// Minimum acceptable throughput in MB/s.
    pub min_throughput: f64,
    /// Maximum acceptable throughput loss percentage.
    pub max_throughput_loss: f64,
    /// Minimum acceptable availability percentage.
    pub min_availability: f64,
}

/// Current service-level indicators for a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliMetrics {
    pub kind: DeviceKind,
    pub device_id: DeviceId,
    pub latency: Duration,
    /// Current throughput in MB/s.
    pub throughput: f64,
    /// Throughput loss percentage.
    pub throughput_loss: f64,
    /// Availability percentage.
    pub availability: f64,
    pub ts: DateTime<Utc>,
}

/// Result of validating SLIs against an SLO.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SloValidation {
    pub kind: DeviceKind,
    pub device_id: DeviceId,
    pub tier: ServiceTier,
    pub status: HealthStatus,
    /// Short stable violation labels.
    pub violations: Vec<String>,
    pub confidence: f64,
    pub recommendation: String,
}

/// Validates SLIs against per-(kind, tier) SLO configurations.
pub struct SloValidator {
    configs: HashMap<(DeviceKind, ServiceTier), SloConfig>,
}

impl SloValidator {
    /// A validator seeded with the default SLO table.
    pub fn new() -> Self {
        let mut validator = Self {
            configs: HashMap::new(),
        };
        validator.install_defaults();
        validator
    }

    fn install_defaults(&mut self) {
        let defaults = [
            (
                DeviceKind::Raid,
                ServiceTier::Critical,
                Duration::from_millis(50),
                500.0,
                10.0,
                99.9,
            ),
            (
                DeviceKind::Raid,
                ServiceTier::NonCritical,
                Duration::from_millis(200),
                100.0,
                30.0,
                99.0,
            ),
            (
                DeviceKind::Disk,
                ServiceTier::Critical,
                Duration::from_millis(30),
                200.0,
                15.0,
                99.5,
            ),
            (
                DeviceKind::Disk,
                ServiceTier::NonCritical,
                Duration::from_millis(100),
                50.0,
                40.0,
                98.0,
            ),
            (
                DeviceKind::Network,
                ServiceTier::Critical,
                Duration::from_millis(10),
                1000.0,
                5.0,
                99.9,
            ),
            (
                DeviceKind::Network,
                ServiceTier::NonCritical,
                Duration::from_millis(50),
                100.0,
                20.0,
                99.0,
            ),
        ];

        for (kind, tier, max_latency, min_throughput, max_loss, min_avail) in defaults {
            self.configs.insert(
                (kind, tier),
                SloConfig {
                    tier,
                    max_latency,
                    min_throughput,
                    max_throughput_loss: max_loss,
                    min_availability: min_avail,
                },
            );
        }
    }

    /// Replace the SLO for a (kind, tier) pairing.
    pub fn set_config(&mut self, kind: DeviceKind, config: SloConfig) {
        self.configs.insert((kind, config.tier), config);
    }

    /// The SLO bound to a (kind, tier) pairing.
    pub fn config(&self, kind: DeviceKind, tier: ServiceTier) -> Option<&SloConfig> {
        self.configs.get(&(kind, tier))
    }

    /// Validate SLIs for a device against its tier's SLO.
    pub fn validate(&self, tier: ServiceTier, metrics: &SliMetrics) -> SloValidation {
        let config = match self.config(metrics.kind, tier) {
            Some(config) => config,
            None => {
                return SloValidation {
                    kind: metrics.kind,
                    device_id: metrics.device_id.clone(),
                    tier,
                    status: HealthStatus::Healthy,
                    violations: Vec::new(),
                    confidence: 0.5,
                    recommendation: "no SLO configured for this tier".to_string(),
                }
            }
        };

        let mut violations = Vec::new();
        if metrics.latency > config.max_latency {
            violations.push("latency".to_string());
        }
        if metrics.throughput < config.min_throughput {
            violations.push("throughput".to_string());
        }
        if metrics.throughput_loss > config.max_throughput_loss {
            violations.push("throughput-loss".to_string());
        }
        let availability_breached = metrics.availability < config.min_availability;
        if availability_breached {
            violations.push("availability".to_string());
        }

        let (status, confidence, recommendation) = if violations.is_empty() {
            (
                HealthStatus::Healthy,
                1.0,
                "service level objectives met".to_string(),
            )
        } else if availability_breached {
            (
                HealthStatus::Failed,
                0.95,
                "availability below objective; escalate immediately".to_string(),
            )
        } else {
            (
                HealthStatus::SubHealthy,
                0.90,
                format!("service level degraded: {}", violations.join(", ")),
            )
        };

        SloValidation {
            kind: metrics.kind,
            device_id: metrics.device_id.clone(),
            tier,
            status,
            violations,
            confidence,
            recommendation,
        }
    }
}

impl Default for SloValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(latency_ms: u64, throughput: f64, loss: f64, availability: f64) -> SliMetrics {
        SliMetrics {
            kind: DeviceKind::Raid,
            device_id: "raid-0".into(),
            latency: Duration::from_millis(latency_ms),
            throughput,
            throughput_loss: loss,
            availability,
            ts: Utc::now(),
        }
    }

    #[test]
    fn test_defaults_cover_all_pairs() {
        let validator = SloValidator::new();
        for kind in [DeviceKind::Raid, DeviceKind::Disk, DeviceKind::Network] {
            for tier in [ServiceTier::Critical, ServiceTier::NonCritical] {
                assert!(validator.config(kind, tier).is_some());
            }
        }
    }

    #[test]
    fn test_meeting_objectives_is_healthy() {
        let validator = SloValidator::new();
        let result = validator.validate(ServiceTier::Critical, &metrics(10, 800.0, 2.0, 99.95));
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.violations.is_empty());
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_latency_breach_is_subhealthy() {
        let validator = SloValidator::new();
        let result = validator.validate(ServiceTier::Critical, &metrics(80, 800.0, 2.0, 99.95));
        assert_eq!(result.status, HealthStatus::SubHealthy);
        assert_eq!(result.violations, vec!["latency"]);
    }

    #[test]
    fn test_availability_breach_is_failed() {
        let validator = SloValidator::new();
        let result = validator.validate(ServiceTier::Critical, &metrics(10, 800.0, 2.0, 98.0));
        assert_eq!(result.status, HealthStatus::Failed);
        assert!(result.violations.contains(&"availability".to_string()));
    }

    #[test]
    fn test_non_critical_tier_is_looser() {
        let validator = SloValidator::new();
        // 80ms latency breaches critical but not non-critical RAID SLO.
        let result = validator.validate(
            ServiceTier::NonCritical,
            &metrics(80, 150.0, 2.0, 99.5),
        );
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_multiple_violations_listed() {
        let validator = SloValidator::new();
        let result = validator.validate(ServiceTier::Critical, &metrics(80, 100.0, 20.0, 99.95));
        assert_eq!(result.violations, vec!["latency", "throughput", "throughput-loss"]);
        assert_eq!(result.status, HealthStatus::SubHealthy);
    }
}
