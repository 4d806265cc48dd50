//! Configuration module for IOShelfer.

use crate::error::{IoShelferError, Result};
use crate::types::DeviceKind;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Main configuration for an IOShelfer node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IoShelferConfig {
    /// Detection pipeline configuration.
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Failure prediction configuration.
    #[serde(default)]
    pub prediction: PredictionConfig,
    /// Remediation engine configuration.
    #[serde(default)]
    pub remediation: RemediationConfig,
    /// History store configuration.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl IoShelferConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IoShelferError::Config(format!("failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| IoShelferError::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration. Invalid configuration is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.detection.interval.is_zero() {
            return Err(IoShelferError::InvalidConfig {
                field: "detection.interval".to_string(),
                reason: "interval must be non-zero".to_string(),
            });
        }

        if self.detection.per_device_deadline.is_zero() {
            return Err(IoShelferError::InvalidConfig {
                field: "detection.per_device_deadline".to_string(),
                reason: "deadline must be non-zero".to_string(),
            });
        }

        if self.detection.worker_cap == 0 {
            return Err(IoShelferError::InvalidConfig {
                field: "detection.worker_cap".to_string(),
                reason: "worker cap must be non-zero".to_string(),
            });
        }

        if self.prediction.cadence_ticks == 0 {
            return Err(IoShelferError::InvalidConfig {
                field: "prediction.cadence_ticks".to_string(),
                reason: "cadence must be at least one tick".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.remediation.preserve_paths_ratio) {
            return Err(IoShelferError::InvalidConfig {
                field: "remediation.preserve_paths_ratio".to_string(),
                reason: "ratio must be within [0, 1]".to_string(),
            });
        }

        self.prediction.weights.validate()?;

        Ok(())
    }

    /// Create a minimal development configuration with fast cadences and
    /// in-memory history.
    pub fn development() -> Self {
        Self {
            detection: DetectionConfig {
                interval: Duration::from_secs(1),
                per_device_deadline: Duration::from_millis(500),
                worker_cap: 4,
                thresholds: Thresholds::default(),
            },
            prediction: PredictionConfig {
                horizon: Duration::from_secs(3600),
                history_window: Duration::from_secs(3600),
                cadence_ticks: 2,
                weights: PredictionWeights::default(),
            },
            remediation: RemediationConfig::default(),
            history: HistoryConfig {
                retention: Duration::from_secs(24 * 3600),
                backend: HistoryBackend::Memory,
                data_dir: None,
            },
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Detection pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Interval between ticks for each device.
    #[serde(with = "duration_serde")]
    pub interval: Duration,
    /// Deadline for a single tick; overruns cancel the tick.
    #[serde(with = "duration_serde")]
    pub per_device_deadline: Duration,
    /// Maximum concurrent in-flight ticks across all devices.
    pub worker_cap: usize,
    /// Rule thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            per_device_deadline: Duration::from_secs(2),
            worker_cap: 8,
            thresholds: Thresholds::default(),
        }
    }
}

/// Rule thresholds for the detector. All of these are crossed, not merely
/// reached, unless the rule table says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// RAID: queue depth at or above which sub-health is flagged.
    pub queue_depth: u32,
    /// RAID: average latency above which sub-health is flagged.
    #[serde(with = "duration_serde")]
    pub avg_latency: Duration,
    /// RAID: error retries per hour above which the controller is failed.
    pub error_retry_rate: u32,
    /// RAID: expected firmware version; mismatch flags sub-health.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_firmware: Option<String>,
    /// Disk: IOPS variance above which sub-health is flagged.
    pub iops_variance: f64,
    /// Disk: temperature in Celsius above which sub-health is flagged.
    pub temperature_c: i32,
    /// Network: packet loss rate above which sub-health is flagged.
    pub packet_loss: f64,
    /// Network: p95 latency above which sub-health is flagged.
    #[serde(with = "duration_serde")]
    pub latency_p95: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            queue_depth: 128,
            avg_latency: Duration::from_millis(20),
            error_retry_rate: 100,
            expected_firmware: None,
            iops_variance: 100.0,
            temperature_c: 65,
            packet_loss: 0.01,
            latency_p95: Duration::from_millis(200),
        }
    }
}

/// Failure prediction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    /// Projection horizon for forecasts.
    #[serde(with = "duration_serde")]
    pub horizon: Duration,
    /// History window fed to the forecaster.
    #[serde(with = "duration_serde")]
    pub history_window: Duration,
    /// Forecast every N detection ticks.
    pub cadence_ticks: u64,
    /// Per-kind indicator weights.
    #[serde(default)]
    pub weights: PredictionWeights,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::from_secs(24 * 3600),
            history_window: Duration::from_secs(24 * 3600),
            cadence_ticks: 10,
            weights: PredictionWeights::default(),
        }
    }
}

/// Indicator weights per device kind. Each kind's weights must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionWeights {
    pub disk: DiskWeights,
    pub raid: RaidWeights,
    pub network: NetworkWeights,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskWeights {
    pub reallocated_sectors: f64,
    pub read_error_rate: f64,
    pub pending_sectors: f64,
    pub iops_variance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaidWeights {
    pub queue_depth: f64,
    pub avg_latency: f64,
    pub error_retry_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub latency_p95: f64,
    pub packet_loss: f64,
}

impl Default for PredictionWeights {
    fn default() -> Self {
        Self {
            disk: DiskWeights {
                reallocated_sectors: 0.55,
                read_error_rate: 0.25,
                pending_sectors: 0.10,
                iops_variance: 0.10,
            },
            raid: RaidWeights {
                queue_depth: 0.40,
                avg_latency: 0.30,
                error_retry_rate: 0.30,
            },
            network: NetworkWeights {
                latency_p95: 0.50,
                packet_loss: 0.50,
            },
        }
    }
}

impl PredictionWeights {
    /// Each kind's weights must sum to 1 (within rounding error).
    pub fn validate(&self) -> Result<()> {
        let check = |kind: DeviceKind, sum: f64| -> Result<()> {
            if (sum - 1.0).abs() > 1e-6 {
                return Err(IoShelferError::InvalidConfig {
                    field: format!("prediction.weights.{}", kind),
                    reason: format!("weights must sum to 1.0, got {}", sum),
                });
            }
            Ok(())
        };

        check(
            DeviceKind::Disk,
            self.disk.reallocated_sectors
                + self.disk.read_error_rate
                + self.disk.pending_sectors
                + self.disk.iops_variance,
        )?;
        check(
            DeviceKind::Raid,
            self.raid.queue_depth + self.raid.avg_latency + self.raid.error_retry_rate,
        )?;
        check(
            DeviceKind::Network,
            self.network.latency_p95 + self.network.packet_loss,
        )?;
        Ok(())
    }
}

/// Remediation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Global kill-switch for automatic isolation.
    pub auto_isolation: bool,
    /// Floor on non-isolated siblings after any isolation.
    pub min_healthy_paths: usize,
    /// Fraction of the sibling population that must stay non-isolated.
    pub preserve_paths_ratio: f64,
    /// Consecutive SubHealthy ticks before temporary isolation is proposed.
    pub subhealth_ticks_before_isolate: u32,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            auto_isolation: true,
            min_healthy_paths: 1,
            preserve_paths_ratio: 0.5,
            subhealth_ticks_before_isolate: 3,
        }
    }
}

/// History store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// In-memory ring per device.
    Memory,
    /// JSON-lines log per device under `data_dir`.
    File,
}

/// History store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Entries older than now - retention are eligible for eviction.
    #[serde(with = "duration_serde")]
    pub retention: Duration,
    /// Backend selection.
    pub backend: HistoryBackend,
    /// Base directory for the file backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<std::path::PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 3600),
            backend: HistoryBackend::Memory,
            data_dir: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics and the snapshot HTTP surface.
    pub metrics_enabled: bool,
    /// Metrics bind address.
    pub metrics_addr: SocketAddr,
    /// Log level.
    pub log_level: String,
    /// Enable JSON logging.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_addr: "0.0.0.0:9690".parse().expect("valid socket address"),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Serde helper for Duration using short human-readable strings.
pub mod duration_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        } else if let Some(h) = s.strip_suffix('h') {
            h.parse::<u64>()
                .map(|v| Duration::from_secs(v * 3600))
                .map_err(|e| e.to_string())
        } else if let Some(m) = s.strip_suffix('m') {
            m.parse::<u64>()
                .map(|v| Duration::from_secs(v * 60))
                .map_err(|e| e.to_string())
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| e.to_string())
        } else {
            s.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| e.to_string())
        }
    }

}
