//! Sub-health detection rules.
//!
//! [`classify`] is a pure function from one sample to one verdict: identical
//! input yields identical output, with no side effects, so it is safe to
//! invoke in tests with literal samples.
//!
//! Rules are additive. Each triggered rule may escalate the status, lower
//! the confidence, append an issue, and offer a recommendation. The final
//! status is the maximum over rule outcomes, the confidence the minimum over
//! triggered rules (1.0 when nothing triggered), and the issues are sorted
//! by decreasing severity with ties broken by a stable rule priority. The
//! recommendation comes from the highest-severity rule.

use crate::config::Thresholds;
use crate::error::{IoShelferError, Result};
use crate::types::{
    DiskSample, HealthStatus, HealthVerdict, NetworkSample, RaidSample, Sample, SampleMetrics,
    SmartAttrs,
};

/// A triggered rule outcome.
#[derive(Debug, Clone, Copy)]
struct RuleHit {
    /// Short stable rule name, surfaced as an issue string.
    name: &'static str,
    status: HealthStatus,
    confidence: f64,
    recommendation: &'static str,
    /// Tie-break within a status band; lower wins.
    priority: u8,
}

/// Classify a single sample against the configured thresholds.
pub fn classify(sample: &Sample, thresholds: &Thresholds) -> HealthVerdict {
    let hits = match &sample.metrics {
        SampleMetrics::Raid(raid) => raid_rules(raid, thresholds),
        SampleMetrics::Disk(disk) => disk_rules(disk, thresholds),
        SampleMetrics::Network(net) => network_rules(net, thresholds),
    };

    compose(hits)
}

fn raid_rules(raid: &RaidSample, t: &Thresholds) -> Vec<RuleHit> {
    let mut hits = Vec::new();

    if raid.error_retry_rate > t.error_retry_rate {
        hits.push(RuleHit {
            name: "retries",
            status: HealthStatus::Failed,
            confidence: 0.99,
            recommendation: "immediate isolation and replacement",
            priority: 0,
        });
    }

    if raid.queue_depth >= t.queue_depth {
        hits.push(RuleHit {
            name: "queue",
            status: HealthStatus::SubHealthy,
            confidence: 0.95,
            recommendation: "temporary isolation recommended",
            priority: 1,
        });
    }

    if raid.avg_latency > t.avg_latency {
        hits.push(RuleHit {
            name: "latency",
            status: HealthStatus::SubHealthy,
            confidence: 0.90,
            recommendation: "check firmware; isolate if persistent",
            priority: 2,
        });
    }

    if let Some(expected) = &t.expected_firmware {
        if &raid.firmware_version != expected {
            hits.push(RuleHit {
                name: "firmware",
                status: HealthStatus::SubHealthy,
                confidence: 0.85,
                recommendation: "update firmware",
                priority: 3,
            });
        }
    }

    hits
}

fn disk_rules(disk: &DiskSample, t: &Thresholds) -> Vec<RuleHit> {
    let mut hits = Vec::new();
    let SmartAttrs {
        reallocated_sectors,
        read_error_rate,
        ..
    } = disk.smart;

    if reallocated_sectors > 100 {
        hits.push(RuleHit {
            name: "reallocated-critical",
            status: HealthStatus::Failed,
            confidence: 0.99,
            recommendation: "immediate isolation and replacement",
            priority: 0,
        });
    } else if reallocated_sectors > 10 {
        hits.push(RuleHit {
            name: "reallocated-warn",
            status: HealthStatus::SubHealthy,
            confidence: 0.95,
            recommendation: "schedule disk replacement",
            priority: 1,
        });
    }

    if read_error_rate > 0.001 {
        hits.push(RuleHit {
            name: "read-error-critical",
            status: HealthStatus::Failed,
            confidence: 0.99,
            recommendation: "immediate isolation and replacement",
            priority: 2,
        });
    } else if read_error_rate > 0.0001 {
        hits.push(RuleHit {
            name: "read-error-warn",
            status: HealthStatus::SubHealthy,
            confidence: 0.92,
            recommendation: "monitor read errors closely",
            priority: 3,
        });
    }

    if disk.temperature_c > t.temperature_c {
        hits.push(RuleHit {
            name: "temperature",
            status: HealthStatus::SubHealthy,
            confidence: 0.90,
            recommendation: "check cooling and airflow",
            priority: 4,
        });
    }

    if disk.iops_variance > t.iops_variance {
        hits.push(RuleHit {
            name: "iops-variance",
            status: HealthStatus::SubHealthy,
            confidence: 0.92,
            recommendation: "monitor disk performance closely",
            priority: 5,
        });
    }

    hits
}

fn network_rules(net: &NetworkSample, t: &Thresholds) -> Vec<RuleHit> {
    let mut hits = Vec::new();

    if net.packet_loss_rate > t.packet_loss {
        hits.push(RuleHit {
            name: "packet-loss",
            status: HealthStatus::SubHealthy,
            confidence: 0.93,
            recommendation: "check network interface and routing",
            priority: 0,
        });
    }

    if net.latency_p95 > t.latency_p95 {
        hits.push(RuleHit {
            name: "latency-p95",
            status: HealthStatus::SubHealthy,
            confidence: 0.90,
            recommendation: "investigate network congestion",
            priority: 1,
        });
    }

    hits
}

fn compose(mut hits: Vec<RuleHit>) -> HealthVerdict {
    if hits.is_empty() {
        return HealthVerdict::healthy();
    }

    // Severity descending, stable priority within a band.
    hits.sort_by(|a, b| b.status.cmp(&a.status).then(a.priority.cmp(&b.priority)));

    let status = hits[0].status;
    let confidence = hits
        .iter()
        .map(|h| h.confidence)
        .fold(1.0f64, |acc, c| acc.min(c));
    let recommendation = hits[0].recommendation.to_string();
    let issues = hits.iter().map(|h| h.name.to_string()).collect();

    HealthVerdict {
        status,
        confidence,
        issues,
        recommendation,
    }
}

/// Validate a verdict against the classifier invariants.
pub fn validate_verdict(verdict: &HealthVerdict) -> Result<()> {
    if !(verdict.confidence > 0.0 && verdict.confidence <= 1.0) {
        return Err(IoShelferError::ClassifierInvariant(format!(
            "confidence {} outside (0, 1]",
            verdict.confidence
        )));
    }
    if verdict.status == HealthStatus::Healthy && !verdict.issues.is_empty() {
        return Err(IoShelferError::ClassifierInvariant(
            "healthy verdict carries issues".to_string(),
        ));
    }
    Ok(())
}

/// Startup self-check: classify a spread of representative samples and
/// verify the invariants hold. A failure here is fatal.
pub fn self_check(thresholds: &Thresholds) -> Result<()> {
    use chrono::Utc;
    use std::time::Duration;

    let samples = [
        Sample::raid(
            Utc::now(),
            RaidSample {
                queue_depth: thresholds.queue_depth.saturating_mul(2),
                avg_latency: thresholds.avg_latency * 2,
                error_retry_rate: thresholds.error_retry_rate + 1,
                firmware_version: "0.0.0".into(),
            },
        ),
        Sample::disk(
            Utc::now(),
            DiskSample {
                smart: SmartAttrs {
                    reallocated_sectors: 150,
                    read_error_rate: 0.01,
                    pending_sectors: 5,
                    device_model: "CHECK".into(),
                    serial: "CHECK".into(),
                },
                iops_variance: 0.0,
                temperature_c: 40,
                power_on_hours: 1,
            },
        ),
        Sample::network(
            Utc::now(),
            NetworkSample {
                latency_p95: Duration::from_millis(1),
                packet_loss_rate: 0.0,
                bytes_per_second: 1,
            },
        ),
    ];

    for sample in &samples {
        validate_verdict(&classify(sample, thresholds))?;
    }
    Ok(())
}
