//! Trend-based failure forecasting.
//!
//! The forecaster is a bounded, deterministic model over a device's history
//! window: no external ML dependency, and the same window always yields the
//! same forecast. It runs on a slower cadence than detection to amortize the
//! window scan.
//!
//! Per axis, the newest third of the window is compared against the oldest
//! third to derive a trend, the newest-third mean is normalized against the
//! axis's critical-rule threshold, and an increasing trend escalates the
//! normalized indicator. The failure probability is the clipped weighted sum
//! of the per-axis indicators; weights are configuration and sum to 1 per
//! device kind.

use crate::config::{PredictionConfig, Thresholds};
use crate::history::HistoryEntry;
use crate::types::{
    DeviceKind, Forecast, RiskLevel, SampleMetrics, TrendDirection, TrendSet,
};

/// Minimum entries required for a non-trivial forecast.
const MIN_ENTRIES: usize = 3;

/// Contribution floor for an axis to appear in `contributing_factors`.
const FACTOR_FLOOR: f64 = 0.2;

/// One normalized indicator feeding the weighted sum.
#[derive(Debug, Clone, Copy)]
struct AxisIndicator {
    name: &'static str,
    indicator: f64,
    weight: f64,
}

/// Derive a forecast from a device's history window.
///
/// Fewer than three entries is not an error: the result is a zero-probability
/// forecast with stable trends.
pub fn forecast(
    kind: DeviceKind,
    entries: &[HistoryEntry],
    prediction: &PredictionConfig,
    thresholds: &Thresholds,
) -> Forecast {
    if entries.len() < MIN_ENTRIES {
        return Forecast::low_data(prediction.horizon);
    }

    match kind {
        DeviceKind::Raid => forecast_raid(entries, prediction, thresholds),
        DeviceKind::Disk => forecast_disk(entries, prediction, thresholds),
        DeviceKind::Network => forecast_network(entries, prediction, thresholds),
    }
}

fn forecast_raid(
    entries: &[HistoryEntry],
    prediction: &PredictionConfig,
    t: &Thresholds,
) -> Forecast {
    let queue = series(entries, |m| match m {
        SampleMetrics::Raid(r) => Some(r.queue_depth as f64),
        _ => None,
    });
    let latency = series(entries, |m| match m {
        SampleMetrics::Raid(r) => Some(r.avg_latency.as_secs_f64() * 1000.0),
        _ => None,
    });
    let retries = series(entries, |m| match m {
        SampleMetrics::Raid(r) => Some(r.error_retry_rate as f64),
        _ => None,
    });

    let trend = TrendSet {
        latency: trend_of(&latency),
        iops: trend_of(&queue),
        errors: trend_of(&retries),
    };

    let w = &prediction.weights.raid;
    let latency_thr_ms = t.avg_latency.as_secs_f64() * 1000.0;
    let mut indicators = vec![
        axis("queue_depth", &queue, t.queue_depth as f64, w.queue_depth),
        axis("avg_latency", &latency, latency_thr_ms, w.avg_latency),
        axis(
            "error_retry_rate",
            &retries,
            t.error_retry_rate as f64,
            w.error_retry_rate,
        ),
    ];

    apply_variance_bump(&mut indicators, "queue_depth", &queue, t.queue_depth as f64);
    compose(indicators, trend, prediction)
}

fn forecast_disk(
    entries: &[HistoryEntry],
    prediction: &PredictionConfig,
    t: &Thresholds,
) -> Forecast {
    let reallocated = series(entries, |m| match m {
        SampleMetrics::Disk(d) => Some(d.smart.reallocated_sectors as f64),
        _ => None,
    });
    let read_errors = series(entries, |m| match m {
        SampleMetrics::Disk(d) => Some(d.smart.read_error_rate),
        _ => None,
    });
    let pending = series(entries, |m| match m {
        SampleMetrics::Disk(d) => Some(d.smart.pending_sectors as f64),
        _ => None,
    });
    let iops_var = series(entries, |m| match m {
        SampleMetrics::Disk(d) => Some(d.iops_variance),
        _ => None,
    });

    let trend = TrendSet {
        latency: TrendDirection::Stable,
        iops: trend_of(&iops_var),
        errors: trend_of(&reallocated),
    };

    let w = &prediction.weights.disk;
    let mut indicators = vec![
        axis(
            "reallocated_sectors",
            &reallocated,
            100.0,
            w.reallocated_sectors,
        ),
        axis("read_error_rate", &read_errors, 0.001, w.read_error_rate),
        axis("pending_sectors", &pending, 100.0, w.pending_sectors),
        axis("iops_variance", &iops_var, t.iops_variance, w.iops_variance),
    ];

    apply_variance_bump(&mut indicators, "reallocated_sectors", &reallocated, 100.0);
    compose(indicators, trend, prediction)
}

fn forecast_network(
    entries: &[HistoryEntry],
    prediction: &PredictionConfig,
    t: &Thresholds,
) -> Forecast {
    let latency = series(entries, |m| match m {
        SampleMetrics::Network(n) => Some(n.latency_p95.as_secs_f64() * 1000.0),
        _ => None,
    });
    let loss = series(entries, |m| match m {
        SampleMetrics::Network(n) => Some(n.packet_loss_rate),
        _ => None,
    });
    let throughput = series(entries, |m| match m {
        SampleMetrics::Network(n) => Some(n.bytes_per_second as f64),
        _ => None,
    });

    let trend = TrendSet {
        latency: trend_of(&latency),
        iops: trend_of(&throughput),
        errors: trend_of(&loss),
    };

    let w = &prediction.weights.network;
    let latency_thr_ms = t.latency_p95.as_secs_f64() * 1000.0;
    let mut indicators = vec![
        axis("latency_p95", &latency, latency_thr_ms, w.latency_p95),
        axis("packet_loss", &loss, t.packet_loss, w.packet_loss),
    ];

    apply_variance_bump(&mut indicators, "latency_p95", &latency, latency_thr_ms);
    compose(indicators, trend, prediction)
}

/// Extract a per-axis time series, in window order.
fn series<F>(entries: &[HistoryEntry], extract: F) -> Vec<f64>
where
    F: Fn(&SampleMetrics) -> Option<f64>,
{
    entries
        .iter()
        .filter_map(|e| extract(&e.sample.metrics))
        .collect()
}

/// Compare the mean of the oldest third against the newest third.
fn trend_of(series: &[f64]) -> TrendDirection {
    let n = series.len();
    if n < MIN_ENTRIES {
        return TrendDirection::Stable;
    }

    let third = (n / 3).max(1);
    let oldest = mean(&series[..third]);
    let newest = mean(&series[n - third..]);

    if newest > 1.5 * oldest && newest > 0.0 {
        TrendDirection::Increasing
    } else if newest < 0.5 * oldest {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Build one axis indicator: the newest-third mean normalized against the
/// critical threshold, escalated or damped by its own trend.
fn axis(name: &'static str, series: &[f64], critical: f64, weight: f64) -> AxisIndicator {
    let n = series.len();
    let third = (n / 3).max(1);
    let level = if n == 0 || critical <= 0.0 {
        0.0
    } else {
        (mean(&series[n - third..]) / critical).clamp(0.0, 1.0)
    };

    let indicator = match trend_of(series) {
        TrendDirection::Increasing => (level * 2.0).clamp(0.0, 1.0),
        TrendDirection::Stable => level,
        TrendDirection::Decreasing => level * 0.5,
    };

    AxisIndicator {
        name,
        indicator,
        weight,
    }
}

/// An unstable primary axis (spread above half the critical threshold) bumps
/// its indicator slightly: erratic behavior near the limit is itself a
/// sub-health signal.
fn apply_variance_bump(
    indicators: &mut [AxisIndicator],
    primary: &'static str,
    series: &[f64],
    critical: f64,
) {
    if critical <= 0.0 {
        return;
    }
    let std_dev = variance(series).sqrt();
    if std_dev > 0.5 * critical {
        if let Some(ind) = indicators.iter_mut().find(|i| i.name == primary) {
            ind.indicator = (ind.indicator + 0.1).clamp(0.0, 1.0);
        }
    }
}

fn compose(
    indicators: Vec<AxisIndicator>,
    trend: TrendSet,
    prediction: &PredictionConfig,
) -> Forecast {
    let probability = indicators
        .iter()
        .map(|i| i.weight * i.indicator)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    let mut contributions: Vec<(&'static str, f64)> = indicators
        .iter()
        .map(|i| (i.name, i.weight * i.indicator))
        .filter(|(_, c)| *c >= FACTOR_FLOOR)
        .collect();
    contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Forecast {
        failure_probability: probability,
        risk_level: RiskLevel::from_probability(probability),
        horizon: prediction.horizon,
        contributing_factors: contributions.iter().map(|(n, _)| n.to_string()).collect(),
        trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiskSample, NetworkSample, RaidSample, Sample, SmartAttrs};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn prediction() -> PredictionConfig {
        PredictionConfig::default()
    }

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    fn disk_entries(reallocated: &[u32]) -> Vec<HistoryEntry> {
        let base = Utc::now() - ChronoDuration::hours(1);
        reallocated
            .iter()
            .enumerate()
            .map(|(i, &r)| {
                let ts = base + ChronoDuration::seconds(i as i64 * 60);
                HistoryEntry {
                    ts,
                    sample: Sample::disk(
                        ts,
                        DiskSample {
                            smart: SmartAttrs {
                                reallocated_sectors: r,
                                read_error_rate: 0.0,
                                pending_sectors: 0,
                                device_model: "TST".into(),
                                serial: "S".into(),
                            },
                            iops_variance: 0.0,
                            temperature_c: 40,
                            power_on_hours: 100,
                        },
                    ),
                    health: None,
                }
            })
            .collect()
    }

    fn raid_entries(queues: &[u32]) -> Vec<HistoryEntry> {
        let base = Utc::now() - ChronoDuration::hours(1);
        queues
            .iter()
            .enumerate()
            .map(|(i, &q)| {
                let ts = base + ChronoDuration::seconds(i as i64 * 60);
                HistoryEntry {
                    ts,
                    sample: Sample::raid(
                        ts,
                        RaidSample {
                            queue_depth: q,
                            avg_latency: Duration::from_millis(2),
                            error_retry_rate: 0,
                            firmware_version: "2.3.1".into(),
                        },
                    ),
                    health: None,
                }
            })
            .collect()
    }

    #[test]
    fn test_low_data_forecast() {
        for count in 0..3 {
            let entries = disk_entries(&vec![5; count]);
            let f = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());
            assert_eq!(f.failure_probability, 0.0);
            assert_eq!(f.risk_level, RiskLevel::Low);
            assert_eq!(f.trend, TrendSet::stable());
            assert!(f.contributing_factors.is_empty());
        }
    }

    #[test]
    fn test_disk_reallocated_growth_scenario() {
        // Window of 9 samples with reallocated = 1,1,1,10,10,10,50,50,50.
        let entries = disk_entries(&[1, 1, 1, 10, 10, 10, 50, 50, 50]);
        let f = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());

        assert_eq!(f.trend.errors, TrendDirection::Increasing);
        assert!(f.failure_probability > 0.5, "got {}", f.failure_probability);
        assert!(matches!(f.risk_level, RiskLevel::Medium | RiskLevel::High));
        assert!(f
            .contributing_factors
            .contains(&"reallocated_sectors".to_string()));
    }

    #[test]
    fn test_flat_series_is_stable_and_low() {
        let entries = disk_entries(&[2, 2, 2, 2, 2, 2]);
        let f = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());
        assert_eq!(f.trend.errors, TrendDirection::Stable);
        assert!(f.failure_probability < 0.3);
        assert_eq!(f.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_decreasing_series() {
        let entries = disk_entries(&[60, 60, 60, 30, 30, 30, 5, 5, 5]);
        let f = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());
        assert_eq!(f.trend.errors, TrendDirection::Decreasing);
    }

    #[test]
    fn test_raid_queue_trend() {
        let entries = raid_entries(&[8, 8, 8, 64, 64, 64, 200, 200, 200]);
        let f = forecast(DeviceKind::Raid, &entries, &prediction(), &thresholds());
        assert_eq!(f.trend.iops, TrendDirection::Increasing);
        assert!(f.failure_probability > 0.3);
        assert!(f.contributing_factors.contains(&"queue_depth".to_string()));
    }

    #[test]
    fn test_forecast_is_pure() {
        let entries = disk_entries(&[1, 1, 1, 10, 10, 10, 50, 50, 50]);
        let a = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());
        let b = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());
        assert_eq!(a, b);
    }

    #[test]
    fn test_probability_bounds() {
        // Saturated window: every indicator pinned at its maximum.
        let entries = disk_entries(&[10_000; 9]);
        let f = forecast(DeviceKind::Disk, &entries, &prediction(), &thresholds());
        assert!(f.failure_probability <= 1.0);
        assert!(f.failure_probability >= 0.0);
    }

    #[test]
    fn test_network_loss_trend() {
        let base = Utc::now() - ChronoDuration::hours(1);
        let entries: Vec<HistoryEntry> = (0..9)
            .map(|i| {
                let ts = base + ChronoDuration::seconds(i * 60);
                let loss = if i < 6 { 0.0 } else { 0.02 };
                HistoryEntry {
                    ts,
                    sample: Sample::network(
                        ts,
                        NetworkSample {
                            latency_p95: Duration::from_millis(2),
                            packet_loss_rate: loss,
                            bytes_per_second: 1_000_000,
                        },
                    ),
                    health: None,
                }
            })
            .collect();

        let f = forecast(DeviceKind::Network, &entries, &prediction(), &thresholds());
        assert_eq!(f.trend.errors, TrendDirection::Increasing);
        assert!(f.contributing_factors.contains(&"packet_loss".to_string()));
    }
}
