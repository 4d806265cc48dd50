//! Observability for IOShelfer.
//!
//! Provides logging initialization, the Prometheus gauge surface, and the
//! metrics HTTP server. Gauge names and label sets are stable; no labels
//! beyond the documented ones are ever attached, keeping cardinality
//! bounded.

use crate::api;
use crate::config::ObservabilityConfig;
use crate::error::{IoShelferError, Result};
use crate::scheduler::Pipeline;
use crate::types::{Forecast, Sample, SampleMetrics};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Probability at or above which a disk is reported as predicted to fail.
const PREDICTED_FAILURE_THRESHOLD: f64 = 0.5;

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| IoShelferError::Internal(format!("failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| IoShelferError::Internal(format!("failed to init logging: {}", e)))?;
    }

    info!("observability initialized");
    Ok(())
}

/// Run the metrics and snapshot HTTP server.
pub async fn run_metrics_server(
    config: ObservabilityConfig,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    let builder = PrometheusBuilder::new();
    let handle = builder.install_recorder().map_err(|e| {
        IoShelferError::Internal(format!("failed to install metrics recorder: {}", e))
    })?;

    let app = api::router(pipeline, handle);

    let listener = TcpListener::bind(config.metrics_addr).await?;
    info!(addr = %config.metrics_addr, "metrics server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| IoShelferError::Internal(e.to_string()))?;

    Ok(())
}

/// Update the per-device gauges for a freshly pulled sample.
pub fn record_sample(device_id: &str, sample: &Sample) {
    match &sample.metrics {
        SampleMetrics::Raid(raid) => {
            let controller = device_id.to_string();
            gauge!("ioshelfer_raid_queue_depth", "controller_id" => controller.clone())
                .set(raid.queue_depth as f64);
            gauge!("ioshelfer_raid_avg_latency_ms", "controller_id" => controller.clone())
                .set(raid.avg_latency.as_secs_f64() * 1000.0);
            gauge!("ioshelfer_raid_error_retry_rate", "controller_id" => controller)
                .set(raid.error_retry_rate as f64);
        }
        SampleMetrics::Disk(disk) => {
            let device = device_id.to_string();
            let model = disk.smart.device_model.clone();
            gauge!(
                "ioshelfer_disk_reallocated_sectors",
                "device_id" => device.clone(),
                "model" => model.clone()
            )
            .set(disk.smart.reallocated_sectors as f64);
            gauge!(
                "ioshelfer_disk_read_error_rate",
                "device_id" => device.clone(),
                "model" => model.clone()
            )
            .set(disk.smart.read_error_rate);
            gauge!(
                "ioshelfer_disk_temperature_celsius",
                "device_id" => device.clone(),
                "model" => model.clone()
            )
            .set(disk.temperature_c as f64);
            gauge!(
                "ioshelfer_disk_iops_variance",
                "device_id" => device,
                "model" => model
            )
            .set(disk.iops_variance);
        }
        SampleMetrics::Network(net) => {
            gauge!(
                "ioshelfer_network_latency_p95_seconds",
                "interface" => device_id.to_string()
            )
            .set(net.latency_p95.as_secs_f64());
        }
    }
}

/// Update the prediction gauge for a device. Only disks expose the 0/1
/// predicted-failure gauge.
pub fn record_forecast(device_id: &str, sample: &Sample, forecast: &Forecast) {
    if let SampleMetrics::Disk(disk) = &sample.metrics {
        let predicted = if forecast.failure_probability >= PREDICTED_FAILURE_THRESHOLD {
            1.0
        } else {
            0.0
        };
        gauge!(
            "ioshelfer_disk_predicted_failure",
            "device_id" => device_id.to_string(),
            "model" => disk.smart.device_model.clone()
        )
        .set(predicted);
    }
}

/// Count a pipeline event by name.
pub fn record_event(event_name: &'static str) {
    counter!("ioshelfer_pipeline_events_total", "event" => event_name).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DiskSample, SmartAttrs, TrendSet, RiskLevel};
    use chrono::Utc;
    use std::time::Duration;

    fn disk_sample() -> Sample {
        Sample::disk(
            Utc::now(),
            DiskSample {
                smart: SmartAttrs {
                    reallocated_sectors: 3,
                    read_error_rate: 0.0,
                    pending_sectors: 0,
                    device_model: "TST".into(),
                    serial: "S".into(),
                },
                iops_variance: 1.0,
                temperature_c: 40,
                power_on_hours: 10,
            },
        )
    }

    #[test]
    fn test_record_sample_does_not_panic_without_recorder() {
        // The metrics facade no-ops when no recorder is installed.
        record_sample("sda", &disk_sample());
        record_event("tick-completed");
    }

    #[test]
    fn test_record_forecast_threshold() {
        let forecast = Forecast {
            failure_probability: 0.9,
            risk_level: RiskLevel::High,
            horizon: Duration::from_secs(3600),
            contributing_factors: vec!["reallocated_sectors".into()],
            trend: TrendSet::stable(),
        };
        record_forecast("sda", &disk_sample(), &forecast);
    }
}
