//! Network interface metric adapter.

use super::MetricSource;
use crate::error::{IoShelferError, Result};
use crate::probe::ProbeHub;
use crate::types::{DeviceKind, NetworkSample, Sample};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::trace;

/// Pulls network interface telemetry from the probe hub.
pub struct NetworkAdapter {
    hub: Arc<ProbeHub>,
}

impl NetworkAdapter {
    pub fn new(hub: Arc<ProbeHub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl MetricSource for NetworkAdapter {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Network
    }

    async fn sample(&self, device_id: &str) -> Result<Sample> {
        let reading = match self.hub.latest_network(device_id) {
            None => {
                return Err(IoShelferError::UnknownDevice(format!(
                    "interface {} is not registered",
                    device_id
                )))
            }
            Some(None) => {
                return Err(IoShelferError::AdapterTransient(format!(
                    "no probe data yet for interface {}",
                    device_id
                )))
            }
            Some(Some(r)) => r,
        };

        let packet_loss_rate = if reading.packets_sent == 0 {
            0.0
        } else {
            reading.packets_lost as f64 / reading.packets_sent as f64
        };

        trace!(
            device_id,
            packet_loss_rate,
            latency_p95_us = reading.latency_p95.as_micros() as u64,
            "sampled interface"
        );

        Ok(Sample::network(
            Utc::now(),
            NetworkSample {
                latency_p95: reading.latency_p95,
                packet_loss_rate,
                bytes_per_second: reading.bytes_per_second,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::NetProbeReading;
    use std::time::Duration;

    #[tokio::test]
    async fn test_loss_rate_derivation() {
        let hub = ProbeHub::new();
        hub.register_network("eth0");
        hub.push_network(
            "eth0",
            NetProbeReading {
                latency_p95: Duration::from_millis(2),
                packets_sent: 1000,
                packets_lost: 25,
                bytes_per_second: 1_000_000,
            },
        );
        let adapter = NetworkAdapter::new(hub);

        let sample = adapter.sample("eth0").await.unwrap();
        match sample.metrics {
            crate::types::SampleMetrics::Network(net) => {
                assert!((net.packet_loss_rate - 0.025).abs() < 1e-9);
            }
            other => panic!("expected network metrics, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_zero_packets_means_zero_loss() {
        let hub = ProbeHub::new();
        hub.register_network("eth1");
        hub.push_network(
            "eth1",
            NetProbeReading {
                latency_p95: Duration::from_millis(1),
                packets_sent: 0,
                packets_lost: 0,
                bytes_per_second: 0,
            },
        );
        let adapter = NetworkAdapter::new(hub);

        let sample = adapter.sample("eth1").await.unwrap();
        match sample.metrics {
            crate::types::SampleMetrics::Network(net) => {
                assert_eq!(net.packet_loss_rate, 0.0)
            }
            other => panic!("expected network metrics, got {:?}", other),
        }
    }
}
