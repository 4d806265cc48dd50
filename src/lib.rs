//! IOShelfer - a node-resident I/O sub-health observer and self-healer.
//!
//! IOShelfer watches RAID controllers, block devices, and network interfaces
//! for degraded-but-not-failed states - elevated queue depth, latency tails,
//! SMART attribute drift, packet loss - and remediates them before they
//! become outright faults, without sacrificing service continuity.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        IOShelfer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Probe Layer: per-device rings drained from kernel probes   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Adapters: RAID │ Disk (SMART) │ Network                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline: History │ Detector │ Forecaster │ Remediation    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Surfaces: Prometheus gauges │ Snapshot API │ Event stream  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use ioshelfer::config::IoShelferConfig;
//! use ioshelfer::scheduler::DeviceSpec;
//! use ioshelfer::types::DeviceKind;
//!
//! #[tokio::main]
//! async fn main() -> ioshelfer::Result<()> {
//!     let config = IoShelferConfig::development();
//!     let devices = vec![DeviceSpec {
//!         id: "raid-0".into(),
//!         kind: DeviceKind::Raid,
//!         group: "storage".into(),
//!     }];
//!     ioshelfer::run(config, devices).await
//! }
//! ```

pub mod adapter;
pub mod api;
pub mod chaos;
pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod forecaster;
pub mod history;
pub mod observability;
pub mod probe;
pub mod remediation;
pub mod scheduler;
pub mod shutdown;
pub mod slo;
pub mod types;

// Re-exports
pub use error::{IoShelferError, Result};
pub use types::*;

use adapter::{DiskAdapter, NetworkAdapter, RaidAdapter};
use config::{HistoryBackend, IoShelferConfig};
use events::EventBus;
use history::{FileHistory, HistoryStore, MemoryHistory};
use probe::{ProbeHub, SimulatedProbe};
use remediation::LoggingActuator;
use scheduler::{DeviceSpec, Pipeline};
use shutdown::ShutdownCoordinator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Run the observer with the given configuration and device inventory.
///
/// This is the composition root: everything that is process-global - the
/// logger, the metrics recorder, the signal handler - is wired here and
/// injected into the components, which themselves hold no global state.
pub async fn run(config: IoShelferConfig, devices: Vec<DeviceSpec>) -> Result<()> {
    config.validate()?;
    detector::self_check(&config.detection.thresholds)?;

    observability::init(&config.observability)?;
    info!(devices = devices.len(), "starting ioshelfer");

    let coordinator = ShutdownCoordinator::new();
    let events = Arc::new(EventBus::new());

    let history: Arc<dyn HistoryStore> = match config.history.backend {
        HistoryBackend::Memory => Arc::new(MemoryHistory::new()),
        HistoryBackend::File => {
            let dir = config
                .history
                .data_dir
                .clone()
                .unwrap_or_else(|| "/var/lib/ioshelfer/history".into());
            Arc::new(FileHistory::new(dir)?)
        }
    };

    // Probe rings stand in for the kernel drain loop; the simulated feeder
    // below keeps them populated in deployments without real probes.
    let hub = ProbeHub::new();
    let mut raid_ids = Vec::new();
    let mut disk_ids = Vec::new();
    let mut network_ids = Vec::new();
    for device in &devices {
        match device.kind {
            DeviceKind::Raid => {
                hub.register_raid(&device.id);
                raid_ids.push(device.id.clone());
            }
            DeviceKind::Disk => {
                hub.register_disk(&device.id);
                disk_ids.push(device.id.clone());
            }
            DeviceKind::Network => {
                hub.register_network(&device.id);
                network_ids.push(device.id.clone());
            }
        }
    }

    let pipeline = Pipeline::new(
        config.clone(),
        history,
        Arc::new(LoggingActuator),
        events.clone(),
        coordinator.clone(),
    );
    pipeline.register_source(Arc::new(RaidAdapter::new(hub.clone())));
    pipeline.register_source(Arc::new(DiskAdapter::new(hub.clone())));
    pipeline.register_source(Arc::new(NetworkAdapter::new(hub.clone())));

    for device in devices {
        pipeline.add_device(device);
    }

    // Simulated probe feeder.
    {
        let hub = hub.clone();
        let coordinator = coordinator.clone();
        let cadence = config.detection.interval.min(Duration::from_secs(1));
        tokio::spawn(async move {
            let probe = SimulatedProbe::new(hub);
            let mut interval = tokio::time::interval(cadence);
            loop {
                tokio::select! {
                    _ = interval.tick() => probe.feed_once(&raid_ids, &disk_ids, &network_ids),
                    _ = coordinator.wait() => break,
                }
            }
        });
    }

    // Event log: every pipeline event is counted and traced.
    {
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                observability::record_event(event.name());
            }
        });
    }

    if config.observability.metrics_enabled {
        let obs_config = config.observability.clone();
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) = observability::run_metrics_server(obs_config, pipeline).await {
                error!(error = %e, "metrics server error");
            }
        });
    }

    tokio::spawn(shutdown::listen_for_signals(coordinator.clone()));

    pipeline.run().await;

    info!("ioshelfer shutdown complete");
    Ok(())
}
