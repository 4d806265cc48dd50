//! Probe data plane abstraction.
//!
//! The raw eBPF programs and kernel attach code live outside the core; what
//! the core sees is a set of per-device ring buffers holding the most recent
//! raw readings drained from kernel space. Adapters pull from these rings and
//! never touch kernel plumbing directly.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  kernel probes (out of core)                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ProbeHub: per-device ProbeRing<Reading>                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  adapters: RaidAdapter │ DiskAdapter │ NetworkAdapter       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::types::SmartAttrs;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default ring capacity per device.
const DEFAULT_RING_CAPACITY: usize = 64;

/// Raw reading for a RAID controller, as drained from the probe.
#[derive(Debug, Clone)]
pub struct RaidProbeReading {
    pub queue_depth: u32,
    pub avg_latency: Duration,
    /// Raw retry count observed during `window`; adapters normalize this to
    /// a per-hour rate before building a sample.
    pub error_retries: u32,
    /// Observation window the retry count covers.
    pub window: Duration,
    pub firmware_version: String,
}

/// Raw reading for a disk device.
#[derive(Debug, Clone)]
pub struct DiskProbeReading {
    pub smart: SmartAttrs,
    pub temperature_c: i32,
    pub power_on_hours: u64,
    /// IOPS observed during this probe interval. The adapter computes
    /// variance across the ring.
    pub iops: f64,
}

/// Raw reading for a network interface.
#[derive(Debug, Clone)]
pub struct NetProbeReading {
    pub latency_p95: Duration,
    pub packets_sent: u64,
    pub packets_lost: u64,
    pub bytes_per_second: u64,
}

/// Bounded ring of raw readings; push overwrites the oldest when full.
#[derive(Debug)]
pub struct ProbeRing<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> ProbeRing<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, reading: T) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(reading);
    }

    /// Most recent reading, if any.
    pub fn latest(&self) -> Option<T> {
        self.buf.back().cloned()
    }

    /// All readings in arrival order, oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Shared registry of per-device probe rings.
///
/// Pushes come from the probe drain loop; reads come from adapters on
/// arbitrary worker tasks, so access is guarded by short read/write locks.
#[derive(Default)]
pub struct ProbeHub {
    raid: RwLock<HashMap<String, ProbeRing<RaidProbeReading>>>,
    disk: RwLock<HashMap<String, ProbeRing<DiskProbeReading>>>,
    network: RwLock<HashMap<String, ProbeRing<NetProbeReading>>>,
}

impl ProbeHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a RAID controller ring. Idempotent.
    pub fn register_raid(&self, device_id: &str) {
        self.raid
            .write()
            .entry(device_id.to_string())
            .or_insert_with(|| ProbeRing::new(DEFAULT_RING_CAPACITY));
    }

    pub fn register_disk(&self, device_id: &str) {
        self.disk
            .write()
            .entry(device_id.to_string())
            .or_insert_with(|| ProbeRing::new(DEFAULT_RING_CAPACITY));
    }

    pub fn register_network(&self, device_id: &str) {
        self.network
            .write()
            .entry(device_id.to_string())
            .or_insert_with(|| ProbeRing::new(DEFAULT_RING_CAPACITY));
    }

    pub fn push_raid(&self, device_id: &str, reading: RaidProbeReading) {
        if let Some(ring) = self.raid.write().get_mut(device_id) {
            ring.push(reading);
        } else {
            debug!(device_id, "dropping raid reading for unregistered device");
        }
    }

    pub fn push_disk(&self, device_id: &str, reading: DiskProbeReading) {
        if let Some(ring) = self.disk.write().get_mut(device_id) {
            ring.push(reading);
        } else {
            debug!(device_id, "dropping disk reading for unregistered device");
        }
    }

    pub fn push_network(&self, device_id: &str, reading: NetProbeReading) {
        if let Some(ring) = self.network.write().get_mut(device_id) {
            ring.push(reading);
        } else {
            debug!(device_id, "dropping network reading for unregistered device");
        }
    }

    /// Latest RAID reading. `None` outer means the device is unregistered;
    /// `Some(None)` means registered but no data yet.
    pub fn latest_raid(&self, device_id: &str) -> Option<Option<RaidProbeReading>> {
        self.raid.read().get(device_id).map(|r| r.latest())
    }

    pub fn latest_disk(&self, device_id: &str) -> Option<Option<DiskProbeReading>> {
        self.disk.read().get(device_id).map(|r| r.latest())
    }

    pub fn latest_network(&self, device_id: &str) -> Option<Option<NetProbeReading>> {
        self.network.read().get(device_id).map(|r| r.latest())
    }

    /// Full disk ring snapshot, oldest first. `None` if unregistered.
    pub fn disk_readings(&self, device_id: &str) -> Option<Vec<DiskProbeReading>> {
        self.disk.read().get(device_id).map(|r| r.snapshot())
    }
}

/// Development probe source that feeds rings with steady synthetic readings.
///
/// Production deployments replace this with the kernel drain loop; the
/// adapters cannot tell the difference.
pub struct SimulatedProbe {
    hub: Arc<ProbeHub>,
}

impl SimulatedProbe {
    pub fn new(hub: Arc<ProbeHub>) -> Self {
        Self { hub }
    }

    /// Push one round of healthy-looking readings for the given devices.
    pub fn feed_once(
        &self,
        raid_ids: &[String],
        disk_ids: &[String],
        network_ids: &[String],
    ) {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for id in raid_ids {
            self.hub.push_raid(
                id,
                RaidProbeReading {
                    queue_depth: rng.gen_range(4..32),
                    avg_latency: Duration::from_millis(rng.gen_range(1..8)),
                    error_retries: rng.gen_range(0..3),
                    window: Duration::from_secs(60),
                    firmware_version: "2.3.1".to_string(),
                },
            );
        }

        for id in disk_ids {
            self.hub.push_disk(
                id,
                DiskProbeReading {
                    smart: SmartAttrs {
                        reallocated_sectors: 0,
                        read_error_rate: 0.0,
                        pending_sectors: 0,
                        device_model: "SIM-DISK".to_string(),
                        serial: format!("SIM-{}", id),
                    },
                    temperature_c: rng.gen_range(30..45),
                    power_on_hours: 1000,
                    iops: rng.gen_range(900.0..1100.0),
                },
            );
        }

        for id in network_ids {
            self.hub.push_network(
                id,
                NetProbeReading {
                    latency_p95: Duration::from_micros(rng.gen_range(200..900)),
                    packets_sent: rng.gen_range(10_000..50_000),
                    packets_lost: 0,
                    bytes_per_second: rng.gen_range(1_000_000..50_000_000),
                },
            );
        }
    }
}
