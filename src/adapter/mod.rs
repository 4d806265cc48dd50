//! Metric source adapters.
//!
//! One adapter per device kind presents a uniform pull interface over the
//! heterogeneous probe layer. Adapters are pure pull: they never push into
//! the pipeline; the scheduler drives cadence and enforces the per-tick
//! deadline. Concurrent `sample` calls across distinct device ids must be
//! safe; same-device calls are serialized by the scheduler.

mod disk;
mod network;
mod raid;

pub use disk::DiskAdapter;
pub use network::NetworkAdapter;
pub use raid::RaidAdapter;

use crate::error::Result;
use crate::types::{DeviceKind, Sample};
use async_trait::async_trait;

/// Uniform pull interface over a probe backend.
///
/// Errors follow the adapter taxonomy: [`IoShelferError::AdapterTransient`]
/// is retried by the scheduler with backoff; [`IoShelferError::UnknownDevice`]
/// and [`IoShelferError::ProbeFailure`] are permanent for the tick and
/// surface as typed events.
///
/// [`IoShelferError::AdapterTransient`]: crate::error::IoShelferError::AdapterTransient
/// [`IoShelferError::UnknownDevice`]: crate::error::IoShelferError::UnknownDevice
/// [`IoShelferError::ProbeFailure`]: crate::error::IoShelferError::ProbeFailure
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// The device kind this adapter serves.
    fn kind(&self) -> DeviceKind;

    /// Produce one sample for the device, stamped at observation time.
    async fn sample(&self, device_id: &str) -> Result<Sample>;
}
