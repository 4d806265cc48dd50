//! Event notification for the detection pipeline.
//!
//! Every skipped tick and every skipped or failed remediation produces a
//! structured event; nothing is dropped silently. Consumers subscribe via
//! [`EventBus::subscribe`] and receive a broadcast stream.

use crate::types::{DeviceId, HealthStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Default capacity of the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// A structured pipeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum PipelineEvent {
    /// A tick ran all stages to completion.
    TickCompleted {
        device_id: DeviceId,
        at: DateTime<Utc>,
    },
    /// A tick was abandoned; `reason` is a short stable string.
    TickSkipped {
        device_id: DeviceId,
        reason: String,
        at: DateTime<Utc>,
    },
    /// The detector's status for a device changed between ticks.
    VerdictChanged {
        device_id: DeviceId,
        from: HealthStatus,
        to: HealthStatus,
        at: DateTime<Utc>,
    },
    /// A remediation action was handed to the actuator.
    RemediationDispatched {
        device_id: DeviceId,
        action: String,
        at: DateTime<Utc>,
    },
    /// A proposed remediation was not dispatched.
    RemediationSkipped {
        device_id: DeviceId,
        reason: String,
        at: DateTime<Utc>,
    },
    /// The history store reported an I/O error for a device.
    StorageError {
        device_id: DeviceId,
        error: String,
        at: DateTime<Utc>,
    },
    /// Appends for a device were halted after corruption was detected.
    DeviceQuarantined {
        device_id: DeviceId,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// The device this event concerns.
    pub fn device_id(&self) -> &str {
        match self {
            PipelineEvent::TickCompleted { device_id, .. }
            | PipelineEvent::TickSkipped { device_id, .. }
            | PipelineEvent::VerdictChanged { device_id, .. }
            | PipelineEvent::RemediationDispatched { device_id, .. }
            | PipelineEvent::RemediationSkipped { device_id, .. }
            | PipelineEvent::StorageError { device_id, .. }
            | PipelineEvent::DeviceQuarantined { device_id, .. } => device_id,
        }
    }

    /// Stable event name.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::TickCompleted { .. } => "tick-completed",
            PipelineEvent::TickSkipped { .. } => "tick-skipped",
            PipelineEvent::VerdictChanged { .. } => "verdict-changed",
            PipelineEvent::RemediationDispatched { .. } => "remediation-dispatched",
            PipelineEvent::RemediationSkipped { .. } => "remediation-skipped",
            PipelineEvent::StorageError { .. } => "storage-error",
            PipelineEvent::DeviceQuarantined { .. } => "device-quarantined",
        }
    }
}

/// Broadcast bus for pipeline events.
///
/// Publishing never blocks; slow subscribers observe lag via the broadcast
/// channel's usual semantics.
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Delivery to zero subscribers is not an error.
    pub fn publish(&self, event: PipelineEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(
            event = event.name(),
            device_id = event.device_id(),
            "pipeline event"
        );
        let _ = self.tx.send(event);
    }

    /// Total events published since creation.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
