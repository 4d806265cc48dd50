//! Mock adapters, actuators, and sample builders for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use ioshelfer::adapter::MetricSource;
use ioshelfer::config::IoShelferConfig;
use ioshelfer::error::Result;
use ioshelfer::events::EventBus;
use ioshelfer::history::MemoryHistory;
use ioshelfer::remediation::Actuator;
use ioshelfer::scheduler::{DeviceSpec, Pipeline};
use ioshelfer::shutdown::ShutdownCoordinator;
use ioshelfer::types::{
    DeviceKind, DiskSample, IsolationStrategy, RaidSample, Sample, SampleMetrics, SmartAttrs,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Metric source driven by a script of outcomes, falling back to a fixed
/// sample once the script is exhausted.
pub struct ScriptedSource {
    kind: DeviceKind,
    script: Mutex<VecDeque<Result<SampleMetrics>>>,
    fallback: SampleMetrics,
}

impl ScriptedSource {
    pub fn new(kind: DeviceKind, fallback: SampleMetrics) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            fallback,
        })
    }

    pub fn push(&self, step: Result<SampleMetrics>) {
        self.script.lock().push_back(step);
    }
}

#[async_trait]
impl MetricSource for ScriptedSource {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    async fn sample(&self, _device_id: &str) -> Result<Sample> {
        let metrics = match self.script.lock().pop_front() {
            Some(Ok(metrics)) => metrics,
            Some(Err(e)) => return Err(e),
            None => self.fallback.clone(),
        };
        Ok(Sample {
            ts: Utc::now(),
            metrics,
        })
    }
}

/// Actuator that records every dispatch and can be told to fail.
pub struct RecordingActuator {
    pub fail: AtomicBool,
    pub isolations: Mutex<Vec<(String, IsolationStrategy)>>,
    pub recoveries: Mutex<Vec<String>>,
}

impl RecordingActuator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            isolations: Mutex::new(Vec::new()),
            recoveries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn isolate(
        &self,
        device_id: &str,
        _kind: DeviceKind,
        strategy: IsolationStrategy,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ioshelfer::IoShelferError::ActuatorFailed(
                "injected actuator failure".into(),
            ));
        }
        self.isolations
            .lock()
            .push((device_id.to_string(), strategy));
        Ok(())
    }

    async fn recover(&self, device_id: &str, _kind: DeviceKind) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ioshelfer::IoShelferError::ActuatorFailed(
                "injected actuator failure".into(),
            ));
        }
        self.recoveries.lock().push(device_id.to_string());
        Ok(())
    }
}

/// Development config tuned for tests: isolate after one sub-health tick.
pub fn test_config(subhealth_ticks: u32) -> IoShelferConfig {
    let mut config = IoShelferConfig::development();
    config.remediation.subhealth_ticks_before_isolate = subhealth_ticks;
    config.detection.per_device_deadline = Duration::from_millis(500);
    config
}

/// Build a pipeline over in-memory history with the given sources.
pub fn build_pipeline(
    config: IoShelferConfig,
    sources: Vec<Arc<dyn MetricSource>>,
    actuator: Arc<dyn Actuator>,
) -> (Arc<Pipeline>, Arc<MemoryHistory>, Arc<EventBus>) {
    let history = Arc::new(MemoryHistory::new());
    let events = Arc::new(EventBus::new());
    let pipeline = Pipeline::new(
        config,
        history.clone(),
        actuator,
        events.clone(),
        ShutdownCoordinator::new(),
    );
    for source in sources {
        pipeline.register_source(source);
    }
    (pipeline, history, events)
}

/// Register `count` devices of one kind in the same group.
pub fn add_group(pipeline: &Pipeline, kind: DeviceKind, prefix: &str, group: &str, count: usize) {
    for i in 0..count {
        pipeline.add_device(DeviceSpec {
            id: format!("{}-{}", prefix, i),
            kind,
            group: group.to_string(),
        });
    }
}

pub fn healthy_raid() -> SampleMetrics {
    SampleMetrics::Raid(RaidSample {
        queue_depth: 8,
        avg_latency: Duration::from_millis(2),
        error_retry_rate: 0,
        firmware_version: "2.3.1".into(),
    })
}

pub fn degraded_raid() -> SampleMetrics {
    SampleMetrics::Raid(RaidSample {
        queue_depth: 145,
        avg_latency: Duration::from_millis(25),
        error_retry_rate: 10,
        firmware_version: "2.3.1".into(),
    })
}

pub fn healthy_disk() -> SampleMetrics {
    disk_with_reallocated(0)
}

pub fn failed_disk() -> SampleMetrics {
    disk_with_reallocated(150)
}

pub fn disk_with_reallocated(reallocated: u32) -> SampleMetrics {
    SampleMetrics::Disk(DiskSample {
        smart: SmartAttrs {
            reallocated_sectors: reallocated,
            read_error_rate: 0.0,
            pending_sectors: 0,
            device_model: "WDC-TEST".into(),
            serial: "WX0001".into(),
        },
        iops_variance: 0.0,
        temperature_c: 40,
        power_on_hours: 5000,
    })
}
