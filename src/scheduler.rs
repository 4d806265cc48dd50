//! Pipeline scheduler and orchestrator.
//!
//! Drives the detection-prediction-remediation pipeline per device at the
//! configured interval. One logical worker exists per device, so operations
//! on the same device are strictly serialized; distinct devices proceed in
//! parallel up to the configured worker cap.
//!
//! Tick sequence for one device:
//!
//! 1. acquire the device lock and a global worker permit
//! 2. pull a sample from the source adapter under the per-tick deadline,
//!    retrying transient errors with exponential backoff
//! 3. append the raw sample to the history store
//! 4. classify the sample
//! 5. every N ticks, forecast over the current history window
//! 6. compose the DeviceHealth record and append it
//! 7. hand the record to the remediation engine
//! 8. release the lock and emit `tick-completed` or `tick-skipped`
//!
//! A tick that exceeds the deadline is cancelled: the sample is dropped, a
//! `tick-skipped` event is emitted, and the next interval proceeds normally.

use crate::adapter::MetricSource;
use crate::config::IoShelferConfig;
use crate::detector;
use crate::error::{IoShelferError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::forecaster;
use crate::history::{HistoryEntry, HistoryStore};
use crate::observability;
use crate::remediation::{Actuator, PathView, RemediationEngine};
use crate::shutdown::ShutdownCoordinator;
use crate::types::{
    DeviceHealth, DeviceId, DeviceKind, Forecast, HealthStatus, PolicyState, Sample,
};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

/// Verdict statuses remembered per device for flap damping.
const RECENT_VERDICTS: usize = 8;

/// Adapter retry attempts per tick.
const MAX_SAMPLE_ATTEMPTS: u32 = 3;

/// Initial backoff between adapter retries.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Cadence of the background eviction pass.
const EVICT_INTERVAL: Duration = Duration::from_secs(60);

/// A device registered with the pipeline.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub kind: DeviceKind,
    /// Logical service group; siblings in the same group form the path
    /// population for the preservation gate.
    pub group: String,
}

/// Mutable per-device pipeline state, serialized by the device lock.
struct DeviceState {
    spec: DeviceSpec,
    policy: PolicyState,
    recent: VecDeque<HealthStatus>,
    ticks: u64,
    last_forecast: Option<Forecast>,
    /// Set when the history store reported corruption; ticks are skipped
    /// until the device is removed and re-added.
    quarantined: bool,
}

impl DeviceState {
    fn new(spec: DeviceSpec) -> Self {
        Self {
            spec,
            policy: PolicyState::default(),
            recent: VecDeque::with_capacity(RECENT_VERDICTS),
            ticks: 0,
            last_forecast: None,
            quarantined: false,
        }
    }

    fn push_recent(&mut self, status: HealthStatus) {
        if self.recent.len() >= RECENT_VERDICTS {
            self.recent.pop_front();
        }
        self.recent.push_back(status);
    }
}

/// Sibling bookkeeping per logical service group.
#[derive(Default)]
struct GroupState {
    members: HashSet<DeviceId>,
    isolated: HashSet<DeviceId>,
}

/// The pipeline orchestrator.
pub struct Pipeline {
    config: IoShelferConfig,
    sources: RwLock<HashMap<DeviceKind, Arc<dyn MetricSource>>>,
    history: Arc<dyn HistoryStore>,
    engine: RemediationEngine,
    events: Arc<EventBus>,
    devices: RwLock<HashMap<DeviceId, Arc<Mutex<DeviceState>>>>,
    groups: RwLock<HashMap<String, GroupState>>,
    /// Latest composed record per device, for the snapshot API.
    snapshots: RwLock<HashMap<DeviceId, DeviceHealth>>,
    permits: Arc<Semaphore>,
    shutdown: ShutdownCoordinator,
}

impl Pipeline {
    pub fn new(
        config: IoShelferConfig,
        history: Arc<dyn HistoryStore>,
        actuator: Arc<dyn Actuator>,
        events: Arc<EventBus>,
        shutdown: ShutdownCoordinator,
    ) -> Arc<Self> {
        let worker_cap = config.detection.worker_cap;
        let engine =
            RemediationEngine::new(config.remediation.clone(), actuator, events.clone());

        Arc::new(Self {
            config,
            sources: RwLock::new(HashMap::new()),
            history,
            engine,
            events,
            devices: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(worker_cap)),
            shutdown,
        })
    }

    /// Register the metric source for a device kind. Must be called before
    /// devices of that kind are ticked.
    pub fn register_source(&self, source: Arc<dyn MetricSource>) {
        self.sources.write().insert(source.kind(), source);
    }

    /// Add a device to the pipeline. Idempotent on the device id.
    pub fn add_device(&self, spec: DeviceSpec) {
        let mut groups = self.groups.write();
        groups
            .entry(spec.group.clone())
            .or_default()
            .members
            .insert(spec.id.clone());
        drop(groups);

        let mut devices = self.devices.write();
        devices
            .entry(spec.id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceState::new(spec.clone()))));
        info!(device_id = %spec.id, kind = %spec.kind, group = %spec.group, "device registered");
    }

    /// Remove a device. This is the only path that destroys its policy state.
    pub fn remove_device(&self, device_id: &str) {
        let removed = self.devices.write().remove(device_id);
        self.snapshots.write().remove(device_id);
        if removed.is_some() {
            let mut groups = self.groups.write();
            for group in groups.values_mut() {
                group.members.remove(device_id);
                group.isolated.remove(device_id);
            }
            info!(device_id, "device removed");
        }
    }

    /// Registered device ids, sorted.
    pub fn list_devices(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy of the latest composed health record for a device.
    pub fn device_health(&self, device_id: &str) -> Option<DeviceHealth> {
        self.snapshots.read().get(device_id).cloned()
    }

    /// Subscribe to the pipeline event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Run the pipeline until shutdown: one worker per device plus a
    /// background eviction pass, drained within the grace period.
    pub async fn run(self: Arc<Self>) {
        let device_ids = self.list_devices();
        info!(devices = device_ids.len(), "pipeline starting");

        let mut handles = Vec::new();
        for device_id in device_ids {
            let pipeline = self.clone();
            handles.push(tokio::spawn(async move {
                pipeline.device_worker(device_id).await;
            }));
        }

        let evictor = self.clone();
        handles.push(tokio::spawn(async move {
            evictor.eviction_worker().await;
        }));

        self.shutdown.wait().await;
        info!("pipeline draining in-flight ticks");

        let drain = futures::future::join_all(handles);
        if tokio::time::timeout(self.shutdown.grace_period(), drain)
            .await
            .is_err()
        {
            warn!("grace period elapsed; forcing pipeline termination");
        }
        info!("pipeline stopped");
    }

    /// Per-device worker loop: a tick per interval, no tick queueing.
    async fn device_worker(self: Arc<Self>, device_id: DeviceId) {
        let mut interval = tokio::time::interval(self.config.detection.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick_device(&device_id).await {
                        debug!(device_id = %device_id, error = %e, "tick did not complete");
                    }
                }
                _ = self.shutdown.wait() => {
                    debug!(device_id = %device_id, "worker stopping");
                    break;
                }
            }
        }
    }

    async fn eviction_worker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(EVICT_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.history.evict(self.config.history.retention).await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "history eviction pass"),
                        Err(e) => warn!(error = %e, "history eviction failed"),
                    }
                }
                _ = self.shutdown.wait() => break,
            }
        }
    }

    /// Run one full tick for a device. Public so tests and the one-shot CLI
    /// path can drive the pipeline without timers.
    pub async fn tick_device(&self, device_id: &str) -> Result<DeviceHealth> {
        let state_arc = self
            .devices
            .read()
            .get(device_id)
            .cloned()
            .ok_or_else(|| IoShelferError::UnknownDevice(device_id.to_string()))?;

        // Per-device serialization: at most one in-flight tick per device.
        let mut state = state_arc.lock().await;
        // Global cap on concurrent ticks.
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| IoShelferError::Cancelled("pipeline closed".into()))?;

        match self.run_tick(device_id, &mut state).await {
            Ok(health) => {
                self.events.publish(PipelineEvent::TickCompleted {
                    device_id: device_id.to_string(),
                    at: Utc::now(),
                });
                Ok(health)
            }
            Err(e) => {
                self.events.publish(PipelineEvent::TickSkipped {
                    device_id: device_id.to_string(),
                    reason: e.kind().to_string(),
                    at: Utc::now(),
                });
                Err(e)
            }
        }
    }

    async fn run_tick(&self, device_id: &str, state: &mut DeviceState) -> Result<DeviceHealth> {
        if state.quarantined {
            return Err(IoShelferError::StorageCorrupted {
                device_id: device_id.to_string(),
                reason: "device history is quarantined".to_string(),
            });
        }

        let kind = state.spec.kind;
        let source = self.sources.read().get(&kind).cloned().ok_or_else(|| {
            IoShelferError::Internal(format!("no metric source registered for {}", kind))
        })?;

        // Stage 2: sample under the per-tick deadline.
        let deadline = self.config.detection.per_device_deadline;
        let sample = self.sample_with_retry(&*source, device_id, deadline).await?;

        // Stage 3: the raw sample is durable before classification runs.
        let raw_entry = HistoryEntry {
            ts: sample.ts,
            sample: sample.clone(),
            health: None,
        };
        self.append_with_retry(state, device_id, raw_entry).await?;

        // Stage 4: classify.
        let verdict = detector::classify(&sample, &self.config.detection.thresholds);
        if let Err(e) = detector::validate_verdict(&verdict) {
            error!(device_id, error = %e, "classifier produced an invalid verdict");
            return Err(e);
        }

        if let Some(prev) = state.recent.back().copied() {
            if prev != verdict.status {
                self.events.publish(PipelineEvent::VerdictChanged {
                    device_id: device_id.to_string(),
                    from: prev,
                    to: verdict.status,
                    at: Utc::now(),
                });
            }
        }
        state.push_recent(verdict.status);
        state.ticks += 1;

        // Stage 5: forecast on the slower cadence, reusing the last reading
        // in between.
        if state.ticks % self.config.prediction.cadence_ticks == 0 {
            let window = self
                .history
                .window(device_id, self.config.prediction.history_window)
                .await?;
            state.last_forecast = Some(forecaster::forecast(
                kind,
                &window,
                &self.config.prediction,
                &self.config.detection.thresholds,
            ));
        }

        // Stage 6: compose and record the health tuple.
        let health = DeviceHealth {
            device_id: device_id.to_string(),
            kind,
            sample_ts: sample.ts,
            verdict,
            forecast: state.last_forecast.clone(),
            policy: state.policy.clone(),
        };

        let health_entry = HistoryEntry {
            // The record timestamp must advance past the raw-sample entry
            // even when the clock has not visibly moved.
            ts: Utc::now().max(sample.ts + chrono::Duration::microseconds(1)),
            sample: sample.clone(),
            health: Some(health.clone()),
        };
        self.append_with_retry(state, device_id, health_entry).await?;

        observability::record_sample(device_id, &sample);
        if let Some(forecast) = &state.last_forecast {
            observability::record_forecast(device_id, &sample, forecast);
        }

        // Stage 7: remediation sees the recorded health, never raw metrics.
        let paths = self.path_view(&state.spec);
        let recent: Vec<HealthStatus> = state.recent.iter().copied().collect();
        let result = self
            .engine
            .evaluate(&health, &mut state.policy, &recent, paths)
            .await;
        debug!(
            device_id,
            action = %result.action.label(),
            dispatched = result.dispatched,
            "remediation evaluated"
        );

        self.sync_isolation(&state.spec, state.policy.isolated);

        // The snapshot carries the post-remediation policy.
        let mut snapshot = health.clone();
        snapshot.policy = state.policy.clone();
        self.snapshots
            .write()
            .insert(device_id.to_string(), snapshot.clone());

        Ok(snapshot)
    }

    /// Sample with bounded retries under the tick deadline. Transient errors
    /// back off exponentially; permanent errors abort immediately.
    async fn sample_with_retry(
        &self,
        source: &dyn MetricSource,
        device_id: &str,
        deadline: Duration,
    ) -> Result<Sample> {
        let attempt_loop = async {
            let mut backoff = RETRY_BACKOFF;
            let mut attempt = 0;
            loop {
                attempt += 1;
                match source.sample(device_id).await {
                    Ok(sample) => return Ok(sample),
                    Err(e) if e.is_retryable() && attempt < MAX_SAMPLE_ATTEMPTS => {
                        debug!(device_id, attempt, error = %e, "retrying sample");
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        match tokio::time::timeout(deadline, attempt_loop).await {
            Ok(result) => result,
            Err(_) => Err(IoShelferError::Timeout(deadline.as_millis() as u64)),
        }
    }

    /// Append with a single retry on I/O errors. Corruption quarantines the
    /// device and surfaces loudly.
    async fn append_with_retry(
        &self,
        state: &mut DeviceState,
        device_id: &str,
        entry: HistoryEntry,
    ) -> Result<()> {
        let mut last_err = None;
        for _ in 0..2 {
            match self.history.append(device_id, entry.clone()).await {
                Ok(()) => return Ok(()),
                Err(e @ IoShelferError::StorageCorrupted { .. }) => {
                    error!(device_id, error = %e, "history corrupted; quarantining device");
                    state.quarantined = true;
                    self.events.publish(PipelineEvent::DeviceQuarantined {
                        device_id: device_id.to_string(),
                        reason: e.to_string(),
                        at: Utc::now(),
                    });
                    return Err(e);
                }
                Err(e @ IoShelferError::StorageIo(_)) => {
                    warn!(device_id, error = %e, "history append failed");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let err = last_err.unwrap_or_else(|| IoShelferError::StorageIo("append failed".into()));
        self.events.publish(PipelineEvent::StorageError {
            device_id: device_id.to_string(),
            error: err.to_string(),
            at: Utc::now(),
        });
        Err(err)
    }

    fn path_view(&self, spec: &DeviceSpec) -> PathView {
        let groups = self.groups.read();
        match groups.get(&spec.group) {
            Some(group) => PathView {
                population: group.members.len(),
                isolated_siblings: group
                    .isolated
                    .iter()
                    .filter(|id| id.as_str() != spec.id)
                    .count(),
            },
            None => PathView {
                population: 1,
                isolated_siblings: 0,
            },
        }
    }

    fn sync_isolation(&self, spec: &DeviceSpec, isolated: bool) {
        let mut groups = self.groups.write();
        if let Some(group) = groups.get_mut(&spec.group) {
            if isolated {
                group.isolated.insert(spec.id.clone());
            } else {
                group.isolated.remove(&spec.id);
            }
        }
    }
}
