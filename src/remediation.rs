//! Policy-gated remediation.
//!
//! The engine owns the per-device state machine
//! `Observing -> Isolated -> Recovering -> Observing`. It consumes the
//! already-composed [`DeviceHealth`] the scheduler hands it and never
//! re-invokes detection. Dispatch is delegated to a pluggable [`Actuator`];
//! the engine is responsible only for the decision and the state
//! transitions.
//!
//! Safety invariants enforced here:
//! - an Isolate is dispatched only when the remaining non-isolated siblings
//!   stay at or above `max(min_healthy_paths, ceil(ratio * population))`;
//! - an isolated device returns to service only through a Recover that
//!   observed a Healthy verdict, with the two preceding verdicts also
//!   Healthy to damp flapping;
//! - an actuator failure leaves `PolicyState.isolated` untouched, so a later
//!   tick re-proposes the action.

use crate::config::RemediationConfig;
use crate::error::{IoShelferError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::types::{
    DeviceHealth, DeviceKind, HealthStatus, IsolationStrategy, PolicyState, RemediationAction,
    RemediationResult,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Reason string recorded when the path-preservation gate blocks an Isolate.
pub const ISOLATION_SKIPPED_SAFETY: &str = "isolation-skipped-safety";

/// Reason string recorded when the global kill-switch blocks an Isolate.
pub const AUTO_ISOLATION_DISABLED: &str = "auto-isolation-disabled";

/// Reason string recorded while the flap-damping gate holds a Recover back.
pub const RECOVERY_DAMPED: &str = "recovery-damped";

/// Out-of-core component performing the physical isolate/recover.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn isolate(
        &self,
        device_id: &str,
        kind: DeviceKind,
        strategy: IsolationStrategy,
    ) -> Result<()>;

    async fn recover(&self, device_id: &str, kind: DeviceKind) -> Result<()>;
}

/// Default production actuator: records the transition and succeeds.
/// Deployments wire a platform-specific [`Actuator`] in its place.
pub struct LoggingActuator;

#[async_trait]
impl Actuator for LoggingActuator {
    async fn isolate(
        &self,
        device_id: &str,
        kind: DeviceKind,
        strategy: IsolationStrategy,
    ) -> Result<()> {
        info!(device_id, kind = %kind, strategy = %strategy, "isolating device");
        Ok(())
    }

    async fn recover(&self, device_id: &str, kind: DeviceKind) -> Result<()> {
        info!(device_id, kind = %kind, "recovering device");
        Ok(())
    }
}

/// View of the device's sibling group at evaluation time.
#[derive(Debug, Clone, Copy)]
pub struct PathView {
    /// Total devices serving the same logical service, this one included.
    pub population: usize,
    /// Siblings currently isolated, this device excluded.
    pub isolated_siblings: usize,
}

/// Policy-gated remediation engine.
pub struct RemediationEngine {
    config: RemediationConfig,
    actuator: Arc<dyn Actuator>,
    events: Arc<EventBus>,
}

impl RemediationEngine {
    pub fn new(
        config: RemediationConfig,
        actuator: Arc<dyn Actuator>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            actuator,
            events,
        }
    }

    /// Pure action selection from the current health, policy state, and the
    /// device's recent verdict statuses (oldest first, current last).
    fn propose(
        &self,
        health: &DeviceHealth,
        policy: &PolicyState,
        recent: &[HealthStatus],
    ) -> RemediationAction {
        match health.verdict.status {
            HealthStatus::Healthy if policy.isolated => {
                if recovery_gate_open(recent) {
                    RemediationAction::Recover
                } else {
                    RemediationAction::Noop {
                        reason: RECOVERY_DAMPED.to_string(),
                    }
                }
            }
            HealthStatus::SubHealthy
                if !policy.isolated
                    && policy.consecutive_subhealth_ticks
                        >= self.config.subhealth_ticks_before_isolate =>
            {
                RemediationAction::Isolate {
                    strategy: IsolationStrategy::Temporary,
                }
            }
            HealthStatus::Failed if !policy.isolated => RemediationAction::Isolate {
                strategy: IsolationStrategy::Permanent,
            },
            _ => RemediationAction::Noop {
                reason: "observing".to_string(),
            },
        }
    }

    /// Evaluate the policy for one device and dispatch the gated action.
    ///
    /// `recent` holds the device's verdict statuses oldest-first, with the
    /// current verdict last. The caller guarantees per-device serialization,
    /// so the `&mut PolicyState` is race-free.
    pub async fn evaluate(
        &self,
        health: &DeviceHealth,
        policy: &mut PolicyState,
        recent: &[HealthStatus],
        paths: PathView,
    ) -> RemediationResult {
        // Track consecutive sub-health before selecting an action, so the
        // configured tick threshold counts this tick as well.
        if health.verdict.status == HealthStatus::SubHealthy {
            policy.consecutive_subhealth_ticks += 1;
        } else {
            policy.consecutive_subhealth_ticks = 0;
        }

        let action = self.propose(health, policy, recent);

        match action {
            RemediationAction::Isolate { strategy } => {
                self.dispatch_isolate(health, policy, paths, strategy).await
            }
            RemediationAction::Recover => self.dispatch_recover(health, policy).await,
            RemediationAction::Noop { reason } => {
                if reason == RECOVERY_DAMPED {
                    self.events.publish(PipelineEvent::RemediationSkipped {
                        device_id: health.device_id.clone(),
                        reason: reason.clone(),
                        at: Utc::now(),
                    });
                }
                RemediationResult {
                    device_id: health.device_id.clone(),
                    kind: health.kind,
                    action: RemediationAction::Noop { reason },
                    dispatched: false,
                    success: true,
                    error: None,
                }
            }
        }
    }

    async fn dispatch_isolate(
        &self,
        health: &DeviceHealth,
        policy: &mut PolicyState,
        paths: PathView,
        strategy: IsolationStrategy,
    ) -> RemediationResult {
        let device_id = &health.device_id;

        if !self.config.auto_isolation {
            warn!(device_id, "isolation proposed but auto-isolation is disabled");
            return self.skip(health, AUTO_ISOLATION_DISABLED);
        }

        // Path-preservation gate: after this isolation, the non-isolated
        // sibling count must stay at or above the configured floor.
        let remaining = paths
            .population
            .saturating_sub(paths.isolated_siblings)
            .saturating_sub(1);
        let required = required_healthy_paths(&self.config, paths.population);
        if remaining < required {
            warn!(
                device_id,
                remaining,
                required,
                population = paths.population,
                "isolation would violate path preservation"
            );
            return self.skip(health, ISOLATION_SKIPPED_SAFETY);
        }

        match self
            .actuator
            .isolate(device_id, health.kind, strategy)
            .await
        {
            Ok(()) => {
                policy.isolated = true;
                policy.last_action_ts = Some(Utc::now());
                policy.preserved_siblings = remaining as u32;

                let action = RemediationAction::Isolate { strategy };
                info!(device_id, strategy = %strategy, remaining, "device isolated");
                self.events.publish(PipelineEvent::RemediationDispatched {
                    device_id: device_id.clone(),
                    action: action.label(),
                    at: Utc::now(),
                });

                RemediationResult {
                    device_id: device_id.clone(),
                    kind: health.kind,
                    action,
                    dispatched: true,
                    success: true,
                    error: None,
                }
            }
            Err(e) => self.actuator_failure(health, RemediationAction::Isolate { strategy }, e),
        }
    }

    async fn dispatch_recover(
        &self,
        health: &DeviceHealth,
        policy: &mut PolicyState,
    ) -> RemediationResult {
        let device_id = &health.device_id;

        match self.actuator.recover(device_id, health.kind).await {
            Ok(()) => {
                policy.isolated = false;
                policy.last_action_ts = Some(Utc::now());

                info!(device_id, "device recovered");
                self.events.publish(PipelineEvent::RemediationDispatched {
                    device_id: device_id.clone(),
                    action: RemediationAction::Recover.label(),
                    at: Utc::now(),
                });

                RemediationResult {
                    device_id: device_id.clone(),
                    kind: health.kind,
                    action: RemediationAction::Recover,
                    dispatched: true,
                    success: true,
                    error: None,
                }
            }
            Err(e) => self.actuator_failure(health, RemediationAction::Recover, e),
        }
    }

    fn skip(&self, health: &DeviceHealth, reason: &str) -> RemediationResult {
        self.events.publish(PipelineEvent::RemediationSkipped {
            device_id: health.device_id.clone(),
            reason: reason.to_string(),
            at: Utc::now(),
        });
        RemediationResult {
            device_id: health.device_id.clone(),
            kind: health.kind,
            action: RemediationAction::Noop {
                reason: reason.to_string(),
            },
            dispatched: false,
            success: true,
            error: None,
        }
    }

    /// An actuator failure is recorded but never mutates `isolated`; a later
    /// tick re-proposes the action.
    fn actuator_failure(
        &self,
        health: &DeviceHealth,
        action: RemediationAction,
        err: IoShelferError,
    ) -> RemediationResult {
        warn!(
            device_id = %health.device_id,
            action = %action.label(),
            error = %err,
            "actuator dispatch failed"
        );
        self.events.publish(PipelineEvent::RemediationSkipped {
            device_id: health.device_id.clone(),
            reason: format!("actuator-failed: {}", err),
            at: Utc::now(),
        });
        RemediationResult {
            device_id: health.device_id.clone(),
            kind: health.kind,
            action,
            dispatched: true,
            success: false,
            error: Some(err.to_string()),
        }
    }
}

/// Floor on non-isolated siblings after an isolation.
fn required_healthy_paths(config: &RemediationConfig, population: usize) -> usize {
    let ratio_floor = (config.preserve_paths_ratio * population as f64).ceil() as usize;
    config.min_healthy_paths.max(ratio_floor)
}

/// Recover only when the current verdict is Healthy and the two preceding
/// verdicts were Healthy as well. A single degraded verdict in between
/// restarts the countdown.
fn recovery_gate_open(recent: &[HealthStatus]) -> bool {
    recent.len() >= 3
        && recent
            .iter()
            .rev()
            .take(3)
            .all(|s| *s == HealthStatus::Healthy)
}
