//! Recovery, flap suppression, and actuator-failure behavior driven through
//! the full pipeline.

mod common;

use common::fixtures::{
    add_group, build_pipeline, degraded_raid, healthy_raid, test_config, RecordingActuator,
    ScriptedSource,
};
use ioshelfer::events::PipelineEvent;
use ioshelfer::remediation::AUTO_ISOLATION_DISABLED;
use ioshelfer::types::DeviceKind;
use std::sync::atomic::Ordering;

/// Degrade once to isolate the device, then return the scripted verdicts.
async fn isolate_then_script(
    source: &ScriptedSource,
    pipeline: &ioshelfer::scheduler::Pipeline,
) {
    source.push(Ok(degraded_raid()));
    let health = pipeline.tick_device("raid-0").await.unwrap();
    assert!(health.policy.isolated, "setup: device must start isolated");
}

#[tokio::test]
async fn recovery_dispatches_after_three_consecutive_healthy_verdicts() {
    let source = ScriptedSource::new(DeviceKind::Raid, healthy_raid());
    let actuator = RecordingActuator::new();
    let (pipeline, _, _) = build_pipeline(test_config(1), vec![source.clone()], actuator.clone());
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 4);

    isolate_then_script(&source, &pipeline).await;

    // Two healthy verdicts: still damped.
    for _ in 0..2 {
        let health = pipeline.tick_device("raid-0").await.unwrap();
        assert!(health.policy.isolated);
        assert!(actuator.recoveries.lock().is_empty());
    }

    // Third consecutive healthy verdict: recovery dispatches.
    let health = pipeline.tick_device("raid-0").await.unwrap();
    assert!(!health.policy.isolated);
    assert_eq!(actuator.recoveries.lock().as_slice(), &["raid-0".to_string()]);
}

#[tokio::test]
async fn flapping_device_never_recovers() {
    let source = ScriptedSource::new(DeviceKind::Raid, healthy_raid());
    let actuator = RecordingActuator::new();
    // Large isolate threshold so the flapping sub-health never re-isolates.
    let mut config = test_config(100);
    config.remediation.subhealth_ticks_before_isolate = 100;
    let (pipeline, _, _) = build_pipeline(config, vec![source.clone()], actuator.clone());
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 4);

    isolate_then_script(&source, &pipeline).await;

    // Alternate Healthy / SubHealthy: a streak of three never forms.
    for i in 0..10 {
        if i % 2 == 1 {
            source.push(Ok(degraded_raid()));
        } else {
            source.push(Ok(healthy_raid()));
        }
        let health = pipeline.tick_device("raid-0").await.unwrap();
        assert!(health.policy.isolated, "tick {}: must stay isolated", i);
    }
    assert!(actuator.recoveries.lock().is_empty());
}

#[tokio::test]
async fn disabled_auto_isolation_downgrades_to_noop() {
    let source = ScriptedSource::new(DeviceKind::Raid, degraded_raid());
    let actuator = RecordingActuator::new();
    let mut config = test_config(1);
    config.remediation.auto_isolation = false;
    let (pipeline, _, events) = build_pipeline(config, vec![source], actuator.clone());
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 4);

    let mut rx = events.subscribe();
    let health = pipeline.tick_device("raid-0").await.unwrap();

    assert!(!health.policy.isolated);
    assert!(actuator.isolations.lock().is_empty());

    let mut saw_disabled = false;
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::RemediationSkipped { reason, .. } = event {
            assert_eq!(reason, AUTO_ISOLATION_DISABLED);
            saw_disabled = true;
        }
    }
    assert!(saw_disabled);
}

#[tokio::test]
async fn actuator_failure_leaves_policy_and_reproposes() {
    let source = ScriptedSource::new(DeviceKind::Raid, degraded_raid());
    let actuator = RecordingActuator::new();
    actuator.fail.store(true, Ordering::SeqCst);
    let (pipeline, _, _) = build_pipeline(test_config(1), vec![source], actuator.clone());
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 4);

    // Dispatch fails: isolation state untouched.
    let health = pipeline.tick_device("raid-0").await.unwrap();
    assert!(!health.policy.isolated);

    // Once the actuator heals, the next tick re-proposes and succeeds.
    actuator.fail.store(false, Ordering::SeqCst);
    let health = pipeline.tick_device("raid-0").await.unwrap();
    assert!(health.policy.isolated);
    assert_eq!(actuator.isolations.lock().len(), 1);
}

#[tokio::test]
async fn sibling_isolation_tightens_the_gate() {
    // Population 4: two isolations pass the gate, the third would leave
    // only one of four paths and is downgraded.
    let source = ScriptedSource::new(DeviceKind::Raid, degraded_raid());
    let actuator = RecordingActuator::new();
    let (pipeline, _, _) = build_pipeline(test_config(1), vec![source], actuator.clone());
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 4);

    let first = pipeline.tick_device("raid-0").await.unwrap();
    assert!(first.policy.isolated);

    let second = pipeline.tick_device("raid-1").await.unwrap();
    assert!(second.policy.isolated);

    // max(1, ceil(0.5 * 4)) = 2 remaining required; a third isolation would
    // leave just one.
    let third = pipeline.tick_device("raid-2").await.unwrap();
    assert!(!third.policy.isolated);
    assert_eq!(actuator.isolations.lock().len(), 2);
}

#[tokio::test]
async fn verdict_transitions_surface_in_event_stream() {
    let source = ScriptedSource::new(DeviceKind::Raid, healthy_raid());
    source.push(Ok(healthy_raid()));
    source.push(Ok(degraded_raid()));
    source.push(Ok(healthy_raid()));
    let actuator = RecordingActuator::new();
    let mut config = test_config(100);
    config.remediation.auto_isolation = false;
    let (pipeline, _, events) = build_pipeline(config, vec![source], actuator);
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 1);

    let mut rx = events.subscribe();
    for _ in 0..3 {
        pipeline.tick_device("raid-0").await.unwrap();
    }

    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::VerdictChanged { from, to, .. } = event {
            transitions.push((from, to));
        }
    }
    use ioshelfer::types::HealthStatus::{Healthy, SubHealthy};
    assert_eq!(transitions, vec![(Healthy, SubHealthy), (SubHealthy, Healthy)]);
}

#[tokio::test]
async fn policy_state_survives_between_ticks() {
    let source = ScriptedSource::new(DeviceKind::Raid, degraded_raid());
    let actuator = RecordingActuator::new();
    let (pipeline, _, _) = build_pipeline(test_config(3), vec![source], actuator.clone());
    add_group(&pipeline, DeviceKind::Raid, "raid", "storage", 4);

    // Sub-health accumulates across ticks until the threshold is crossed.
    for _ in 0..2 {
        let health = pipeline.tick_device("raid-0").await.unwrap();
        assert!(!health.policy.isolated);
    }
    let health = pipeline.tick_device("raid-0").await.unwrap();
    assert!(health.policy.isolated);
    assert_eq!(health.policy.consecutive_subhealth_ticks, 3);
}
