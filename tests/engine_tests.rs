//! End-to-end tests for the assignment loop.
//!
//! These tests drive the full chain — watch notification, intake queue,
//! selection, binding commit, audit event — against the in-memory control
//! plane and verify the per-unit state machine: one bind attempt per
//! observation, terminal skips, and a loop that survives every per-unit
//! failure.


use std::time::Duration;

use placed::controlplane::BindFault;
use test_harness::{assert_eventually, node, unit, FixedPolicy, TestRig, TEST_ENGINE};

#[tokio::test]
async fn test_places_single_unit_end_to_end() {
    let rig = TestRig::start().await;

    for name in ["node-a", "node-b", "node-c"] {
        rig.control_plane.add_node(node(name)).await;
    }
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.mirror.snapshot().await.len() == 3 },
            Duration::from_secs(2),
            "mirror should see all three nodes",
        )
        .await;
    }

    assert!(rig.control_plane.submit_work_unit(unit("default", "unit-p")).await);

    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.control_plane.bindings().await.len() == 1 },
            Duration::from_secs(2),
            "exactly one binding should be committed",
        )
        .await;
        assert_eventually(
            || async move { rig.control_plane.events().await.len() == 1 },
            Duration::from_secs(2),
            "exactly one audit event should be recorded",
        )
        .await;
    }

    let bindings = rig.control_plane.bindings().await;
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].namespace, "default");
    assert_eq!(bindings[0].unit_name, "unit-p");
    assert!(
        ["node-a", "node-b", "node-c"].contains(&bindings[0].node_name.as_str()),
        "binding targets an unknown node: {}",
        bindings[0].node_name
    );
    assert_eq!(rig.control_plane.bind_attempts().await, 1);

    let events = rig.control_plane.events().await;
    assert_eq!(events[0].reason, "Scheduled");
    assert_eq!(events[0].kind, "Normal");
    assert_eq!(events[0].source, TEST_ENGINE);
    assert_eq!(events[0].involved.kind, "WorkUnit");
    assert_eq!(events[0].involved.name, "unit-p");
    assert!(
        events[0].message.contains(&bindings[0].node_name),
        "audit message should name the chosen node: {}",
        events[0].message
    );

    let placed_unit = rig
        .control_plane
        .work_unit("default", "unit-p")
        .await
        .expect("unit should still exist");
    assert_eq!(placed_unit.node_name.as_ref(), Some(&bindings[0].node_name));

    rig.shutdown().await;
}

#[tokio::test]
async fn test_each_observation_binds_exactly_once() {
    let rig = TestRig::start().await;
    rig.control_plane.add_node(node("node-a")).await;
    {
        let rig = &rig;
        assert_eventually(
            || async move { !rig.mirror.snapshot().await.is_empty() },
            Duration::from_secs(2),
            "mirror should see the node",
        )
        .await;
    }

    for i in 0..5 {
        assert!(
            rig.control_plane
                .submit_work_unit(unit("default", &format!("unit-{}", i)))
                .await
        );
    }

    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.stats.snapshot().bound == 5 },
            Duration::from_secs(2),
            "all five units should be bound",
        )
        .await;
    }

    assert_eq!(rig.control_plane.bind_attempts().await, 5);
    let bindings = rig.control_plane.bindings().await;
    let mut names: Vec<&str> = bindings.iter().map(|b| b.unit_name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["unit-0", "unit-1", "unit-2", "unit-3", "unit-4"]);

    rig.shutdown().await;
}

#[tokio::test]
async fn test_no_fit_drops_unit_and_loop_continues() {
    let rig = TestRig::start().await;

    // No nodes yet: the first unit must be dropped without a bind attempt.
    assert!(rig.control_plane.submit_work_unit(unit("default", "orphan")).await);
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.stats.snapshot().no_fit == 1 },
            Duration::from_secs(2),
            "unit should be skipped as no-fit",
        )
        .await;
    }
    assert_eq!(rig.control_plane.bind_attempts().await, 0);

    // The loop keeps going: once a node shows up, the next unit is placed.
    rig.control_plane.add_node(node("node-a")).await;
    {
        let rig = &rig;
        assert_eventually(
            || async move { !rig.mirror.snapshot().await.is_empty() },
            Duration::from_secs(2),
            "mirror should see the node",
        )
        .await;
    }
    assert!(rig.control_plane.submit_work_unit(unit("default", "second")).await);
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.control_plane.bindings().await.len() == 1 },
            Duration::from_secs(2),
            "second unit should be placed",
        )
        .await;
    }

    // The skipped unit stays terminal; nothing requeues it.
    let bindings = rig.control_plane.bindings().await;
    assert_eq!(bindings[0].unit_name, "second");
    let orphan = rig.control_plane.work_unit("default", "orphan").await;
    assert!(orphan.expect("orphan should still exist").node_name.is_none());

    rig.shutdown().await;
}

#[tokio::test]
async fn test_already_bound_unit_is_dropped_without_recording() {
    let rig = TestRig::start().await;
    rig.control_plane.add_node(node("node-a")).await;
    {
        let rig = &rig;
        assert_eventually(
            || async move { !rig.mirror.snapshot().await.is_empty() },
            Duration::from_secs(2),
            "mirror should see the node",
        )
        .await;
    }

    rig.control_plane.fail_next_bind(BindFault::AlreadyBound).await;
    assert!(rig.control_plane.submit_work_unit(unit("default", "contested")).await);
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.stats.snapshot().bind_conflicts == 1 },
            Duration::from_secs(2),
            "conflicting bind should be counted",
        )
        .await;
    }

    // No recorder call, no binding, and the loop moves on to the next unit.
    assert!(rig.control_plane.events().await.is_empty());
    assert!(rig.control_plane.bindings().await.is_empty());

    assert!(rig.control_plane.submit_work_unit(unit("default", "next")).await);
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.control_plane.bindings().await.len() == 1 },
            Duration::from_secs(2),
            "loop should keep processing after a conflict",
        )
        .await;
    }
    let events = rig.control_plane.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].involved.name, "next");

    rig.shutdown().await;
}

#[tokio::test]
async fn test_transient_bind_error_is_not_retried() {
    let rig = TestRig::start().await;
    rig.control_plane.add_node(node("node-a")).await;
    {
        let rig = &rig;
        assert_eventually(
            || async move { !rig.mirror.snapshot().await.is_empty() },
            Duration::from_secs(2),
            "mirror should see the node",
        )
        .await;
    }

    rig.control_plane
        .fail_next_bind(BindFault::Transient("gateway timeout".to_string()))
        .await;
    assert!(rig.control_plane.submit_work_unit(unit("default", "unlucky")).await);
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.stats.snapshot().bind_failures == 1 },
            Duration::from_secs(2),
            "transient failure should be counted",
        )
        .await;
    }

    // No retry in the baseline design: one attempt, then the unit is gone.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rig.control_plane.bind_attempts().await, 1);
    let unlucky = rig.control_plane.work_unit("default", "unlucky").await;
    assert!(unlucky.expect("unit should still exist").node_name.is_none());

    rig.shutdown().await;
}

#[tokio::test]
async fn test_record_failure_preserves_the_binding() {
    let rig = TestRig::start().await;
    rig.control_plane.add_node(node("node-a")).await;
    {
        let rig = &rig;
        assert_eventually(
            || async move { !rig.mirror.snapshot().await.is_empty() },
            Duration::from_secs(2),
            "mirror should see the node",
        )
        .await;
    }

    rig.control_plane.set_fail_events(true).await;
    assert!(rig.control_plane.submit_work_unit(unit("default", "quiet")).await);
    {
        let rig = &rig;
        assert_eventually(
            || async move {
                let stats = rig.stats.snapshot();
                stats.bound == 1 && stats.record_failures == 1
            },
            Duration::from_secs(2),
            "bind should succeed even though recording fails",
        )
        .await;
    }

    // The binding is authoritative; only the audit trail is missing.
    assert_eq!(rig.control_plane.bindings().await.len(), 1);
    assert!(rig.control_plane.events().await.is_empty());
    let placed_unit = rig.control_plane.work_unit("default", "quiet").await;
    assert!(placed_unit.expect("unit should still exist").is_placed());

    rig.shutdown().await;
}

#[tokio::test]
async fn test_injected_policy_overrides_random_selection() {
    let rig = TestRig::start_with_policy(Some(Box::new(FixedPolicy(0)))).await;

    // Snapshot order is by name, so index 0 is always node-a.
    for name in ["node-c", "node-a", "node-b"] {
        rig.control_plane.add_node(node(name)).await;
    }
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.mirror.snapshot().await.len() == 3 },
            Duration::from_secs(2),
            "mirror should see all three nodes",
        )
        .await;
    }

    for i in 0..3 {
        assert!(
            rig.control_plane
                .submit_work_unit(unit("default", &format!("pinned-{}", i)))
                .await
        );
    }
    {
        let rig = &rig;
        assert_eventually(
            || async move { rig.control_plane.bindings().await.len() == 3 },
            Duration::from_secs(2),
            "all units should be placed",
        )
        .await;
    }

    for binding in rig.control_plane.bindings().await {
        assert_eq!(binding.node_name, "node-a");
    }

    rig.shutdown().await;
}
