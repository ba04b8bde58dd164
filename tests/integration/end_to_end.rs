// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! End-to-end scenario wiring Policy Loader, Periodic Materializer,
//! Placement Engine and Reconciler together against [`InMemoryUpsf`],
//! mirroring what the Supervisor does at startup (spec.md §4.7).

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use scm::gateway::memory::InMemoryUpsf;
use scm::gateway::UpsfGateway;
use scm::materializer::PeriodicMaterializer;
use scm::model::{Sgup, Shard};
use scm::placement::PlacementDefaults;
use scm::reconciler::Reconciler;
use tokio_util::sync::CancellationToken;

fn defaults() -> PlacementDefaults {
    PlacementDefaults {
        default_required_quality: 1000,
        default_required_service_groups: vec!["basic-internet".to_string()],
    }
}

fn write_policy(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("create temp policy file");
    write!(f, "{contents}").expect("write policy file");
    f
}

/// Materialization followed by bootstrap placement places a declared
/// default session context exactly as the Supervisor would at startup.
#[tokio::test]
async fn materialize_then_bootstrap_places_declared_context() {
    let policy = write_policy(
        "upsf:\n  sessionContexts:\n    - name: sub1\n      circuitId: \"c1\"\n      \
         remoteId: \"r1\"\n      requiredServiceGroups: [basic-internet]\n",
    );

    let mem = InMemoryUpsf::new();
    mem.put_sgup(Sgup {
        name: "A".to_string(),
        supported_service_groups: ["basic-internet".to_string()].into_iter().collect(),
        max_session_count: 100,
        allocated_session_count: 0,
    });
    mem.put_shard(Shard {
        name: "X".to_string(),
        desired_sgup: "A".to_string(),
        max_session_count: 50,
        allocated_session_count: 0,
    });
    let gateway: Arc<dyn UpsfGateway> = Arc::new(mem);

    let materializer = PeriodicMaterializer::new(
        gateway.clone(),
        policy.path().to_path_buf(),
        Duration::from_secs(60),
    );
    materializer.materialize_once().await;

    let contexts = gateway.list_session_contexts().await.unwrap();
    assert_eq!(contexts.len(), 1);

    // Re-materializing must not duplicate the entry (Invariant 5).
    materializer.materialize_once().await;
    assert_eq!(gateway.list_session_contexts().await.unwrap().len(), 1);

    let reconciler = Reconciler::new(gateway.clone(), defaults());
    let stop = CancellationToken::new();
    stop.cancel(); // run() performs its bootstrap pass before checking stop
    reconciler.run(stop).await;

    let ctx = gateway.list_session_contexts().await.unwrap().remove(0);
    assert_eq!(ctx.desired_shard.as_deref(), Some("X"));
    assert_eq!(gateway.get_shard("X").await.unwrap().allocated_session_count, 1);
    assert_eq!(gateway.get_sgup("A").await.unwrap().allocated_session_count, 1);
}

/// S6: a live watch-driven shard event triggers a full re-map while the
/// Reconciler's loop is actually running (not just its bootstrap pass). A
/// second context needs an SGUP that is orphaned (hosted by no shard) at
/// bootstrap, so it stays unplaced (Invariant 6) until a shard pointing at
/// that SGUP appears and a Shard event fires, at which point only the
/// still-unplaced context is re-mapped (Invariant 2 protects the first).
#[tokio::test]
async fn watch_driven_shard_event_remaps_unplaced_contexts() {
    let mem = Arc::new(InMemoryUpsf::new());
    mem.put_sgup(Sgup {
        name: "A".to_string(),
        supported_service_groups: ["basic-internet".to_string()].into_iter().collect(),
        max_session_count: 100,
        allocated_session_count: 0,
    });
    mem.put_sgup(Sgup {
        name: "B".to_string(),
        supported_service_groups: ["premium".to_string()].into_iter().collect(),
        max_session_count: 100,
        allocated_session_count: 0,
    }); // orphan until shard Y appears below
    mem.put_shard(Shard {
        name: "X".to_string(),
        desired_sgup: "A".to_string(),
        max_session_count: 50,
        allocated_session_count: 0,
    });
    mem.put_session_context(scm::model::SessionContext {
        name: "ctx1".to_string(),
        filter: Default::default(),
        circuit_id: String::new(),
        remote_id: String::new(),
        required_service_groups: vec!["basic-internet".to_string()],
        required_quality: 0,
        desired_shard: None,
        current_state: Default::default(),
        derived_state: Default::default(),
        description: String::new(),
    });
    mem.put_session_context(scm::model::SessionContext {
        name: "ctx2".to_string(),
        filter: Default::default(),
        circuit_id: String::new(),
        remote_id: String::new(),
        required_service_groups: vec!["premium".to_string()],
        required_quality: 0,
        desired_shard: None,
        current_state: Default::default(),
        derived_state: Default::default(),
        description: String::new(),
    });
    let gateway: Arc<dyn UpsfGateway> = mem.clone();

    let reconciler = Arc::new(Reconciler::new(gateway.clone(), defaults()));
    let stop = CancellationToken::new();

    let run_handle = {
        let reconciler = reconciler.clone();
        let stop = stop.clone();
        tokio::spawn(async move { reconciler.run(stop).await })
    };

    // Give the bootstrap pass time to run: ctx1 places on X, ctx2 stays
    // unplaced (B is still an orphan).
    tokio::time::sleep(Duration::from_millis(50)).await;
    let ctx2_after_bootstrap = gateway
        .list_session_contexts()
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "ctx2")
        .unwrap();
    assert_eq!(ctx2_after_bootstrap.desired_shard, None);

    // A shard appears pointing at B, then fires a Shard watch event.
    mem.put_shard(Shard {
        name: "Y".to_string(),
        desired_sgup: "B".to_string(),
        max_session_count: 50,
        allocated_session_count: 0,
    });
    gateway
        .update_shard(
            "Y",
            scm::model::ShardUpdate {
                allocated_session_count: Some(0),
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    stop.cancel();
    run_handle.await.unwrap();

    let contexts = gateway.list_session_contexts().await.unwrap();
    let ctx1 = contexts.iter().find(|c| c.name == "ctx1").unwrap();
    let ctx2 = contexts.iter().find(|c| c.name == "ctx2").unwrap();
    assert_eq!(ctx1.desired_shard.as_deref(), Some("X"));
    assert_eq!(ctx2.desired_shard.as_deref(), Some("Y"));
}
