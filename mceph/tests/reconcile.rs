//! Reconciler behavior over a scripted control plane.
//!
//! Every test drives a reconciler against canned command output and
//! asserts on the exact command sequence sent to the cluster tools.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mceph::audit::{AuditLog, MemorySink};
use mceph::auth::{AuthReconciler, EntitySpec, EntityState};
use mceph::client::{ClusterClient, ClusterConn};
use mceph::image::{ImageReconciler, ImageSpec};
use mceph::pool::{PoolReconciler, PoolSpec};
use mceph::reconcile::{Reconcile, ReconcileError};
use mceph::status::cluster_status;
use mceph::test_util::{Response, ScriptedRunner};

fn scripted_client(responses: Vec<Response>) -> (Arc<ScriptedRunner>, Arc<ClusterClient>) {
    let runner = Arc::new(ScriptedRunner::new(responses));
    let client = Arc::new(ClusterClient::with_runner(
        ClusterConn::default(),
        runner.clone(),
    ));
    (runner, client)
}

fn pool_spec() -> PoolSpec {
    PoolSpec {
        name: "test-pool".to_string(),
        pg_num: 32,
        pgp_num: Some(32),
        size: Some(3),
        min_size: Some(2),
        pool_type: None,
        crush_rule: None,
    }
}

fn entity_spec() -> EntitySpec {
    EntitySpec {
        name: "client.backup".to_string(),
        caps: BTreeMap::from([
            ("mon".to_string(), "allow r".to_string()),
            ("osd".to_string(), "allow rw pool=rbd".to_string()),
        ]),
    }
}

fn image_spec() -> ImageSpec {
    ImageSpec {
        name: "img".to_string(),
        pool: "rbd".to_string(),
        size: "1G".to_string(),
        features: BTreeSet::new(),
    }
}

// === Pools ===

#[tokio::test]
async fn pool_create_issues_create_then_property_sets() {
    let (runner, client) = scripted_client(vec![
        Response::ok("pool 'test-pool' created\n"),
        Response::ok("set pool 1 size to 3\n"),
        Response::ok("set pool 1 min_size to 2\n"),
    ]);
    let sink = Arc::new(MemorySink::default());
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new(sink.clone())));

    let state = pools.create(&pool_spec()).await.unwrap();

    assert_eq!(
        runner.command_lines(),
        vec![
            "ceph osd pool create test-pool 32 32 replicated",
            "ceph osd pool set test-pool size 3",
            "ceph osd pool set test-pool min_size 2",
        ]
    );
    assert_eq!(state.size, Some(3));
    assert_eq!(state.min_size, Some(2));
    assert_eq!(sink.messages(), vec!["Pool 'test-pool' created".to_string()]);
}

#[tokio::test]
async fn pool_create_defaults_pgp_num_and_type() {
    let (runner, client) = scripted_client(vec![Response::ok("")]);
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let spec = PoolSpec {
        name: "bare".to_string(),
        pg_num: 16,
        pgp_num: None,
        size: None,
        min_size: None,
        pool_type: None,
        crush_rule: None,
    };
    pools.create(&spec).await.unwrap();

    assert_eq!(
        runner.command_lines(),
        vec!["ceph osd pool create bare 16 16 replicated"]
    );
}

#[tokio::test]
async fn pool_create_names_the_failing_property() {
    let (runner, client) = scripted_client(vec![
        Response::ok(""),
        Response::fail("Error EINVAL: bad size"),
    ]);
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let err = pools.create(&pool_spec()).await.unwrap_err();

    // Aborted after the failing follow-up; min_size was never attempted.
    assert_eq!(runner.calls().len(), 2);
    match err {
        ReconcileError::SetProperty { property, .. } => assert_eq!(property, "size"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn pool_update_issues_only_drifted_sets() {
    let (runner, client) = scripted_client(vec![Response::ok(""), Response::ok("")]);
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let mut spec = pool_spec();
    spec.size = Some(2);
    spec.min_size = Some(1);
    let prior = pool_spec(); // size 3, min_size 2

    let state = pools.update(&spec, &prior).await.unwrap();

    assert_eq!(
        runner.command_lines(),
        vec![
            "ceph osd pool set test-pool size 2",
            "ceph osd pool set test-pool min_size 1",
        ]
    );
    assert_eq!(state.size, Some(2));
    assert_eq!(state.min_size, Some(1));
}

#[tokio::test]
async fn pool_update_converged_issues_no_commands() {
    let (runner, client) = scripted_client(vec![]);
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let spec = pool_spec();
    pools.update(&spec, &spec.clone()).await.unwrap();

    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn pool_delete_double_confirms_every_name() {
    for name in ["test-pool", "pool.with-special_chars%40"] {
        let (runner, client) = scripted_client(vec![Response::ok("")]);
        let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

        let mut prior = pool_spec();
        prior.name = name.to_string();
        pools.delete(&prior).await.unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![format!(
                "ceph osd pool delete {} {} --yes-i-really-really-mean-it",
                name, name
            )]
        );
    }
}

#[tokio::test]
async fn pool_observe_parses_properties_and_retains_the_rest() {
    let (runner, client) = scripted_client(vec![
        Response::ok("size: 3\npg_num: 64\nnot a property line\n"),
        Response::ok("type: replicated\n"),
    ]);
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let prior = pool_spec(); // min_size 2 in prior state
    let state = pools.observe(&prior).await.unwrap().unwrap();

    assert_eq!(
        runner.command_lines(),
        vec![
            "ceph osd pool get test-pool all",
            "ceph osd pool get test-pool type",
        ]
    );
    assert_eq!(state.size, Some(3));
    assert_eq!(state.pg_num, 64);
    assert_eq!(state.pool_type, Some("replicated".to_string()));
    // Absent from output: prior value retained, not nulled out.
    assert_eq!(state.min_size, Some(2));
}

#[tokio::test]
async fn pool_observe_absent_pool() {
    let (_, client) = scripted_client(vec![Response::fail(
        "Error ENOENT: unrecognized pool 'test-pool'",
    )]);
    let pools = PoolReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let observed = pools.observe(&pool_spec()).await.unwrap();
    assert!(observed.is_none());
}

// === Auth entities ===

#[tokio::test]
async fn auth_create_sends_full_capability_set_and_collects_secret() {
    let (runner, client) = scripted_client(vec![Response::ok(
        "[client.backup]\n\tkey = AQDLqFNkAAAAABAA5ZZkx2Q0T1hJdA==\n",
    )]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let state = entities.create(&entity_spec()).await.unwrap();

    assert_eq!(
        runner.command_lines(),
        vec!["ceph auth get-or-create client.backup mon allow r osd allow rw pool=rbd"]
    );
    assert_eq!(
        state.key.as_deref(),
        Some("AQDLqFNkAAAAABAA5ZZkx2Q0T1hJdA==")
    );
}

#[tokio::test]
async fn auth_observe_absent_on_entity_marker_only() {
    let prior = EntityState {
        name: "client.backup".to_string(),
        caps: entity_spec().caps,
        key: Some("secret".to_string()),
    };

    let (_, client) = scripted_client(vec![Response::fail(
        "Error ENOENT: failed to find client.backup; entity does not exist",
    )]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));
    assert!(entities.observe(&prior).await.unwrap().is_none());

    // Any other failure surfaces as an error, not absence.
    let (_, client) = scripted_client(vec![Response::fail("connection refused")]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));
    assert!(entities.observe(&prior).await.is_err());
}

#[tokio::test]
async fn auth_observe_listing_without_entity_is_absent() {
    let prior = EntityState {
        name: "client.backup".to_string(),
        caps: BTreeMap::new(),
        key: None,
    };

    let (_, client) = scripted_client(vec![Response::ok("installed auth entries:\n")]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));
    assert!(entities.observe(&prior).await.unwrap().is_none());

    let (_, client) = scripted_client(vec![Response::ok("[client.backup]\n\tkey = abc\n")]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));
    let observed = entities.observe(&prior).await.unwrap().unwrap();
    assert_eq!(observed, prior);
}

#[tokio::test]
async fn auth_update_replaces_caps_and_keeps_secret() {
    let (runner, client) = scripted_client(vec![Response::ok("")]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let mut spec = entity_spec();
    spec.caps
        .insert("mgr".to_string(), "allow r".to_string());
    let prior = EntityState {
        name: spec.name.clone(),
        caps: entity_spec().caps,
        key: Some("AQDLqFNk==".to_string()),
    };

    let state = entities.update(&spec, &prior).await.unwrap();

    assert_eq!(
        runner.command_lines(),
        vec!["ceph auth caps client.backup mgr allow r mon allow r osd allow rw pool=rbd"]
    );
    assert_eq!(state.key.as_deref(), Some("AQDLqFNk=="));
}

#[tokio::test]
async fn auth_update_converged_issues_no_commands() {
    let (runner, client) = scripted_client(vec![]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let spec = entity_spec();
    let prior = EntityState {
        name: spec.name.clone(),
        caps: spec.caps.clone(),
        key: Some("secret".to_string()),
    };

    let state = entities.update(&spec, &prior).await.unwrap();

    assert!(runner.calls().is_empty());
    assert_eq!(state.key.as_deref(), Some("secret"));
}

#[tokio::test]
async fn auth_delete_has_no_confirmation_token() {
    let (runner, client) = scripted_client(vec![Response::ok("")]);
    let entities = AuthReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let prior = EntityState {
        name: "client.backup".to_string(),
        caps: BTreeMap::new(),
        key: None,
    };
    entities.delete(&prior).await.unwrap();

    assert_eq!(runner.command_lines(), vec!["ceph auth del client.backup"]);
}

// === Block images ===

#[tokio::test]
async fn image_create_feature_suffix_only_when_present() {
    let (runner, client) = scripted_client(vec![Response::ok("")]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));
    images.create(&image_spec()).await.unwrap();
    assert_eq!(runner.command_lines(), vec!["rbd create --size 1G rbd/img"]);

    let (runner, client) = scripted_client(vec![Response::ok("")]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));
    let mut spec = image_spec();
    spec.features = BTreeSet::from(["layering".to_string()]);
    images.create(&spec).await.unwrap();
    assert_eq!(
        runner.command_lines(),
        vec!["rbd create --size 1G rbd/img --image-feature layering"]
    );
}

#[tokio::test]
async fn image_observe_normalizes_size_to_bytes() {
    let (runner, client) = scripted_client(vec![Response::ok(r#"{"size": 1073741824}"#)]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let state = images.observe(&image_spec()).await.unwrap().unwrap();

    assert_eq!(
        runner.command_lines(),
        vec!["rbd info rbd/img --format json"]
    );
    assert_eq!(state.size, "1073741824B");
    // Features are never read back; the prior set rides along.
    assert!(state.features.is_empty());
}

#[tokio::test]
async fn image_observe_missing_size_keeps_prior_value() {
    let (_, client) = scripted_client(vec![Response::ok(r#"{"name": "img"}"#)]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let state = images.observe(&image_spec()).await.unwrap().unwrap();
    assert_eq!(state.size, "1G");
}

#[tokio::test]
async fn image_observe_absent_image() {
    let (_, client) = scripted_client(vec![Response::fail(
        "rbd: error opening image img: (2) No such file or directory",
    )]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));

    assert!(images.observe(&image_spec()).await.unwrap().is_none());
}

#[tokio::test]
async fn image_update_resizes_only_on_drift() {
    let (runner, client) = scripted_client(vec![Response::ok("Resizing image: 100% complete\n")]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));

    let mut spec = image_spec();
    spec.size = "2G".to_string();
    let prior = image_spec(); // 1G

    let state = images.update(&spec, &prior).await.unwrap();
    assert_eq!(
        runner.command_lines(),
        vec!["rbd resize --size 2G rbd/img"]
    );
    assert_eq!(state.size, "2G");

    let (runner, client) = scripted_client(vec![]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));
    images.update(&prior.clone(), &prior).await.unwrap();
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn image_delete_removes_by_path() {
    let (runner, client) = scripted_client(vec![Response::ok("")]);
    let images = ImageReconciler::new(client, Arc::new(AuditLog::new_noop()));

    images.delete(&image_spec()).await.unwrap();
    assert_eq!(runner.command_lines(), vec!["rbd rm rbd/img"]);
}

// === Cluster status ===

#[tokio::test]
async fn cluster_status_aggregates_counts() {
    let status_doc = r#"{
        "health": {"status": "HEALTH_OK"},
        "servicemap": {
            "services": {
                "osd": {"daemons": {"0": {}, "1": {}, "2": {}}},
                "mon": {"daemons": {"a": {}}},
                "mgr": {"daemons": {"x": {}, "y": {}}}
            }
        }
    }"#;
    let (runner, client) = scripted_client(vec![
        Response::ok(status_doc),
        Response::ok("rbd\ndata\nmetadata\n"),
    ]);

    let status = cluster_status(&client).await;

    assert_eq!(
        runner.command_lines(),
        vec!["ceph status --format json", "ceph osd pool ls"]
    );
    assert_eq!(status.health, "HEALTH_OK");
    assert_eq!(status.osd_count, 3);
    assert_eq!(status.mon_count, 1);
    assert_eq!(status.mgr_count, 2);
    assert_eq!(status.pool_count, 3);
    assert!(!status.sampled_at.is_empty());
}

#[tokio::test]
async fn cluster_status_zero_fills_failed_sub_queries() {
    let (_, client) = scripted_client(vec![
        Response::fail("monclient: unable to reach cluster"),
        Response::ok("rbd\n"),
    ]);

    let status = cluster_status(&client).await;

    assert_eq!(status.health, "");
    assert_eq!(status.osd_count, 0);
    assert_eq!(status.mon_count, 0);
    assert_eq!(status.mgr_count, 0);
    // The pool listing is independent of the failed status document.
    assert_eq!(status.pool_count, 1);
}
