//! End-to-end lifecycle tests for the encryption state machine
//!
//! Drives `reconcile` against an in-memory object store, simulating the
//! configuration renderer, the API server rollout and the re-encryption job
//! between reconciles.

mod common;

use cluster_encryption_controller::constants::{
    CONDITION_ENCRYPTION_INITIALIZED, EVENT_REASON_RECONCILING_ERROR, SECRET_REVISION_LABEL,
};
use cluster_encryption_controller::controller::reconciler::KubeClient;
use cluster_encryption_controller::crd::{
    ClusterCondition, ClusterEncryptionPhase, ClusterEncryptionStatus, ClusterStatus,
    ConditionStatus,
};
use common::*;
use kube::runtime::controller::Action;
use std::collections::BTreeMap;
use std::time::Duration;

fn requeue() -> Action {
    Action::requeue(Duration::from_secs(10))
}

/// Walk a fresh cluster all the way to `Active` with key `k1`
async fn activate(h: &mut Harness) {
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    h.render_and_rollout();
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    h.kube.finish_jobs(1, 0);
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));
}

#[tokio::test]
async fn test_enable_encryption_on_fresh_cluster() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));

    // Initialization
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Pending));
    assert_eq!(h.initialized(), Some(ConditionStatus::True));
    assert_eq!(h.active_key().as_deref(), Some(""));

    // Configuration not rendered yet
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Pending));

    let revision = h.render_and_rollout();
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::EncryptionNeeded));

    assert_eq!(h.reconcile().await.unwrap(), requeue());
    let jobs = h.kube.jobs();
    assert_eq!(jobs.len(), 1);
    let labels = jobs[0].metadata.labels.clone().unwrap_or_default();
    assert_eq!(labels.get(SECRET_REVISION_LABEL), Some(&revision));

    // Job still running: no second job
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 1);
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::EncryptionNeeded));

    h.kube.finish_jobs(1, 0);
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));
    assert_eq!(h.active_key().as_deref(), Some("secretbox/k1"));
    let status = h.cluster.status.clone().unwrap();
    assert_eq!(
        status.encryption.unwrap().encrypted_resources,
        vec!["secrets".to_string()]
    );

    // Steady state writes nothing
    let patches = h.kube.status_patches();
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.kube.status_patches(), patches);
    assert_eq!(h.kube.jobs_created(), 1);

    assert_monotonic(&h.phases);
    assert!(h.events.events().is_empty());
}

#[tokio::test]
async fn test_disable_encryption_decrypts_and_tears_down() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));
    activate(&mut h).await;

    if let Some(config) = h.cluster.spec.encryption_configuration.as_mut() {
        config.enabled = false;
    }

    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Pending));

    // Secret still rendered from the enabled spec
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Pending));

    let revision = h.render_and_rollout();
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::EncryptionNeeded));

    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 2);
    let decrypt_job = h
        .kube
        .jobs()
        .into_iter()
        .find(|j| {
            j.metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(SECRET_REVISION_LABEL))
                == Some(&revision)
        })
        .expect("decryption job for the new revision");
    let command = decrypt_job
        .spec
        .and_then(|s| s.template.spec)
        .and_then(|s| s.containers.into_iter().next())
        .and_then(|c| c.command)
        .unwrap_or_default()
        .join(" ");
    assert!(command.contains("secrets"), "command was {command}");

    h.kube.finish_jobs(1, 0);
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));
    assert_eq!(h.active_key().as_deref(), Some("identity"));

    // Teardown
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), None);
    assert_eq!(h.initialized(), Some(ConditionStatus::False));

    // Nothing left to do
    let patches = h.kube.status_patches();
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.kube.status_patches(), patches);

    assert_monotonic(&h.phases);
}

#[tokio::test]
async fn test_key_rotation_reencrypts_with_new_primary() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));
    activate(&mut h).await;

    h.cluster.spec = secretbox_spec(true, &["k2", "k1"]);

    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Pending));
    // Still secretbox/k1 until the data is rewritten
    assert_eq!(h.active_key().as_deref(), Some("secretbox/k1"));

    h.render_and_rollout();
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::EncryptionNeeded));

    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 2);

    h.kube.finish_jobs(1, 0);
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));
    assert_eq!(h.active_key().as_deref(), Some("secretbox/k2"));

    assert_monotonic(&h.phases);
}

#[tokio::test]
async fn test_pending_without_changes_activates_without_job() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));
    h.seed_status(ClusterStatus {
        encryption: Some(ClusterEncryptionStatus {
            phase: ClusterEncryptionPhase::Pending,
            active_key: "secretbox/k1".to_string(),
            encrypted_resources: vec!["secrets".to_string()],
        }),
        conditions: BTreeMap::from([(
            "EncryptionInitialized".to_string(),
            ClusterCondition {
                status: ConditionStatus::True,
                last_transition_time: None,
                reason: None,
                message: None,
            },
        )]),
        ..Default::default()
    });
    h.render_and_rollout();

    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));
    assert_eq!(h.kube.jobs_created(), 0);
}

#[tokio::test]
async fn test_no_job_until_apiserver_runs_rerendered_configuration() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    h.render_and_rollout();
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::EncryptionNeeded));

    // Key changes before the job started; the renderer is faster than the rollout
    h.cluster.spec = secretbox_spec(true, &["k2", "k1"]);
    let old_revision = h
        .kube
        .get_secret(CLUSTER_NAMESPACE, "encryption-configuration")
        .await
        .unwrap()
        .and_then(|s| s.metadata.resource_version)
        .unwrap();
    let new_revision = h.render_configuration();

    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 0);
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::EncryptionNeeded));
    assert_eq!(h.active_key().as_deref(), Some(""));

    // Rollout halfway
    h.kube.set_apiserver_revisions(
        CLUSTER_NAMESPACE,
        &[new_revision.as_str(), old_revision.as_str(), new_revision.as_str()],
    );
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 0);

    h.kube.rollout_apiserver(CLUSTER_NAMESPACE, 3, &new_revision);
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 1);
    let labels = h.kube.jobs()[0].metadata.labels.clone().unwrap_or_default();
    assert_eq!(labels.get(SECRET_REVISION_LABEL), Some(&new_revision));

    h.kube.finish_jobs(1, 0);
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));
    assert_eq!(h.active_key().as_deref(), Some("secretbox/k2"));

    assert_monotonic(&h.phases);
}

#[tokio::test]
async fn test_stale_status_write_conflicts_and_keeps_foreign_conditions() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));
    activate(&mut h).await;

    // Another controller updates the status; our snapshot is now stale
    h.kube.update_status(CLUSTER_NAME, |status| {
        status.conditions.insert(
            "ControlPlaneHealthy".to_string(),
            ClusterCondition {
                status: ConditionStatus::True,
                last_transition_time: None,
                reason: None,
                message: None,
            },
        );
    });
    h.cluster.spec = secretbox_spec(true, &["k2", "k1"]);
    let patches = h.kube.status_patches();

    let err = h.reconcile().await.unwrap_err();
    assert_eq!(err.kind(), "kube");
    assert_eq!(h.kube.status_patches(), patches);
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Active));

    // Retried against the fresh object
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Pending));
    let (_, stored) = h.kube.cluster_state(CLUSTER_NAME).unwrap();
    assert_eq!(
        stored.conditions["ControlPlaneHealthy"].status,
        ConditionStatus::True
    );
    assert_eq!(
        stored.conditions[CONDITION_ENCRYPTION_INITIALIZED].status,
        ConditionStatus::True
    );
}

#[tokio::test]
async fn test_failed_job_is_terminal() {
    let mut h = Harness::new(secretbox_spec(true, &["k1"]));
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    h.render_and_rollout();
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.reconcile().await.unwrap(), requeue());
    assert_eq!(h.kube.jobs_created(), 1);

    h.kube.finish_jobs(0, 1);
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Failed));

    // No retry
    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.phase(), Some(ClusterEncryptionPhase::Failed));
    assert_eq!(h.kube.jobs_created(), 1);

    assert_monotonic(&h.phases);
}

#[tokio::test]
async fn test_invalid_key_length_reports_warning_event() {
    let mut h = Harness::with_key(secretbox_spec(true, &["k1"]), &key_of_len(16));

    let err = h.reconcile().await.unwrap_err();
    assert_eq!(err.kind(), "validation");

    assert_eq!(h.kube.status_patches(), 0);
    assert_eq!(h.phase(), None);

    let events = h.events.events();
    assert_eq!(events.len(), 1);
    assert!(is_warning(&events[0]));
    assert_eq!(events[0].reason, EVENT_REASON_RECONCILING_ERROR);
    assert!(events[0].note.as_deref().unwrap_or_default().contains("k1"));
}

#[tokio::test]
async fn test_paused_cluster_is_left_alone() {
    let mut spec = secretbox_spec(true, &["k1"]);
    spec.pause = true;
    let mut h = Harness::new(spec);

    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.kube.status_patches(), 0);
    assert_eq!(h.phase(), None);
}

#[tokio::test]
async fn test_cluster_without_encryption_is_ignored() {
    let mut h = Harness::new(secretbox_spec(false, &["k1"]));

    assert_eq!(h.reconcile().await.unwrap(), Action::await_change());
    assert_eq!(h.kube.status_patches(), 0);
    assert!(h.kube.jobs().is_empty());
}
