//! Common test utilities for the encryption lifecycle tests
//!
//! Provides an in-memory object store standing in for the API server, an
//! Event recorder, and helpers that play the part of the subsystems this
//! controller cooperates with (configuration rendering, API server rollout,
//! job execution).

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cluster_encryption_controller::config::ControllerConfig;
use cluster_encryption_controller::constants::{
    CONDITION_ENCRYPTION_INITIALIZED, ENCRYPTION_SECRET_REVISION_LABEL,
};
use cluster_encryption_controller::controller::encryption_config;
use cluster_encryption_controller::controller::reconciler::status::ClusterStatusPatch;
use cluster_encryption_controller::controller::reconciler::{
    reconcile, EventPublisher, KubeClient, Reconciler, ReconcilerError,
};
use cluster_encryption_controller::crd::{
    Cluster, ClusterEncryptionPhase, ClusterSpec, ClusterStatus, ConditionStatus,
    EncryptionConfiguration, SecretKeyRef, SecretboxEncryptionConfiguration, SecretboxKey,
};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::{ObjectReference, Pod, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const CLUSTER_NAME: &str = "c1";
pub const CLUSTER_NAMESPACE: &str = "cluster-c1";
pub const KEY_SECRET_NAME: &str = "encryption-key";
pub const KEY_SECRET_DATA_KEY: &str = "key";

#[derive(Debug, Default, Clone)]
struct StoredCluster {
    resource_version: u64,
    status: ClusterStatus,
}

#[derive(Debug, Default)]
struct Store {
    secrets: BTreeMap<(String, String), Secret>,
    pods: BTreeMap<String, Vec<Pod>>,
    jobs: Vec<Job>,
    clusters: BTreeMap<String, StoredCluster>,
    status_patches: usize,
    jobs_created: usize,
    next_resource_version: u64,
}

/// In-memory object store implementing the controller's client seam
#[derive(Debug, Default)]
pub struct FakeKube {
    store: Mutex<Store>,
}

fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|term| {
        let value = |key: &str| labels.and_then(|l| l.get(key));
        match term.split_once('=') {
            Some((key, expected)) => value(key).map(String::as_str) == Some(expected),
            None => value(term).is_some(),
        }
    })
}

impl FakeKube {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a Secret, assigning it a new resourceVersion; returns that version
    pub fn put_secret(&self, namespace: &str, mut secret: Secret) -> String {
        let mut store = self.store.lock().unwrap();
        store.next_resource_version += 1;
        let revision = store.next_resource_version.to_string();
        secret.metadata.namespace = Some(namespace.to_string());
        secret.metadata.resource_version = Some(revision.clone());
        let name = secret.name_any();
        store.secrets.insert((namespace.to_string(), name), secret);
        revision
    }

    /// Replace the apiserver pods of a namespace, each labelled with `revision`
    pub fn rollout_apiserver(&self, namespace: &str, replicas: usize, revision: &str) {
        self.set_apiserver_revisions(namespace, &vec![revision; replicas]);
    }

    /// Replace the apiserver pods of a namespace, one pod per given revision
    pub fn set_apiserver_revisions(&self, namespace: &str, revisions: &[&str]) {
        let pods = revisions
            .iter()
            .enumerate()
            .map(|(i, revision)| Pod {
                metadata: ObjectMeta {
                    name: Some(format!("apiserver-{i}")),
                    namespace: Some(namespace.to_string()),
                    labels: Some(BTreeMap::from([
                        ("app".to_string(), "apiserver".to_string()),
                        (
                            ENCRYPTION_SECRET_REVISION_LABEL.to_string(),
                            (*revision).to_string(),
                        ),
                    ])),
                    ..Default::default()
                },
                ..Default::default()
            })
            .collect();
        self.store
            .lock()
            .unwrap()
            .pods
            .insert(namespace.to_string(), pods);
    }

    /// Mark every job as finished with the given counters
    pub fn finish_jobs(&self, succeeded: i32, failed: i32) {
        for job in &mut self.store.lock().unwrap().jobs {
            job.status = Some(JobStatus {
                succeeded: Some(succeeded),
                failed: Some(failed),
                ..Default::default()
            });
        }
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.store.lock().unwrap().jobs.clone()
    }

    pub fn jobs_created(&self) -> usize {
        self.store.lock().unwrap().jobs_created
    }

    pub fn status_patches(&self) -> usize {
        self.store.lock().unwrap().status_patches
    }

    /// Stored status and resourceVersion of a cluster
    pub fn cluster_state(&self, name: &str) -> Option<(String, ClusterStatus)> {
        self.store
            .lock()
            .unwrap()
            .clusters
            .get(name)
            .map(|c| (c.resource_version.to_string(), c.status.clone()))
    }

    /// Change a cluster status the way another controller would
    pub fn update_status<F: FnOnce(&mut ClusterStatus)>(&self, name: &str, mutate: F) {
        let mut store = self.store.lock().unwrap();
        let cluster = store.clusters.entry(name.to_string()).or_default();
        mutate(&mut cluster.status);
        cluster.resource_version += 1;
    }
}

#[async_trait]
impl KubeClient for FakeKube {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ReconcilerError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, ReconcilerError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .pods
            .get(namespace)
            .map(|pods| {
                pods.iter()
                    .filter(|p| matches_selector(p.metadata.labels.as_ref(), label_selector))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Job>, ReconcilerError> {
        Ok(self
            .store
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| j.metadata.namespace.as_deref() == Some(namespace))
            .filter(|j| matches_selector(j.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ReconcilerError> {
        let mut store = self.store.lock().unwrap();
        store.jobs_created += 1;
        let mut job = job.clone();
        job.metadata.name = Some(format!(
            "{}{}",
            job.metadata.generate_name.clone().unwrap_or_default(),
            store.jobs_created
        ));
        job.metadata.namespace = Some(namespace.to_string());
        store.jobs.push(job.clone());
        Ok(job)
    }

    async fn patch_cluster_status(
        &self,
        name: &str,
        patch: &ClusterStatusPatch,
    ) -> Result<(), ReconcilerError> {
        let mut store = self.store.lock().unwrap();
        let cluster = store.clusters.entry(name.to_string()).or_default();
        if let Some(expected) = patch.resource_version.as_deref() {
            if expected != cluster.resource_version.to_string() {
                return Err(ReconcilerError::Kube(kube::Error::Api(
                    kube::core::ErrorResponse {
                        status: "Failure".to_string(),
                        message: format!(
                            "the object has been modified; expected resourceVersion {expected}"
                        ),
                        reason: "Conflict".to_string(),
                        code: 409,
                    },
                )));
            }
        }
        patch.apply_to(&mut cluster.status);
        cluster.resource_version += 1;
        store.status_patches += 1;
        Ok(())
    }
}

/// Recorded Event
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub type_: EventType,
    pub reason: String,
    pub note: Option<String>,
}

/// Event publisher that keeps every Event in memory
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}

/// Base64 encoding of a key of `len` bytes
pub fn key_of_len(len: usize) -> String {
    STANDARD.encode(vec![0x42u8; len])
}

/// Spec of a cluster encrypting `secrets` with secretbox keys backed by a Secret
pub fn secretbox_spec(enabled: bool, key_names: &[&str]) -> ClusterSpec {
    ClusterSpec {
        pause: false,
        encryption_configuration: Some(EncryptionConfiguration {
            enabled,
            resources: vec!["secrets".to_string()],
            secretbox: Some(SecretboxEncryptionConfiguration {
                keys: key_names
                    .iter()
                    .map(|name| SecretboxKey {
                        name: (*name).to_string(),
                        value: None,
                        secret_ref: Some(SecretKeyRef {
                            name: KEY_SECRET_NAME.to_string(),
                            key: KEY_SECRET_DATA_KEY.to_string(),
                        }),
                    })
                    .collect(),
            }),
            kms: None,
        }),
    }
}

/// Test harness: fake store, recorder, reconciler context and the cluster
/// as the controller would observe it
pub struct Harness {
    pub kube: Arc<FakeKube>,
    pub events: Arc<RecordingEvents>,
    pub ctx: Arc<Reconciler>,
    pub cluster: Cluster,
    pub phases: Vec<Option<ClusterEncryptionPhase>>,
}

impl Harness {
    /// A cluster with a valid key Secret in its namespace
    pub fn new(spec: ClusterSpec) -> Self {
        Self::with_key(spec, &key_of_len(32))
    }

    pub fn with_key(spec: ClusterSpec, encoded_key: &str) -> Self {
        let kube = FakeKube::new();
        let events = RecordingEvents::new();
        kube.put_secret(
            CLUSTER_NAMESPACE,
            Secret {
                metadata: ObjectMeta {
                    name: Some(KEY_SECRET_NAME.to_string()),
                    ..Default::default()
                },
                data: Some(BTreeMap::from([(
                    KEY_SECRET_DATA_KEY.to_string(),
                    ByteString(encoded_key.as_bytes().to_vec()),
                )])),
                ..Default::default()
            },
        );
        let ctx = Arc::new(Reconciler::with_clients(
            Arc::clone(&kube) as Arc<dyn KubeClient>,
            Arc::clone(&events) as Arc<dyn EventPublisher>,
            ControllerConfig::default(),
        ));
        let mut cluster = Cluster::new(CLUSTER_NAME, spec);
        cluster.metadata.uid = Some("c1-uid".to_string());
        Self {
            kube,
            events,
            ctx,
            cluster,
            phases: Vec::new(),
        }
    }

    /// Run one reconcile and observe the resulting status
    pub async fn reconcile(&mut self) -> Result<Action, ReconcilerError> {
        let result = reconcile(Arc::new(self.cluster.clone()), Arc::clone(&self.ctx)).await;
        self.refresh();
        let phase = self.phase();
        if self.phases.last() != Some(&phase) {
            self.phases.push(phase);
        }
        result
    }

    /// Observe the stored cluster, as the watch cache would
    pub fn refresh(&mut self) {
        if let Some((resource_version, status)) = self.kube.cluster_state(CLUSTER_NAME) {
            self.cluster.metadata.resource_version = Some(resource_version);
            self.cluster.status = Some(status);
        }
    }

    /// Start from an existing status
    pub fn seed_status(&mut self, status: ClusterStatus) {
        self.kube.update_status(CLUSTER_NAME, |s| *s = status);
        self.refresh();
    }

    pub fn phase(&self) -> Option<ClusterEncryptionPhase> {
        self.cluster
            .status
            .as_ref()
            .and_then(|s| s.encryption.as_ref())
            .map(|e| e.phase)
    }

    pub fn active_key(&self) -> Option<String> {
        self.cluster
            .status
            .as_ref()
            .and_then(|s| s.encryption.as_ref())
            .map(|e| e.active_key.clone())
    }

    pub fn initialized(&self) -> Option<ConditionStatus> {
        self.cluster
            .status
            .as_ref()
            .and_then(|s| s.conditions.get(CONDITION_ENCRYPTION_INITIALIZED))
            .map(|c| c.status)
    }

    /// Render the encryption configuration for the current spec, as the
    /// resources subsystem would; returns the new secret revision
    pub fn render_configuration(&self) -> String {
        let resolved = BTreeMap::from([
            ("k1".to_string(), key_of_len(32)),
            ("k2".to_string(), key_of_len(32)),
        ]);
        let rendered = encryption_config::render(&self.cluster, &resolved)
            .unwrap()
            .expect("cluster should have a rendered configuration");
        let secret = encryption_config::build_secret(&self.cluster, &rendered).unwrap();
        self.kube.put_secret(CLUSTER_NAMESPACE, secret)
    }

    /// Render the configuration and roll the API server out onto it
    pub fn render_and_rollout(&self) -> String {
        let revision = self.render_configuration();
        self.kube.rollout_apiserver(CLUSTER_NAMESPACE, 3, &revision);
        revision
    }
}

/// Whether `from -> to` is a legal phase transition under normal operation
pub fn is_allowed_transition(
    from: Option<ClusterEncryptionPhase>,
    to: Option<ClusterEncryptionPhase>,
) -> bool {
    use ClusterEncryptionPhase::{Active, EncryptionNeeded, Failed, Pending};
    matches!(
        (from, to),
        (None, Some(Pending))
            | (Some(Pending), Some(Pending | EncryptionNeeded | Active))
            | (Some(EncryptionNeeded), Some(EncryptionNeeded | Active | Failed))
            | (Some(Active), Some(Active | Pending) | None)
            | (Some(Failed), Some(Failed))
    )
}

pub fn assert_monotonic(phases: &[Option<ClusterEncryptionPhase>]) {
    let mut previous = None;
    for phase in phases {
        assert!(
            is_allowed_transition(previous, *phase),
            "illegal phase transition {previous:?} -> {phase:?} in {phases:?}"
        );
        previous = *phase;
    }
}

pub fn is_warning(event: &RecordedEvent) -> bool {
    event.type_ == EventType::Warning
}
