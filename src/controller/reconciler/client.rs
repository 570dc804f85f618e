//! # Kubernetes Client
//!
//! The object store seam of the controller. The encryption state machine only
//! needs a handful of reads and writes, collected in [`KubeClient`] so that
//! tests can substitute mocks or in-memory fakes for the API server.

use crate::controller::reconciler::status::ClusterStatusPatch;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::Cluster;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Trait abstracting the Kubernetes operations used by the reconciler
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a Secret, returning `None` when it does not exist
    async fn get_secret(&self, namespace: &str, name: &str)
        -> Result<Option<Secret>, ReconcilerError>;

    /// List Pods in a namespace matching a label selector
    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, ReconcilerError>;

    /// List Jobs in a namespace matching a label selector
    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Job>, ReconcilerError>;

    /// Create a Job
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ReconcilerError>;

    /// Merge-patch the owned status fields of a Cluster
    ///
    /// Fails with a 409 conflict when the patch carries a stale
    /// `resourceVersion`.
    async fn patch_cluster_status(
        &self,
        name: &str,
        patch: &ClusterStatusPatch,
    ) -> Result<(), ReconcilerError>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    field_manager: String,
}

impl std::fmt::Debug for KubeClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClientImpl")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl KubeClientImpl {
    /// Create a new client wrapping the given kube `Client`
    #[must_use]
    pub fn new(client: Client, field_manager: &str) -> Self {
        Self {
            client,
            field_manager: field_manager.to_string(),
        }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Secret>, ReconcilerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Pod>, ReconcilerError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(pods.items)
    }

    async fn list_jobs(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Job>, ReconcilerError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let jobs = api
            .list(&ListParams::default().labels(label_selector))
            .await?;
        Ok(jobs.items)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<Job, ReconcilerError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&PostParams::default(), job).await?)
    }

    async fn patch_cluster_status(
        &self,
        name: &str,
        patch: &ClusterStatusPatch,
    ) -> Result<(), ReconcilerError> {
        let api: Api<Cluster> = Api::all(self.client.clone());

        let body = patch.to_merge_patch()?;
        debug!(
            cluster = name,
            resource_version = patch.resource_version.as_deref().unwrap_or("<none>"),
            "patching cluster status"
        );

        let params = PatchParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        api.patch_status(name, &params, &Patch::Merge(&body)).await?;

        Ok(())
    }
}
