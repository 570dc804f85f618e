//! # API Server Convergence
//!
//! Decides whether the live API server pods run with the encryption
//! configuration that matches the current cluster spec.
//!
//! Two checks must hold:
//! 1. The encryption secret carries the digest of the current spec, i.e. the
//!    rendering subsystem has caught up.
//! 2. Every `app=apiserver` pod is labelled with the secret's current
//!    `resourceVersion`, i.e. the rollout has finished.
//!
//! Absent objects mean "not yet", never an error. API errors propagate.

use crate::constants::{
    APISERVER_APP_LABEL_VALUE, ENCRYPTION_CONFIGURATION_SECRET_NAME,
    ENCRYPTION_SECRET_REVISION_LABEL, ENCRYPTION_SPEC_HASH_LABEL,
};
use crate::controller::encryption_config;
use crate::controller::reconciler::client::KubeClient;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::Cluster;
use k8s_openapi::api::core::v1::Secret;
use tracing::debug;

/// Label selector matching API server pods
#[must_use]
pub fn apiserver_selector() -> String {
    format!("app={APISERVER_APP_LABEL_VALUE}")
}

/// Fetch the rendered encryption configuration secret of a cluster
pub async fn get_encryption_secret(
    client: &dyn KubeClient,
    cluster: &Cluster,
) -> Result<Option<Secret>, ReconcilerError> {
    client
        .get_secret(&cluster.namespace_name(), ENCRYPTION_CONFIGURATION_SECRET_NAME)
        .await
}

/// Whether all API server pods run with the configuration matching the spec
pub async fn is_apiserver_converged(
    client: &dyn KubeClient,
    cluster: &Cluster,
) -> Result<bool, ReconcilerError> {
    Ok(converged_encryption_secret(client, cluster).await?.is_some())
}

/// The encryption secret, if the API server has converged on it
///
/// Decisions that depend on the live configuration must be made from the
/// returned revision, not from a second read.
pub async fn converged_encryption_secret(
    client: &dyn KubeClient,
    cluster: &Cluster,
) -> Result<Option<Secret>, ReconcilerError> {
    let Some(secret) = get_encryption_secret(client, cluster).await? else {
        debug!(
            namespace = %cluster.namespace_name(),
            "encryption configuration secret not found"
        );
        return Ok(None);
    };
    let rolled_out = is_rolled_out(client, cluster, &secret).await?;
    Ok(rolled_out.then_some(secret))
}

/// Whether `secret` reflects the current spec and every API server pod runs
/// with its revision
pub async fn is_rolled_out(
    client: &dyn KubeClient,
    cluster: &Cluster,
    secret: &Secret,
) -> Result<bool, ReconcilerError> {
    let namespace = cluster.namespace_name();

    let desired = encryption_config::spec_digest(cluster.spec.encryption_configuration.as_ref())?;
    let rendered = secret
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(ENCRYPTION_SPEC_HASH_LABEL));
    if rendered.map(String::as_str) != Some(desired.as_str()) {
        debug!(
            namespace = %namespace,
            desired = %desired,
            rendered = rendered.map_or("<none>", String::as_str),
            "encryption configuration secret not yet rendered from current spec"
        );
        return Ok(false);
    }

    let Some(revision) = secret.metadata.resource_version.as_deref() else {
        return Ok(false);
    };

    let pods = client.list_pods(&namespace, &apiserver_selector()).await?;
    if pods.is_empty() {
        debug!(namespace = %namespace, "no apiserver pods found");
        return Ok(false);
    }

    let stale = pods
        .iter()
        .filter(|pod| {
            pod.metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(ENCRYPTION_SECRET_REVISION_LABEL))
                .map(String::as_str)
                != Some(revision)
        })
        .count();
    if stale > 0 {
        debug!(
            namespace = %namespace,
            revision,
            stale,
            total = pods.len(),
            "apiserver pods still rolling out"
        );
        return Ok(false);
    }

    Ok(true)
}
