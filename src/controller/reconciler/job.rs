//! # Re-encryption Job
//!
//! Rewrites every protected object through the API server so that it is
//! stored under the currently active key. The controller only decides when to
//! run the job and observes its outcome; the rewrite itself is a bulk
//! `kubectl get | kubectl replace`.
//!
//! At most one job exists per `(cluster, secret revision)`. The label lookup
//! is the idempotency key; per-cluster serialization of reconciles by the
//! controller runtime closes the lookup/create race.
//!
//! A job is only created once every API server pod runs with the revision it
//! is labelled with. Otherwise it would rewrite data under the previous key
//! while the status records the new one.

use crate::config::ControllerConfig;
use crate::constants::{ADMIN_KUBECONFIG_SECRET_NAME, CLUSTER_LABEL, SECRET_REVISION_LABEL};
use crate::controller::reconciler::convergence::{get_encryption_secret, is_rolled_out};
use crate::controller::reconciler::keyhint::IDENTITY_KEY_HINT;
use crate::controller::reconciler::status::update_cluster_status;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{Cluster, ClusterEncryptionPhase};
use crate::observability::metrics;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSpec, PodTemplateSpec, Secret, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{info, warn};

const JOB_GENERATE_NAME: &str = "data-encryption-";
const CONTAINER_NAME: &str = "encryption-runner";
const KUBECONFIG_VOLUME_NAME: &str = "kubeconfig";
const KUBECONFIG_MOUNT_PATH: &str = "/etc/kubernetes/kubeconfig";

/// Terminal state of a re-encryption job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Running,
}

impl JobOutcome {
    fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed => "failed",
            JobOutcome::Running => "running",
        }
    }
}

/// Labels identifying the job for a cluster and secret revision
#[must_use]
pub fn job_labels(cluster_name: &str, secret_revision: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_LABEL.to_string(), cluster_name.to_string()),
        (SECRET_REVISION_LABEL.to_string(), secret_revision.to_string()),
    ])
}

/// Label selector matching [`job_labels`]
#[must_use]
pub fn job_selector(cluster_name: &str, secret_revision: &str) -> String {
    job_labels(cluster_name, secret_revision)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Shell pipeline that reads and replaces all objects of the given kinds
#[must_use]
pub fn reencryption_command(resources: &[String]) -> String {
    format!(
        "kubectl get {} --all-namespaces -o json | kubectl replace -f -",
        resources.join(",")
    )
}

/// Build the re-encryption job for a cluster
///
/// The job:
/// - Runs a single pod that is never restarted or retried
/// - Mounts the admin kubeconfig read-only
/// - Is owned by the Cluster and garbage collected after its TTL
#[must_use]
pub fn build_reencryption_job(
    cluster: &Cluster,
    secret_revision: &str,
    resources: &[String],
    config: &ControllerConfig,
) -> Job {
    let labels = job_labels(&cluster.name_any(), secret_revision);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(config.reencryption_job_image.clone()),
        command: Some(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            reencryption_command(resources),
        ]),
        env: Some(vec![EnvVar {
            name: "KUBECONFIG".to_string(),
            value: Some(format!("{KUBECONFIG_MOUNT_PATH}/kubeconfig")),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: KUBECONFIG_VOLUME_NAME.to_string(),
            mount_path: KUBECONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volume = Volume {
        name: KUBECONFIG_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(ADMIN_KUBECONFIG_SECRET_NAME.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            generate_name: Some(JOB_GENERATE_NAME.to_string()),
            namespace: Some(cluster.namespace_name()),
            labels: Some(labels.clone()),
            owner_references: cluster.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(config.reencryption_job_ttl_secs),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![volume]),
                    restart_policy: Some("Never".to_string()),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Classify a job by its status counters
#[must_use]
pub fn job_outcome(job: &Job) -> JobOutcome {
    let status = job.status.as_ref();
    let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
    let failed = status.and_then(|s| s.failed).unwrap_or(0);

    if succeeded >= 1 {
        JobOutcome::Succeeded
    } else if failed > 0 {
        JobOutcome::Failed
    } else {
        JobOutcome::Running
    }
}

/// Resource kinds the job must rewrite: everything requested now plus
/// everything encrypted before, so that removed kinds are decrypted again
fn resources_to_rewrite(cluster: &Cluster) -> Vec<String> {
    let mut resources = cluster.desired_resources();
    if let Some(encryption) = cluster.status.as_ref().and_then(|s| s.encryption.as_ref()) {
        for resource in &encryption.encrypted_resources {
            if !resources.contains(resource) {
                resources.push(resource.clone());
            }
        }
    }
    resources
}

/// Create the re-encryption job for the current secret revision, or observe
/// the one that already exists
///
/// `key` must be the active hint of the secret revision found here. The state
/// machine reads the secret once and calls [`run_or_observe_job_for_secret`]
/// so that the hint and the job label come from the same revision; this entry
/// point serves callers that already hold the hint.
pub async fn run_or_observe_job(
    ctx: &Reconciler,
    cluster: &Cluster,
    key: &str,
) -> Result<Action, ReconcilerError> {
    let Some(secret) = get_encryption_secret(ctx.kube.as_ref(), cluster).await? else {
        info!(
            cluster = %cluster.name_any(),
            "encryption configuration secret not found, waiting"
        );
        return Ok(Action::requeue(ctx.config.convergence_requeue()));
    };
    run_or_observe_job_for_secret(ctx, cluster, &secret, key).await
}

/// As [`run_or_observe_job`], for an already fetched secret
pub async fn run_or_observe_job_for_secret(
    ctx: &Reconciler,
    cluster: &Cluster,
    secret: &Secret,
    key: &str,
) -> Result<Action, ReconcilerError> {
    let name = cluster.name_any();
    let namespace = cluster.namespace_name();
    let revision = secret.metadata.resource_version.as_deref().ok_or_else(|| {
        ReconcilerError::EncryptionConfig(
            "encryption configuration secret has no resourceVersion".to_string(),
        )
    })?;

    let jobs = ctx
        .kube
        .list_jobs(&namespace, &job_selector(&name, revision))
        .await?;

    let Some(job) = jobs.first() else {
        if !is_rolled_out(ctx.kube.as_ref(), cluster, secret).await? {
            info!(
                cluster = %name,
                revision,
                "apiserver has not rolled out the encryption configuration, waiting"
            );
            metrics::increment_requeues_total("rollout-pending");
            return Ok(Action::requeue(ctx.config.convergence_requeue()));
        }

        let resources = resources_to_rewrite(cluster);
        if resources.is_empty() {
            info!(cluster = %name, "no resources to re-encrypt");
            mark_active(ctx, cluster, key).await?;
            return Ok(Action::await_change());
        }

        let job = build_reencryption_job(cluster, revision, &resources, &ctx.config);
        ctx.kube.create_job(&namespace, &job).await?;
        metrics::increment_jobs_created();
        info!(
            cluster = %name,
            namespace = %namespace,
            revision,
            resources = ?resources,
            "created re-encryption job"
        );
        return Ok(Action::requeue(ctx.config.convergence_requeue()));
    };

    if jobs.len() > 1 {
        warn!(
            cluster = %name,
            revision,
            count = jobs.len(),
            "multiple re-encryption jobs found for the same secret revision"
        );
    }

    let outcome = job_outcome(job);
    match outcome {
        JobOutcome::Succeeded => {
            metrics::increment_job_outcomes(outcome.as_str());
            mark_active(ctx, cluster, key).await?;
            Ok(Action::await_change())
        }
        JobOutcome::Failed => {
            metrics::increment_job_outcomes(outcome.as_str());
            warn!(
                cluster = %name,
                job = job.metadata.name.as_deref().unwrap_or("unknown"),
                "re-encryption job failed"
            );
            update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
                if let Some(encryption) = status.encryption.as_mut() {
                    encryption.phase = ClusterEncryptionPhase::Failed;
                }
            })
            .await?;
            Ok(Action::await_change())
        }
        JobOutcome::Running => Ok(Action::requeue(ctx.config.convergence_requeue())),
    }
}

async fn mark_active(ctx: &Reconciler, cluster: &Cluster, key: &str) -> Result<(), ReconcilerError> {
    let encrypted_resources = if key == IDENTITY_KEY_HINT {
        Vec::new()
    } else {
        cluster.desired_resources()
    };
    update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
        if let Some(encryption) = status.encryption.as_mut() {
            encryption.phase = ClusterEncryptionPhase::Active;
            encryption.active_key = key.to_string();
            encryption.encrypted_resources = encrypted_resources;
        }
    })
    .await?;
    Ok(())
}
