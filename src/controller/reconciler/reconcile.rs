//! # Reconciliation Logic
//!
//! The encryption state machine. Each call observes the cluster, its
//! encryption secret, API server pods and re-encryption jobs, then performs at
//! most one phase transition. Nothing is remembered between calls, so a
//! restarted controller resumes exactly where the status says it is.

use crate::constants::{
    CONDITION_ENCRYPTION_INITIALIZED, EVENT_REASON_RECONCILING_ERROR, WORKER_NAME_LABEL,
};
use crate::controller::reconciler::convergence::{
    converged_encryption_secret, get_encryption_secret,
};
use crate::controller::reconciler::job::run_or_observe_job_for_secret;
use crate::controller::reconciler::keyhint::{
    active_key_hint, configured_key_hint, IDENTITY_KEY_HINT,
};
use crate::controller::reconciler::status::{set_condition, update_cluster_status};
use crate::controller::reconciler::validation::validate_encryption_keys;
use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::{Cluster, ClusterEncryptionPhase, ClusterEncryptionStatus, ConditionStatus};
use crate::observability::metrics;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};

const REASON_ENCRYPTION_INITIALIZED: &str = "EncryptionInitialized";
const REASON_ENCRYPTION_DISABLED: &str = "EncryptionDisabled";

/// Main reconciliation function
///
/// Errors are surfaced as Warning Events on the Cluster and handed to the
/// controller's error policy for backoff.
pub async fn reconcile(
    cluster: Arc<Cluster>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = cluster.name_any();
    metrics::increment_reconciliations();

    let span = info_span!(
        "reconcile",
        resource.name = %name,
        resource.kind = "Cluster",
        phase = cluster
            .status
            .as_ref()
            .and_then(|s| s.encryption.as_ref())
            .map_or("None", |e| e.phase.as_str())
    );
    let result = reconcile_encryption(&cluster, &ctx).instrument(span).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(action) => {
            debug!(cluster = %name, ?action, "reconciliation finished");
            ctx.reset_backoff(&name);
        }
        Err(e) => {
            error!(cluster = %name, error = %e, "reconciliation failed");
            metrics::increment_reconciliation_errors(e.kind());
            ctx.events
                .publish(
                    &cluster.object_ref(&()),
                    EventType::Warning,
                    EVENT_REASON_RECONCILING_ERROR,
                    "Reconcile",
                    Some(e.to_string()),
                )
                .await;
        }
    }
    result
}

/// Whether this controller instance is responsible for the cluster
///
/// Without a worker name only unlabelled clusters are handled.
#[must_use]
pub fn is_managed_by_worker(cluster: &Cluster, worker_name: Option<&str>) -> bool {
    let label = cluster.labels().get(WORKER_NAME_LABEL).map(String::as_str);
    match worker_name {
        Some(worker) => label == Some(worker),
        None => label.is_none_or(str::is_empty),
    }
}

async fn reconcile_encryption(
    cluster: &Cluster,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    if cluster.spec.pause {
        debug!("cluster is paused, skipping");
        return Ok(Action::await_change());
    }
    if !is_managed_by_worker(cluster, ctx.config.worker_name.as_deref()) {
        debug!("cluster belongs to another worker, skipping");
        return Ok(Action::await_change());
    }
    if !cluster.is_encryption_enabled() && !cluster.is_encryption_active() {
        return Ok(Action::await_change());
    }

    if cluster.is_encryption_enabled() && !cluster.is_encryption_active() {
        return initialize(cluster, ctx).await;
    }

    let encryption = cluster
        .status
        .as_ref()
        .and_then(|s| s.encryption.as_ref())
        .ok_or_else(|| {
            ReconcilerError::InvariantViolation(
                "status.encryption is unset although encryption is initialized".to_string(),
            )
        })?;

    match encryption.phase {
        ClusterEncryptionPhase::Pending => reconcile_pending(cluster, ctx, encryption).await,
        ClusterEncryptionPhase::EncryptionNeeded => reconcile_encryption_needed(cluster, ctx).await,
        ClusterEncryptionPhase::Active => reconcile_active(cluster, ctx, encryption).await,
        ClusterEncryptionPhase::Failed => {
            debug!("encryption failed, waiting for manual intervention");
            Ok(Action::await_change())
        }
    }
}

async fn initialize(cluster: &Cluster, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    validate_encryption_keys(ctx.kube.as_ref(), cluster).await?;

    update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
        status.encryption = Some(ClusterEncryptionStatus::pending());
        set_condition(
            status,
            CONDITION_ENCRYPTION_INITIALIZED,
            ConditionStatus::True,
            REASON_ENCRYPTION_INITIALIZED,
            "encryption-at-rest has been initialized",
        );
    })
    .await?;
    info!("encryption-at-rest initialized");
    Ok(Action::requeue(ctx.config.convergence_requeue()))
}

async fn reconcile_pending(
    cluster: &Cluster,
    ctx: &Reconciler,
    encryption: &ClusterEncryptionStatus,
) -> Result<Action, ReconcilerError> {
    let Some(secret) = converged_encryption_secret(ctx.kube.as_ref(), cluster).await? else {
        debug!("apiserver has not converged on the encryption configuration yet");
        return Ok(Action::requeue(ctx.config.convergence_requeue()));
    };

    let active_key = active_key_hint(&secret)?;
    let desired_resources = if active_key == IDENTITY_KEY_HINT {
        Vec::new()
    } else {
        cluster.desired_resources()
    };

    if encryption.active_key != active_key || encryption.encrypted_resources != desired_resources
    {
        info!(
            observed = %encryption.active_key,
            active = %active_key,
            "encryption key or resources changed, re-encryption needed"
        );
        update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
            if let Some(encryption) = status.encryption.as_mut() {
                encryption.phase = ClusterEncryptionPhase::EncryptionNeeded;
            }
        })
        .await?;
        return Ok(Action::requeue(ctx.config.convergence_requeue()));
    }

    info!(active = %active_key, "no data changes required");
    update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
        if let Some(encryption) = status.encryption.as_mut() {
            encryption.phase = ClusterEncryptionPhase::Active;
        }
    })
    .await?;
    Ok(Action::await_change())
}

async fn reconcile_encryption_needed(
    cluster: &Cluster,
    ctx: &Reconciler,
) -> Result<Action, ReconcilerError> {
    let Some(secret) = get_encryption_secret(ctx.kube.as_ref(), cluster).await? else {
        debug!("encryption configuration secret not found");
        return Ok(Action::requeue(ctx.config.convergence_requeue()));
    };
    let key = active_key_hint(&secret)?;
    run_or_observe_job_for_secret(ctx, cluster, &secret, &key).await
}

async fn reconcile_active(
    cluster: &Cluster,
    ctx: &Reconciler,
    encryption: &ClusterEncryptionStatus,
) -> Result<Action, ReconcilerError> {
    let configured_key = configured_key_hint(&cluster.spec)?;
    if configured_key != encryption.active_key {
        validate_encryption_keys(ctx.kube.as_ref(), cluster).await?;
        info!(
            active = %encryption.active_key,
            configured = %configured_key,
            "encryption key change requested"
        );
        update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
            if let Some(encryption) = status.encryption.as_mut() {
                encryption.phase = ClusterEncryptionPhase::Pending;
            }
        })
        .await?;
        return Ok(Action::requeue(ctx.config.convergence_requeue()));
    }

    if encryption.active_key == IDENTITY_KEY_HINT && !cluster.is_encryption_enabled() {
        info!("data is decrypted, removing encryption-at-rest status");
        update_cluster_status(ctx.kube.as_ref(), cluster, |status| {
            status.encryption = None;
            set_condition(
                status,
                CONDITION_ENCRYPTION_INITIALIZED,
                ConditionStatus::False,
                REASON_ENCRYPTION_DISABLED,
                "encryption-at-rest has been disabled and all data is decrypted",
            );
        })
        .await?;
    }
    Ok(Action::await_change())
}
