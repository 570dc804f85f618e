//! # Status Updates
//!
//! All writes to `Cluster.status` go through [`update_cluster_status`]: clone
//! the observed status, apply a mutation, and patch only when something
//! changed. Skipping no-op writes keeps resource versions stable and avoids
//! triggering our own watch.
//!
//! The status is shared with other controllers, so a write only carries the
//! fields this controller owns (`encryption` and the conditions it changed),
//! guarded by the `resourceVersion` the change was computed from. A stale
//! snapshot fails with a conflict and is retried through the error policy.

use crate::controller::reconciler::client::KubeClient;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{
    Cluster, ClusterCondition, ClusterEncryptionPhase, ClusterEncryptionStatus, ClusterStatus,
    ConditionStatus,
};
use crate::observability::metrics;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// JSON merge patch of the status fields owned by this controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterStatusPatch {
    /// Resource version the patch was computed against
    pub resource_version: Option<String>,
    /// New encryption status; `Some(None)` removes it
    pub encryption: Option<Option<ClusterEncryptionStatus>>,
    /// Changed conditions; `None` removes a condition
    pub conditions: BTreeMap<String, Option<ClusterCondition>>,
}

impl ClusterStatusPatch {
    /// Patch turning `current` into `desired`
    #[must_use]
    pub fn between(
        resource_version: Option<String>,
        current: &ClusterStatus,
        desired: &ClusterStatus,
    ) -> Self {
        let encryption = (current.encryption != desired.encryption)
            .then(|| desired.encryption.clone());

        let mut conditions: BTreeMap<String, Option<ClusterCondition>> = desired
            .conditions
            .iter()
            .filter(|(type_, condition)| current.conditions.get(*type_) != Some(*condition))
            .map(|(type_, condition)| (type_.clone(), Some(condition.clone())))
            .collect();
        for type_ in current.conditions.keys() {
            if !desired.conditions.contains_key(type_) {
                conditions.insert(type_.clone(), None);
            }
        }

        Self {
            resource_version,
            encryption,
            conditions,
        }
    }

    /// Whether the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.encryption.is_none() && self.conditions.is_empty()
    }

    /// Body of the merge patch sent to the status subresource
    pub fn to_merge_patch(&self) -> Result<serde_json::Value, ReconcilerError> {
        let mut status = serde_json::Map::new();
        if let Some(encryption) = &self.encryption {
            status.insert("encryption".to_string(), serde_json::to_value(encryption)?);
        }
        if !self.conditions.is_empty() {
            status.insert(
                "conditions".to_string(),
                serde_json::to_value(&self.conditions)?,
            );
        }

        let mut patch = serde_json::json!({ "status": status });
        if let Some(resource_version) = &self.resource_version {
            patch["metadata"] = serde_json::json!({ "resourceVersion": resource_version });
        }
        Ok(patch)
    }

    /// Apply the patch to a status the way the API server merges it
    pub fn apply_to(&self, status: &mut ClusterStatus) {
        if let Some(encryption) = &self.encryption {
            status.encryption.clone_from(encryption);
        }
        for (type_, condition) in &self.conditions {
            match condition {
                Some(condition) => {
                    status.conditions.insert(type_.clone(), condition.clone());
                }
                None => {
                    status.conditions.remove(type_);
                }
            }
        }
    }

    /// Phase after the patch, if it touches the encryption status
    fn phase(&self) -> Option<Option<ClusterEncryptionPhase>> {
        self.encryption
            .as_ref()
            .map(|encryption| encryption.as_ref().map(|e| e.phase))
    }
}

/// Apply `mutate` to the cluster status and patch it if it changed
///
/// Returns whether a write was issued.
pub async fn update_cluster_status<F>(
    client: &dyn KubeClient,
    cluster: &Cluster,
    mutate: F,
) -> Result<bool, ReconcilerError>
where
    F: FnOnce(&mut ClusterStatus),
{
    let name = cluster.name_any();
    let current = cluster.status.clone().unwrap_or_default();
    let mut desired = current.clone();
    mutate(&mut desired);

    let patch = ClusterStatusPatch::between(cluster.resource_version(), &current, &desired);
    if patch.is_empty() {
        debug!(cluster = %name, "Skipping status update - status unchanged");
        return Ok(false);
    }

    client.patch_cluster_status(&name, &patch).await?;

    let before = current.encryption.as_ref().map(|e| e.phase);
    if let Some(after) = patch.phase().filter(|after| *after != before) {
        info!(
            cluster = %name,
            from = before.map_or("<none>", |p| p.as_str()),
            to = after.map_or("<none>", |p| p.as_str()),
            "encryption phase changed"
        );
        metrics::increment_phase_transitions(after.map_or("None", |p| p.as_str()));
    }
    Ok(true)
}

/// Set a condition, keeping the transition time unless the status flips
pub fn set_condition(
    status: &mut ClusterStatus,
    condition_type: &str,
    condition_status: ConditionStatus,
    reason: &str,
    message: &str,
) {
    let last_transition_time = match status.conditions.get(condition_type) {
        Some(existing) if existing.status == condition_status => {
            existing.last_transition_time.clone()
        }
        _ => Some(chrono::Utc::now().to_rfc3339()),
    };

    status.conditions.insert(
        condition_type.to_string(),
        ClusterCondition {
            status: condition_status,
            last_transition_time,
            reason: (!reason.is_empty()).then(|| reason.to_string()),
            message: (!message.is_empty()).then(|| message.to_string()),
        },
    );
}
