//! # Cluster Spec
//!
//! The `Cluster` custom resource, reduced to the fields this controller uses.

use crate::constants::{CLUSTER_NAMESPACE_PREFIX, CONDITION_ENCRYPTION_INITIALIZED};
use crate::crd::{ConditionStatus, EncryptionConfiguration};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

/// Cluster Custom Resource Definition
///
/// A user cluster whose control plane runs in the `cluster-<name>` namespace
/// of the seed.
///
/// # Example
///
/// ```yaml
/// apiVersion: kubermatic.k8c.io/v1
/// kind: Cluster
/// metadata:
///   name: c1
/// spec:
///   encryptionConfiguration:
///     enabled: true
///     resources: ["secrets"]
///     secretbox:
///       keys:
///         - name: k1
///           secretRef:
///             name: encryption-key
///             key: key
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Cluster",
    group = "kubermatic.k8c.io",
    version = "v1",
    status = "crate::crd::ClusterStatus",
    printcolumn = r#"{"name":"Encryption", "type":"string", "jsonPath":".status.encryption.phase"}, {"name":"Active Key", "type":"string", "jsonPath":".status.encryption.activeKey"}, {"name":"Paused", "type":"boolean", "jsonPath":".spec.pause"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Paused clusters are ignored by all controllers
    #[serde(default)]
    pub pause: bool,
    /// Encryption-at-rest configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_configuration: Option<EncryptionConfiguration>,
}

impl Cluster {
    /// Whether the spec requests encryption-at-rest
    #[must_use]
    pub fn is_encryption_enabled(&self) -> bool {
        self.spec
            .encryption_configuration
            .as_ref()
            .is_some_and(|c| c.enabled)
    }

    /// Whether encryption has been initialized and not yet torn down
    #[must_use]
    pub fn is_encryption_active(&self) -> bool {
        self.condition_is_true(CONDITION_ENCRYPTION_INITIALIZED)
    }

    /// Whether the named condition is present with status `True`
    #[must_use]
    pub fn condition_is_true(&self, condition_type: &str) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.conditions.get(condition_type))
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Seed namespace holding the control plane of this cluster
    #[must_use]
    pub fn namespace_name(&self) -> String {
        self.status
            .as_ref()
            .and_then(|s| s.namespace_name.clone())
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| format!("{CLUSTER_NAMESPACE_PREFIX}{}", self.name_any()))
    }

    /// Resource kinds requested in the spec (empty when unconfigured)
    #[must_use]
    pub fn desired_resources(&self) -> Vec<String> {
        self.spec
            .encryption_configuration
            .as_ref()
            .map(EncryptionConfiguration::resource_list)
            .unwrap_or_default()
    }
}
