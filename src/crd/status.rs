//! # Cluster Status
//!
//! Status types for tracking encryption state and conditions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of the Cluster resource
///
/// Other subsystems own most of the real status; this controller touches
/// `encryption` and the `EncryptionInitialized` condition only.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Seed namespace hosting the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_name: Option<String>,
    /// Encryption-at-rest state. Serialized as `null` when absent so that a
    /// merge patch removes it on teardown.
    #[serde(default)]
    pub encryption: Option<ClusterEncryptionStatus>,
    /// Conditions keyed by condition type
    #[serde(default)]
    pub conditions: BTreeMap<String, ClusterCondition>,
}

/// Encryption-at-rest state of a cluster
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEncryptionStatus {
    /// Current phase of the encryption state machine
    pub phase: ClusterEncryptionPhase,
    /// Key hint believed to be effective on the live API server
    #[serde(default)]
    pub active_key: String,
    /// Resource kinds covered by the last successful re-encryption
    #[serde(default)]
    pub encrypted_resources: Vec<String>,
}

impl ClusterEncryptionStatus {
    /// Fresh status written when encryption is first initialized
    #[must_use]
    pub fn pending() -> Self {
        Self {
            phase: ClusterEncryptionPhase::Pending,
            active_key: String::new(),
            encrypted_resources: Vec::new(),
        }
    }
}

/// Phases of the encryption state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ClusterEncryptionPhase {
    /// Waiting for the API server to pick up the current configuration
    Pending,
    /// The active key or resource set changed; data must be rewritten
    EncryptionNeeded,
    /// All protected resources are stored under the active key
    Active,
    /// The re-encryption job failed; requires manual intervention
    Failed,
}

impl ClusterEncryptionPhase {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterEncryptionPhase::Pending => "Pending",
            ClusterEncryptionPhase::EncryptionNeeded => "EncryptionNeeded",
            ClusterEncryptionPhase::Active => "Active",
            ClusterEncryptionPhase::Failed => "Failed",
        }
    }
}

impl fmt::Display for ClusterEncryptionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Condition represents an observation of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCondition {
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Last time the condition transitioned between statuses (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
