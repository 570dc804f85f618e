//! # Encryption Configuration
//!
//! Desired encryption-at-rest settings of a user cluster.

use serde::{Deserialize, Serialize};

/// Encryption-at-rest configuration of a user cluster
///
/// # Example
///
/// ```yaml
/// encryptionConfiguration:
///   enabled: true
///   resources:
///     - secrets
///   secretbox:
///     keys:
///       - name: encryption-key-2024-01
///         secretRef:
///           name: encryption-key
///           key: key
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfiguration {
    /// Enables encryption-at-rest. Turning this off on a cluster with active
    /// encryption decrypts all protected resources back to plaintext.
    pub enabled: bool,
    /// API resource kinds to protect (e.g. `secrets`)
    #[serde(default)]
    pub resources: Vec<String>,
    /// Secretbox (XSalsa20-Poly1305) provider configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secretbox: Option<SecretboxEncryptionConfiguration>,
    /// KMS provider configuration. Not supported by this controller; its
    /// presence fails validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms: Option<serde_json::Value>,
}

/// Secretbox provider configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretboxEncryptionConfiguration {
    /// Ordered list of keys; the first one is the primary (write) key
    pub keys: Vec<SecretboxKey>,
}

/// A named secretbox key, given inline or by reference to a Secret
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretboxKey {
    /// Key name, used as the key hint
    pub name: String,
    /// Base64 encoded 32 byte key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Reference to a Secret in the cluster namespace holding the base64 encoded key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretKeyRef>,
}

/// Selects a data key of a Secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Data key inside the Secret
    pub key: String,
}

impl EncryptionConfiguration {
    /// Resource kinds to protect, in declaration order
    #[must_use]
    pub fn resource_list(&self) -> Vec<String> {
        self.resources.clone()
    }
}
