//! # EncryptionConfiguration
//!
//! Kubernetes-native `apiserver.config.k8s.io/v1` `EncryptionConfiguration`
//! handling: parsing the rendered file, rendering it from a cluster spec, and
//! the SHA-1 digest that marks which desired spec a rendered secret reflects.
//!
//! The rendered file always carries exactly one resource entry with two
//! providers. The first provider is used for writes; the second is the
//! fallback needed to read data written before the last change:
//!
//! | Cluster state                 | Providers                 |
//! |-------------------------------|---------------------------|
//! | encryption enabled            | `secretbox`, `identity`   |
//! | disabled, still active        | `identity`, `secretbox`   |

use crate::constants::{
    ENCRYPTION_CONFIGURATION_KEY, ENCRYPTION_CONFIGURATION_SECRET_NAME, ENCRYPTION_SPEC_HASH_LABEL,
};
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{Cluster, EncryptionConfiguration};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const ENCRYPTION_CONFIGURATION_API_VERSION: &str = "apiserver.config.k8s.io/v1";
pub const ENCRYPTION_CONFIGURATION_KIND: &str = "EncryptionConfiguration";

/// Top-level `EncryptionConfiguration` document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfigurationFile {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub resources: Vec<ResourceConfiguration>,
}

/// Providers applied to a set of resource kinds
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceConfiguration {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub providers: Vec<ProviderConfiguration>,
}

/// One provider entry. Exactly one field is expected to be set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProviderConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aesgcm: Option<KeysConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aescbc: Option<KeysConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secretbox: Option<KeysConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kms: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityConfiguration>,
}

impl ProviderConfiguration {
    #[must_use]
    pub fn identity() -> Self {
        Self {
            identity: Some(IdentityConfiguration {}),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn secretbox(keys: Vec<Key>) -> Self {
        Self {
            secretbox: Some(KeysConfiguration { keys }),
            ..Self::default()
        }
    }
}

/// Key list of a symmetric provider
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KeysConfiguration {
    #[serde(default)]
    pub keys: Vec<Key>,
}

/// A named key. The secret is wiped on drop and never printed.
#[derive(Clone, PartialEq, Deserialize, Serialize, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    pub name: String,
    pub secret: String,
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("secret", &"***")
            .finish()
    }
}

#[allow(
    clippy::empty_structs_with_brackets,
    reason = "identity must serialize as an empty mapping"
)]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IdentityConfiguration {}

/// Parse a rendered `EncryptionConfiguration`
///
/// Parse errors only report the location; the document holds key material.
pub fn parse(data: &[u8]) -> Result<EncryptionConfigurationFile, ReconcilerError> {
    serde_yaml::from_slice(data).map_err(|e| {
        let location = e
            .location()
            .map(|l| format!(" at line {} column {}", l.line(), l.column()))
            .unwrap_or_default();
        ReconcilerError::EncryptionConfig(format!(
            "failed to parse {ENCRYPTION_CONFIGURATION_KIND}{location}"
        ))
    })
}

/// Read and parse the `EncryptionConfiguration` stored in a Secret
pub fn from_secret(secret: &Secret) -> Result<EncryptionConfigurationFile, ReconcilerError> {
    let data = secret
        .data
        .as_ref()
        .and_then(|d| d.get(ENCRYPTION_CONFIGURATION_KEY))
        .ok_or_else(|| {
            ReconcilerError::EncryptionConfig(format!(
                "secret {} has no {ENCRYPTION_CONFIGURATION_KEY} entry",
                secret.metadata.name.as_deref().unwrap_or("unknown")
            ))
        })?;
    parse(&data.0)
}

/// SHA-1 hex digest of the canonical JSON form of the desired encryption spec
///
/// An absent configuration hashes as JSON `null`.
pub fn spec_digest(config: Option<&EncryptionConfiguration>) -> Result<String, ReconcilerError> {
    let canonical = serde_json::to_vec(&config)?;
    let mut hasher = Sha1::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Render the `EncryptionConfiguration` for a cluster
///
/// `resolved_keys` maps secretbox key names to their base64 values (inline
/// values in the spec take precedence). Returns `None` when the cluster
/// neither requests nor still has encryption.
pub fn render(
    cluster: &Cluster,
    resolved_keys: &BTreeMap<String, String>,
) -> Result<Option<EncryptionConfigurationFile>, ReconcilerError> {
    let Some(config) = cluster.spec.encryption_configuration.as_ref() else {
        return Ok(None);
    };
    let enabled = cluster.is_encryption_enabled();
    if !enabled && !cluster.is_encryption_active() {
        return Ok(None);
    }

    let secretbox = config.secretbox.as_ref().ok_or_else(|| {
        ReconcilerError::Validation("secretbox is the only supported provider".to_string())
    })?;
    let mut keys = Vec::with_capacity(secretbox.keys.len());
    for key in &secretbox.keys {
        let secret = key
            .value
            .clone()
            .or_else(|| resolved_keys.get(&key.name).cloned())
            .ok_or_else(|| {
                ReconcilerError::Validation(format!("no value resolved for key {}", key.name))
            })?;
        keys.push(Key {
            name: key.name.clone(),
            secret,
        });
    }

    let providers = if enabled {
        vec![
            ProviderConfiguration::secretbox(keys),
            ProviderConfiguration::identity(),
        ]
    } else {
        vec![
            ProviderConfiguration::identity(),
            ProviderConfiguration::secretbox(keys),
        ]
    };

    Ok(Some(EncryptionConfigurationFile {
        api_version: ENCRYPTION_CONFIGURATION_API_VERSION.to_string(),
        kind: ENCRYPTION_CONFIGURATION_KIND.to_string(),
        resources: vec![ResourceConfiguration {
            resources: config.resources.clone(),
            providers,
        }],
    }))
}

/// Build the Secret carrying a rendered configuration, labelled with the
/// digest of the spec it was rendered from
pub fn build_secret(
    cluster: &Cluster,
    rendered: &EncryptionConfigurationFile,
) -> Result<Secret, ReconcilerError> {
    let yaml = serde_yaml::to_string(rendered).map_err(|e| {
        ReconcilerError::EncryptionConfig(format!(
            "failed to serialize {ENCRYPTION_CONFIGURATION_KIND}: {e}"
        ))
    })?;
    let digest = spec_digest(cluster.spec.encryption_configuration.as_ref())?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(ENCRYPTION_CONFIGURATION_SECRET_NAME.to_string()),
            namespace: Some(cluster.namespace_name()),
            labels: Some(BTreeMap::from([(
                ENCRYPTION_SPEC_HASH_LABEL.to_string(),
                digest,
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            ENCRYPTION_CONFIGURATION_KEY.to_string(),
            ByteString(yaml.into_bytes()),
        )])),
        ..Default::default()
    })
}
