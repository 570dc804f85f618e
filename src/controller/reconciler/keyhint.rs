//! # Key Hints
//!
//! A key hint identifies which provider and key encrypt new writes, without
//! carrying any key material: `secretbox/<key-name>` or `identity`.
//!
//! The *active* hint is read from the rendered `EncryptionConfiguration` the
//! API server runs with; the *configured* hint is derived from the cluster
//! spec. Comparing the two detects pending key rotations and disablement.

use crate::controller::encryption_config::{self, EncryptionConfigurationFile};
use crate::controller::reconciler::ReconcilerError;
use crate::crd::ClusterSpec;
use k8s_openapi::api::core::v1::Secret;

/// Hint of the plaintext provider
pub const IDENTITY_KEY_HINT: &str = "identity";

const SECRETBOX_HINT_PREFIX: &str = "secretbox";

/// Number of providers in a rendered configuration: the write provider plus
/// the read fallback
const EXPECTED_PROVIDER_COUNT: usize = 2;

/// Hint for a secretbox key
#[must_use]
pub fn secretbox_key_hint(key_name: &str) -> String {
    format!("{SECRETBOX_HINT_PREFIX}/{key_name}")
}

/// Hint of the key the API server currently writes with, read from the
/// encryption configuration secret
pub fn active_key_hint(secret: &Secret) -> Result<String, ReconcilerError> {
    let config = encryption_config::from_secret(secret)?;
    active_key_hint_from_config(&config)
}

/// Hint of the write provider of a parsed configuration
///
/// Requires exactly one resource entry with exactly two providers.
pub fn active_key_hint_from_config(
    config: &EncryptionConfigurationFile,
) -> Result<String, ReconcilerError> {
    let [resource] = config.resources.as_slice() else {
        return Err(ReconcilerError::EncryptionConfig(format!(
            "expected exactly 1 resource entry, found {}",
            config.resources.len()
        )));
    };
    if resource.providers.len() != EXPECTED_PROVIDER_COUNT {
        return Err(ReconcilerError::EncryptionConfig(format!(
            "expected exactly {EXPECTED_PROVIDER_COUNT} providers, found {}",
            resource.providers.len()
        )));
    }

    let primary = &resource.providers[0];
    if let Some(secretbox) = &primary.secretbox {
        let key = secretbox.keys.first().ok_or_else(|| {
            ReconcilerError::EncryptionConfig("secretbox provider has no keys".to_string())
        })?;
        return Ok(secretbox_key_hint(&key.name));
    }
    if primary.identity.is_some() {
        return Ok(IDENTITY_KEY_HINT.to_string());
    }

    Err(ReconcilerError::EncryptionConfig(
        "unsupported primary encryption provider".to_string(),
    ))
}

/// Hint of the key the spec asks for
///
/// Disabled or absent configuration resolves to `identity` regardless of any
/// secretbox keys still listed.
pub fn configured_key_hint(spec: &ClusterSpec) -> Result<String, ReconcilerError> {
    let Some(config) = spec.encryption_configuration.as_ref().filter(|c| c.enabled) else {
        return Ok(IDENTITY_KEY_HINT.to_string());
    };

    if config.kms.is_some() {
        return Err(ReconcilerError::Validation(
            "kms encryption provider is not supported".to_string(),
        ));
    }

    match config.secretbox.as_ref() {
        Some(secretbox) => secretbox
            .keys
            .first()
            .map(|key| secretbox_key_hint(&key.name))
            .ok_or_else(|| {
                ReconcilerError::Validation("secretbox requires at least one key".to_string())
            }),
        None => Err(ReconcilerError::Validation(
            "no encryption provider configured".to_string(),
        )),
    }
}
