//! # Key Validation
//!
//! Validates secretbox keys before they are handed to the API server. Keys
//! must decode (standard base64) to exactly 32 bytes. Errors name the key but
//! never include its value.

use crate::controller::reconciler::client::KubeClient;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{Cluster, SecretboxKey};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;
use zeroize::Zeroizing;

/// Secretbox key length in bytes
pub const SECRETBOX_KEY_LENGTH: usize = 32;

/// Validate a base64 encoded key value
pub fn validate_key_value(key_name: &str, encoded: &str) -> Result<(), ReconcilerError> {
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return Err(ReconcilerError::Validation(format!(
            "key {key_name}: value is not valid base64"
        )));
    };
    let decoded = Zeroizing::new(decoded);

    if decoded.len() != SECRETBOX_KEY_LENGTH {
        return Err(ReconcilerError::Validation(format!(
            "key {key_name}: expected {SECRETBOX_KEY_LENGTH} bytes after base64 decoding, got {}",
            decoded.len()
        )));
    }
    Ok(())
}

/// Validate every configured secretbox key of a cluster
///
/// Referenced Secrets are looked up in the cluster namespace. An enabled
/// configuration using an unsupported provider fails validation.
pub async fn validate_encryption_keys(
    client: &dyn KubeClient,
    cluster: &Cluster,
) -> Result<(), ReconcilerError> {
    let Some(config) = cluster.spec.encryption_configuration.as_ref() else {
        return Ok(());
    };

    if config.enabled && config.kms.is_some() {
        return Err(ReconcilerError::Validation(
            "kms encryption provider is not supported".to_string(),
        ));
    }

    let keys = config
        .secretbox
        .as_ref()
        .map(|s| s.keys.as_slice())
        .unwrap_or_default();
    if config.enabled && keys.is_empty() {
        return Err(ReconcilerError::Validation(
            "secretbox requires at least one key".to_string(),
        ));
    }

    let namespace = cluster.namespace_name();
    for key in keys {
        validate_key(client, &namespace, key).await?;
    }
    debug!(
        cluster = cluster.metadata.name.as_deref().unwrap_or("unknown"),
        keys = keys.len(),
        "encryption keys validated"
    );
    Ok(())
}

async fn validate_key(
    client: &dyn KubeClient,
    namespace: &str,
    key: &SecretboxKey,
) -> Result<(), ReconcilerError> {
    if key.name.is_empty() {
        return Err(ReconcilerError::Validation(
            "secretbox key without a name".to_string(),
        ));
    }

    match (&key.value, &key.secret_ref) {
        (Some(value), _) => validate_key_value(&key.name, value),
        (None, Some(secret_ref)) => {
            if secret_ref.name.is_empty() || secret_ref.key.is_empty() {
                return Err(ReconcilerError::Validation(format!(
                    "key {}: secretRef requires name and key",
                    key.name
                )));
            }
            let secret = client
                .get_secret(namespace, &secret_ref.name)
                .await?
                .ok_or_else(|| {
                    ReconcilerError::Validation(format!(
                        "key {}: secret {namespace}/{} not found",
                        key.name, secret_ref.name
                    ))
                })?;
            let data = secret
                .data
                .as_ref()
                .and_then(|d| d.get(&secret_ref.key))
                .ok_or_else(|| {
                    ReconcilerError::Validation(format!(
                        "key {}: secret {namespace}/{} has no data key {}",
                        key.name, secret_ref.name, secret_ref.key
                    ))
                })?;
            let Ok(encoded) = std::str::from_utf8(&data.0) else {
                return Err(ReconcilerError::Validation(format!(
                    "key {}: secret data is not valid base64 text",
                    key.name
                )));
            };
            validate_key_value(&key.name, encoded)
        }
        (None, None) => Err(ReconcilerError::Validation(format!(
            "key {}: either value or secretRef must be set",
            key.name
        ))),
    }
}
