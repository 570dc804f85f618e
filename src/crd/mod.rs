//! # Custom Resource Definitions
//!
//! CRD types for the encryption-at-rest controller.
//!
//! The `Cluster` resource is owned by the wider platform. This controller only
//! reads `spec.encryptionConfiguration` and owns `status.encryption` plus the
//! `EncryptionInitialized` condition, so only those fields are modelled here.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `Cluster` CRD specification and helper accessors
//! - `encryption.rs` - Desired encryption configuration (providers, keys, resources)
//! - `status.rs` - Status types, encryption phases and conditions

mod encryption;
mod spec;
mod status;

// Re-export all public types
pub use encryption::{
    EncryptionConfiguration, SecretKeyRef, SecretboxEncryptionConfiguration, SecretboxKey,
};
pub use spec::{Cluster, ClusterSpec};
pub use status::{
    ClusterCondition, ClusterEncryptionPhase, ClusterEncryptionStatus, ClusterStatus,
    ConditionStatus,
};
