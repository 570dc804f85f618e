//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use cluster_encryption_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconciler types and seams
pub use crate::controller::reconciler::{
    reconcile, BackoffState, EventPublisher, KubeClient, Reconciler, ReconcilerError,
};

// Key hints
pub use crate::controller::reconciler::keyhint::{
    active_key_hint, configured_key_hint, IDENTITY_KEY_HINT,
};

// Config types
pub use crate::config::{ControllerConfig, ServerConfig};
