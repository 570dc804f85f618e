//! # Types
//!
//! Core types for the reconciler: the error taxonomy and the shared context.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::client::{KubeClient, KubeClientImpl};
use crate::controller::reconciler::events::{EventPublisher, KubeEventPublisher};
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// User supplied configuration is unusable (bad key length, missing key
    /// reference, unsupported provider). Retried with backoff.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The rendered `EncryptionConfiguration` could not be interpreted
    #[error("invalid encryption configuration: {0}")]
    EncryptionConfig(String),
    /// Internal state the state machine relies on is missing. Signals a bug.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReconcilerError {
    /// Short label used for metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::EncryptionConfig(_) => "encryption_config",
            ReconcilerError::InvariantViolation(_) => "invariant_violation",
            ReconcilerError::Kube(_) => "kube",
            ReconcilerError::Serialization(_) => "serialization",
        }
    }
}

/// Backoff state for a specific cluster
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Shared reconciliation context
///
/// All Kubernetes access goes through `kube` so that the state machine can be
/// exercised against mocks and in-memory fakes.
#[derive(Clone)]
pub struct Reconciler {
    pub kube: Arc<dyn KubeClient>,
    pub events: Arc<dyn EventPublisher>,
    pub config: Arc<ControllerConfig>,
    // Backoff state per cluster (identified by name), owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Build a context backed by a real Kubernetes client
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let events = KubeEventPublisher::new(client.clone(), &config.controller_name);
        Self::with_clients(
            Arc::new(KubeClientImpl::new(client, &config.controller_name)),
            Arc::new(events),
            config,
        )
    }

    /// Build a context from explicit collaborators (tests, alternative stores)
    #[must_use]
    pub fn with_clients(
        kube: Arc<dyn KubeClient>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            events,
            config: Arc::new(config),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the error history of a cluster after a successful reconcile
    pub fn reset_backoff(&self, cluster_name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(cluster_name);
        }
    }
}
