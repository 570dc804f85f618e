//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable. Label keys and
//! object names form the contract with the subsystems that render the
//! encryption configuration and roll out the API server.

/// Default HTTP server port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 8085;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue interval for reconciliation errors (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Requeue interval while waiting on external convergence (API server rollout, job completion)
pub const DEFAULT_CONVERGENCE_REQUEUE_SECS: u64 = 10;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default maximum number of clusters reconciled in parallel
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Name reported as the controller on status patches and Events
pub const DEFAULT_CONTROLLER_NAME: &str = "kkp-encryption-at-rest-controller";

/// Utility image that provides `kubectl` for the re-encryption job
pub const DEFAULT_REENCRYPTION_JOB_IMAGE: &str = "quay.io/kubermatic/util:2.4.0";

/// Finished re-encryption jobs are garbage collected after one day
pub const DEFAULT_REENCRYPTION_JOB_TTL_SECS: i32 = 86_400;

/// Prefix of the seed namespace that hosts a user cluster control plane
pub const CLUSTER_NAMESPACE_PREFIX: &str = "cluster-";

/// Secret holding the rendered `EncryptionConfiguration`
pub const ENCRYPTION_CONFIGURATION_SECRET_NAME: &str = "encryption-configuration";

/// Data key of the rendered `EncryptionConfiguration` inside its secret
pub const ENCRYPTION_CONFIGURATION_KEY: &str = "encryption-configuration.yaml";

/// Label on the encryption secret carrying the SHA-1 digest of the desired spec
pub const ENCRYPTION_SPEC_HASH_LABEL: &str = "kubermatic.k8c.io/encryption-spec-hash";

/// Label on API server pods recording the encryption secret revision they run with
pub const ENCRYPTION_SECRET_REVISION_LABEL: &str = "kubermatic.k8c.io/encryption-secret-revision";

/// `app` label value shared by the API server deployment and its pods
pub const APISERVER_APP_LABEL_VALUE: &str = "apiserver";

/// Name of the API server deployment in the cluster namespace
pub const APISERVER_DEPLOYMENT_NAME: &str = "apiserver";

/// Label on re-encryption jobs naming the cluster
pub const CLUSTER_LABEL: &str = "kubermatic.k8c.io/cluster";

/// Label on re-encryption jobs naming the encryption secret revision
pub const SECRET_REVISION_LABEL: &str = "kubermatic.k8c.io/secret-revision";

/// Label selecting which controller-manager instance owns a cluster
pub const WORKER_NAME_LABEL: &str = "worker-name";

/// Admin kubeconfig secret mounted into the re-encryption job
pub const ADMIN_KUBECONFIG_SECRET_NAME: &str = "admin-kubeconfig";

/// Condition type tracking whether encryption has been initialized
pub const CONDITION_ENCRYPTION_INITIALIZED: &str = "EncryptionInitialized";

/// Event reason for any reconcile failure
pub const EVENT_REASON_RECONCILING_ERROR: &str = "ReconcilingError";

/// Smallest delay before retrying a failed reconciliation (seconds)
pub const DEFAULT_RECONCILIATION_BACKOFF_MIN_SECS: u64 = 5;
