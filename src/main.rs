//! # Cluster Encryption Controller
//!
//! Drives encryption-at-rest for user cluster control planes hosted in a seed
//! cluster.
//!
//! ## Overview
//!
//! For every `Cluster` that enables encryption the controller:
//! 1. **Initializes** the encryption status after validating the keys
//! 2. **Waits** for the API server to roll out the rendered `EncryptionConfiguration`
//! 3. **Re-encrypts** all protected resources with a one-shot Job
//! 4. **Tracks** key rotations and disablement until the status is torn down
//!
//! Progress is visible in `Cluster.status.encryption`; failures are reported
//! as Warning Events on the Cluster.

use anyhow::Result;
use cluster_encryption_controller::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(
        init.client,
        init.reconciler,
        init.server_state,
        init.controller_config,
    )
    .await
}
