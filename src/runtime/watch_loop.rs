//! # Watch Loop
//!
//! Runs the `Cluster` controller. Besides Clusters themselves, changes to the
//! objects the state machine observes re-trigger the owning cluster:
//!
//! - the `encryption-configuration` Secret (re-rendered configuration)
//! - the `apiserver` Deployment (rollout progress)
//! - re-encryption Jobs (completion)
//!
//! Secondary objects are mapped back to their cluster via the
//! `kubermatic.k8c.io/cluster` label or the `cluster-<name>` namespace.

use crate::config::ControllerConfig;
use crate::constants::{
    APISERVER_APP_LABEL_VALUE, CLUSTER_LABEL, CLUSTER_NAMESPACE_PREFIX,
    ENCRYPTION_CONFIGURATION_SECRET_NAME, WORKER_NAME_LABEL,
};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Cluster;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::{Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{controller, watcher, Controller};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Label selector restricting watched Clusters to this worker
#[must_use]
pub fn cluster_label_selector(worker_name: Option<&str>) -> String {
    match worker_name {
        Some(worker) => format!("{WORKER_NAME_LABEL}={worker}"),
        None => format!("!{WORKER_NAME_LABEL}"),
    }
}

/// Cluster owning a control plane namespace
#[must_use]
pub fn cluster_for_namespace(namespace: Option<&str>) -> Option<ObjectRef<Cluster>> {
    namespace
        .and_then(|ns| ns.strip_prefix(CLUSTER_NAMESPACE_PREFIX))
        .filter(|name| !name.is_empty())
        .map(ObjectRef::new)
}

/// Cluster a re-encryption job belongs to
#[must_use]
pub fn cluster_for_job(job: &Job) -> Option<ObjectRef<Cluster>> {
    job.labels()
        .get(CLUSTER_LABEL)
        .map(|name| ObjectRef::new(name))
        .or_else(|| cluster_for_namespace(job.namespace().as_deref()))
}

/// Run the controller watch loop until shutdown
///
/// The controller stream is restarted after it ends or fails, with the delays
/// from the configuration.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: Arc<ControllerConfig>,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
    });

    let cluster_watcher = watcher::Config::default()
        .labels(&cluster_label_selector(config.worker_name.as_deref()));
    let secret_watcher = watcher::Config::default()
        .fields(&format!("metadata.name={ENCRYPTION_CONFIGURATION_SECRET_NAME}"));
    let deployment_watcher =
        watcher::Config::default().labels(&format!("app={APISERVER_APP_LABEL_VALUE}"));
    let job_watcher = watcher::Config::default().labels(CLUSTER_LABEL);

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );
        info!("Starting controller watch loop...");

        let backoff = backoff_duration_ms.clone();
        let filter_config = config.clone();
        Controller::new(Api::<Cluster>::all(client.clone()), cluster_watcher.clone())
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .watches(
                Api::<Secret>::all(client.clone()),
                secret_watcher.clone(),
                |secret| cluster_for_namespace(secret.namespace().as_deref()),
            )
            .watches(
                Api::<Deployment>::all(client.clone()),
                deployment_watcher.clone(),
                |deployment| cluster_for_namespace(deployment.namespace().as_deref()),
            )
            .watches(Api::<Job>::all(client.clone()), job_watcher.clone(), |job| {
                cluster_for_job(&job)
            })
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, reconciler.clone())
            .filter_map(move |result| {
                let backoff = backoff.clone();
                let config = filter_config.clone();
                async move {
                    match &result {
                        Ok((object, action)) => {
                            backoff.store(
                                config.backoff_start_ms,
                                std::sync::atomic::Ordering::Relaxed,
                            );
                            debug!(cluster = %object.name, ?action, "watch.event.success");
                            Some(result)
                        }
                        Err(e) => {
                            let error_string = format!("{e:?}");
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_secs,
                            )
                            .await
                            .map(|()| result)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut terminate) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = ctrl_c => {}
                _ = terminate.recv() => {}
            }
            return;
        }
    }
    if let Err(e) = ctrl_c.await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
