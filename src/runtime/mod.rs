//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server and client setup
//! - `watch_loop`: the `Cluster` controller and its secondary watches
//! - `error_policy`: reconcile backoff and watch stream error handling

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
