//! # Controller
//!
//! Core controller modules for the cluster encryption controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `encryption_config`: The API server's `EncryptionConfiguration` format
//! - `reconciler`: The encryption state machine
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod encryption_config;
pub mod reconciler;
pub mod server;
