//! Cluster Encryption Controller Library
//!
//! Encryption-at-rest state machine for Kubermatic user clusters, plus the
//! runtime that drives it.
//!
//! ## Quick Start
//!
//! ```rust
//! use cluster_encryption_controller::prelude::*;
//! ```
//!
//! This brings commonly used types into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
