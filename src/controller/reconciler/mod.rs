//! # Reconciler
//!
//! Drives encryption-at-rest for a single `Cluster`.
//!
//! ## Flow
//!
//! ```text
//! (no status) -> Pending -> EncryptionNeeded -> Active
//!                   ^              |              |
//!                   |              v              |
//!                   |           Failed            |
//!                   +-----------------------------+
//!                          key change / disable
//! ```
//!
//! The state lives entirely in `Cluster.status.encryption`; every call
//! recomputes the next action from observed objects and performs at most one
//! transition.
//!
//! ## Modules
//!
//! - [`reconcile`] - phase dispatch and error surfacing
//! - [`convergence`] - has the API server rolled out the current configuration
//! - [`job`] - re-encryption job creation and observation
//! - [`keyhint`] - comparable key identifiers
//! - [`validation`] - key material checks
//! - [`status`] - diff-before-write status updates
//! - [`client`] / [`events`] - Kubernetes seams

pub mod client;
pub mod convergence;
pub mod events;
pub mod job;
pub mod keyhint;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

pub use client::{KubeClient, KubeClientImpl};
pub use events::{EventPublisher, KubeEventPublisher};
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError};
