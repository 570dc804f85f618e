//! # Configuration
//!
//! Process configuration read once at startup from environment variables.
//! Changing a value requires a restart.

pub mod controller;
pub mod server;

pub use controller::{ControllerConfig, LogFormat};
pub use server::ServerConfig;
