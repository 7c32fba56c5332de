//! Core domain for the findmy-tracker daemon.
//!
//! Shared by every other crate in the workspace:
//! - [`types`]: devices, observations and their persisted document shape
//! - [`error`]: the tracker-wide error taxonomy
//! - [`config`]: environment-driven configuration
//! - [`store`]: the append-only observation store
//! - [`status`]: tracker liveness shared with the HTTP gateway

pub mod config;
pub mod error;
pub mod status;
pub mod store;
pub mod types;
