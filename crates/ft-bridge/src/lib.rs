//! HTTP gateway for the tracker: health, latest location, battery status,
//! remote alarm and metrics, behind a pre-shared API key.

pub mod auth;
pub mod error;
pub mod http_api;
