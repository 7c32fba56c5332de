//! Client side of the iCloud Find My web service.
//!
//! [`session::SessionHolder`] owns the authenticated session and its
//! lifecycle, [`locator::DeviceLocator`] resolves the configured selector to
//! one device, and [`client::FindMyApi`] is the seam between them and the
//! network ([`client::ICloudClient`] in production, [`fake::FakeFindMy`] in
//! tests).

pub mod client;
pub mod credentials;
pub mod error;
pub mod fake;
pub mod locator;
pub mod session;
pub mod types;

pub use client::{FindMyApi, ICloudClient};
pub use credentials::Credentials;
pub use locator::DeviceLocator;
pub use session::{Session, SessionHolder, SessionState};
