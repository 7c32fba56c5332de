use std::sync::Arc;

use ft_core::error::TrackerError;
use ft_core::types::Device;
use tracing::{info, warn};

use crate::session::{Session, SessionHolder};
use crate::types::RemoteDevice;

/// The two fields the selection policy matches on.
pub trait Selectable {
    fn model(&self) -> &str;
    fn name(&self) -> &str;
}

impl Selectable for RemoteDevice {
    fn model(&self) -> &str {
        RemoteDevice::model(self)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Selectable for Device {
    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pick the device `selector` names out of a device list.
///
/// 1. exact model (`deviceDisplayName`) match
/// 2. exact name match
/// 3. first case-insensitive substring match on model or name
///
/// Several exact matches at the same step are ambiguous.
pub fn select_device<'a, D: Selectable>(
    devices: &'a [D],
    selector: &str,
) -> Result<&'a D, TrackerError> {
    let exact_steps: [fn(&D, &str) -> bool; 2] = [
        |d, s| d.model() == s,
        |d, s| d.name() == s,
    ];
    for step in exact_steps {
        let hits: Vec<&D> = devices.iter().filter(|d| step(d, selector)).collect();
        match hits.as_slice() {
            [] => continue,
            [only] => return Ok(*only),
            many => {
                return Err(TrackerError::AmbiguousSelector {
                    selector: selector.to_string(),
                    matches: many.len(),
                })
            }
        }
    }

    let needle = selector.to_lowercase();
    devices
        .iter()
        .find(|d| {
            d.model().to_lowercase().contains(&needle) || d.name().to_lowercase().contains(&needle)
        })
        .ok_or_else(|| TrackerError::DeviceNotFound {
            selector: selector.to_string(),
        })
}

/// Resolves the configured selector to one device per session generation.
pub struct DeviceLocator {
    holder: Arc<SessionHolder>,
    selector: String,
}

impl DeviceLocator {
    pub fn new(holder: Arc<SessionHolder>, selector: impl Into<String>) -> Self {
        Self {
            holder,
            selector: selector.into(),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// The device for this session, from cache or a fresh device list.
    pub async fn resolve(&self, session: &Session) -> Result<Device, TrackerError> {
        if let Some(device) = self.holder.cached_device(session.generation()).await {
            return Ok(device);
        }
        let devices = self.holder.list_devices(session).await?;
        self.resolve_from(session, &devices).await
    }

    /// Select from a device list already fetched for `session` and cache
    /// the result.
    pub async fn resolve_from(
        &self,
        session: &Session,
        devices: &[RemoteDevice],
    ) -> Result<Device, TrackerError> {
        let found = select_device(devices, &self.selector)?;
        Ok(self.remember(session, found).await)
    }

    /// Latest remote snapshot (location and battery) of the resolved device.
    ///
    /// When nothing is cached the selection runs on the same device list,
    /// so a tick costs one remote call either way. A cached device that has
    /// vanished from the account invalidates the cache and reports
    /// `DeviceNotFound`; the next call re-resolves.
    pub async fn locate(&self, session: &Session) -> Result<RemoteDevice, TrackerError> {
        let cached = self.holder.cached_device(session.generation()).await;
        let devices = self.holder.list_devices(session).await?;

        match cached {
            Some(device) => match devices.into_iter().find(|d| d.id == device.device_id) {
                Some(found) => Ok(found),
                None => {
                    warn!(device_id = %device.device_id, "cached device no longer listed");
                    self.invalidate().await;
                    Err(TrackerError::DeviceNotFound {
                        selector: self.selector.clone(),
                    })
                }
            },
            None => {
                let found = select_device(&devices, &self.selector)?;
                self.remember(session, found).await;
                Ok(found.clone())
            }
        }
    }

    /// The resolution cached for the current session, if any.
    pub async fn cached(&self) -> Option<Device> {
        self.holder.current_device().await
    }

    pub async fn invalidate(&self) {
        self.holder.clear_device().await;
    }

    async fn remember(&self, session: &Session, found: &RemoteDevice) -> Device {
        let device = found.identity();
        info!(
            selector = %self.selector,
            device_id = %device.device_id,
            name = %device.name,
            model = %device.model,
            "device resolved"
        );
        self.holder
            .cache_device(session.generation(), device.clone())
            .await;
        device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, phone, FakeFailure, FakeFindMy};

    fn devices() -> Vec<RemoteDevice> {
        vec![
            phone("watch", "Alex's Watch", "Apple Watch Series 9", 1.0, 1.0),
            phone("pro", "Work Phone", "iPhone 16 Pro", 37.7749, -122.4194),
            phone("mini", "Old Phone", "iPhone 13 mini", 2.0, 2.0),
        ]
    }

    #[test]
    fn exact_model_wins() {
        let list = devices();
        assert_eq!(select_device(&list, "iPhone 16 Pro").unwrap().id, "pro");
    }

    #[test]
    fn exact_name_when_no_model_matches() {
        let list = devices();
        assert_eq!(select_device(&list, "Old Phone").unwrap().id, "mini");
    }

    #[test]
    fn model_beats_name() {
        let list = vec![
            phone("a", "iPhone 16 Pro", "iPhone 15", 0.0, 0.0),
            phone("b", "Other", "iPhone 16 Pro", 0.0, 0.0),
        ];
        assert_eq!(select_device(&list, "iPhone 16 Pro").unwrap().id, "b");
    }

    #[test]
    fn substring_fallback_is_case_insensitive_first_wins() {
        let list = devices();
        assert_eq!(select_device(&list, "iphone").unwrap().id, "pro");
        assert_eq!(select_device(&list, "WATCH").unwrap().id, "watch");
    }

    #[test]
    fn duplicate_exact_models_are_ambiguous() {
        let list = vec![
            phone("a", "One", "iPhone 16 Pro", 0.0, 0.0),
            phone("b", "Two", "iPhone 16 Pro", 0.0, 0.0),
        ];
        let err = select_device(&list, "iPhone 16 Pro").unwrap_err();
        assert_eq!(
            err,
            TrackerError::AmbiguousSelector {
                selector: "iPhone 16 Pro".into(),
                matches: 2
            }
        );
    }

    #[test]
    fn duplicate_exact_names_are_ambiguous() {
        let list = vec![
            phone("a", "Phone", "iPhone 15", 0.0, 0.0),
            phone("b", "Phone", "iPhone 14", 0.0, 0.0),
        ];
        assert_eq!(select_device(&list, "Phone").unwrap_err().code(), "ambiguous_selector");
    }

    #[test]
    fn no_match_is_not_found() {
        let list = devices();
        assert_eq!(select_device(&list, "Pixel").unwrap_err().code(), "device_not_found");
        assert_eq!(select_device::<RemoteDevice>(&[], "iPhone").unwrap_err().code(), "device_not_found");
    }

    #[test]
    fn policy_applies_to_recorded_identities() {
        let list: Vec<Device> = devices().iter().map(RemoteDevice::identity).collect();
        assert_eq!(select_device(&list, "iPhone 16 Pro").unwrap().device_id, "pro");
        assert_eq!(select_device(&list, "old phone").unwrap().device_id, "mini");
    }

    async fn setup() -> (Arc<FakeFindMy>, Arc<SessionHolder>, DeviceLocator, Session) {
        let fake = Arc::new(FakeFindMy::new(devices()));
        let holder = Arc::new(SessionHolder::new(fake.clone()));
        let session = holder.install(fake::credentials()).await.unwrap();
        let locator = DeviceLocator::new(holder.clone(), "iPhone 16 Pro");
        (fake, holder, locator, session)
    }

    #[tokio::test]
    async fn resolve_caches_per_generation() {
        let (fake, _holder, locator, session) = setup().await;
        let calls = fake.list_calls();

        let first = locator.resolve(&session).await.unwrap();
        let second = locator.resolve(&session).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.device_id, "pro");
        assert_eq!(fake.list_calls(), calls + 1);
        assert_eq!(locator.cached().await.unwrap().device_id, "pro");
    }

    #[tokio::test]
    async fn resolve_from_existing_listing_makes_no_call() {
        let (fake, _holder, locator, session) = setup().await;
        let calls = fake.list_calls();

        let device = locator.resolve_from(&session, &devices()).await.unwrap();
        assert_eq!(device.device_id, "pro");
        assert_eq!(fake.list_calls(), calls);
        assert_eq!(locator.cached().await, Some(device));
    }

    #[tokio::test]
    async fn locate_uses_one_call_and_fills_cache() {
        let (fake, _holder, locator, session) = setup().await;
        let calls = fake.list_calls();

        let remote = locator.locate(&session).await.unwrap();
        assert_eq!(remote.id, "pro");
        assert_eq!(fake.list_calls(), calls + 1);
        assert!(locator.cached().await.is_some());
    }

    #[tokio::test]
    async fn vanished_device_invalidates_cache() {
        let (fake, _holder, locator, session) = setup().await;
        locator.resolve(&session).await.unwrap();

        fake.set_devices(vec![phone("watch", "Watch", "Apple Watch", 0.0, 0.0)]);
        let err = locator.locate(&session).await.unwrap_err();
        assert_eq!(err.code(), "device_not_found");
        assert!(locator.cached().await.is_none());

        fake.set_devices(vec![phone("pro2", "New", "iPhone 16 Pro", 0.0, 0.0)]);
        assert_eq!(locator.locate(&session).await.unwrap().id, "pro2");
    }

    #[tokio::test]
    async fn expiry_clears_resolution() {
        let (fake, holder, locator, session) = setup().await;
        locator.resolve(&session).await.unwrap();

        fake.fail_list(Some(FakeFailure::Unauthorized));
        holder.clear_device().await;
        let err = locator.resolve(&session).await.unwrap_err();
        assert_eq!(err.code(), "auth_expired");
        assert!(locator.cached().await.is_none());
        assert!(holder.get().await.is_err());
    }
}
