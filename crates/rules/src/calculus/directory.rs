//! Per-user authorized sites and bound devices.

use std::collections::HashMap;
use std::sync::RwLock;

use attend_core::UserId;

use super::geo::GeoPoint;

/// Organization-directory collaborator consulted by location and device checks.
pub trait AttendanceDirectory: Send + Sync {
    fn authorized_sites(&self, user_id: UserId) -> Vec<GeoPoint>;
    fn bound_devices(&self, user_id: UserId) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    sites: RwLock<HashMap<UserId, Vec<GeoPoint>>>,
    devices: RwLock<HashMap<UserId, Vec<String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_site(&self, user_id: UserId, site: GeoPoint) {
        self.sites
            .write()
            .expect("directory lock poisoned")
            .entry(user_id)
            .or_default()
            .push(site);
    }

    pub fn bind_device(&self, user_id: UserId, device_id: impl Into<String>) {
        let device_id = device_id.into();
        let mut devices = self.devices.write().expect("directory lock poisoned");
        let bound = devices.entry(user_id).or_default();
        if !bound.contains(&device_id) {
            bound.push(device_id);
        }
    }

    pub fn unbind_device(&self, user_id: UserId, device_id: &str) {
        if let Some(bound) = self.devices.write().expect("directory lock poisoned").get_mut(&user_id) {
            bound.retain(|d| d != device_id);
        }
    }
}

impl AttendanceDirectory for InMemoryDirectory {
    fn authorized_sites(&self, user_id: UserId) -> Vec<GeoPoint> {
        self.sites
            .read()
            .expect("directory lock poisoned")
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    fn bound_devices(&self, user_id: UserId) -> Vec<String> {
        self.devices
            .read()
            .expect("directory lock poisoned")
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }
}
