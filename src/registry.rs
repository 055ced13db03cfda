use std::collections::HashMap;
use std::sync::Arc;

use mac_address::MacAddress;
use tokio::sync::RwLock;

use crate::drivers::Device;

/// Process-wide table of known devices.
///
/// The map lock only guards structure and is held just long enough to clone
/// an `Arc`; per-device state is serialized by each device's own lock.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<MacAddress, Arc<Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `device` unless its address is already known. Returns the
    /// registered device, or `None` if an entry already existed.
    pub async fn insert_if_absent(&self, device: Device) -> Option<Arc<Device>> {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.address()) {
            return None;
        }
        let device = Arc::new(device);
        devices.insert(device.address(), device.clone());
        Some(device)
    }

    pub async fn get(&self, address: &MacAddress) -> Option<Arc<Device>> {
        self.devices.read().await.get(address).cloned()
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::DriverConfig;
    use crate::drivers::Variant;
    use crate::peripheral::{AddressType, DiscoveryEvent};

    fn device(address: &str, rssi: i16) -> Device {
        let event = DiscoveryEvent {
            address: address.parse().unwrap(),
            address_type: AddressType::Public,
            rssi: Some(rssi),
            is_new: true,
        };
        Device::new(
            Variant::Presence,
            &event,
            None,
            &DriverConfig::default(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_first() {
        let registry = DeviceRegistry::new();
        assert!(
            registry
                .insert_if_absent(device("00:11:22:33:44:55", -40))
                .await
                .is_some()
        );
        assert!(
            registry
                .insert_if_absent(device("00:11:22:33:44:55", -90))
                .await
                .is_none()
        );
        assert_eq!(registry.len().await, 1);

        let address = "00:11:22:33:44:55".parse().unwrap();
        let stored = registry.get(&address).await.unwrap();
        assert_eq!(stored.snapshot().await.rssi, Some(-40));
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let registry = DeviceRegistry::new();
        let address = "00:11:22:33:44:55".parse().unwrap();
        assert!(registry.get(&address).await.is_none());
        assert_eq!(registry.len().await, 0);
    }
}
