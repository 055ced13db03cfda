use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;

use super::{DeviceEntry, Driver};
use crate::messages::{DeviceSnapshot, DeviceState, PresenceState};

/// Tracks whether a device is still advertising. A device is present from the
/// moment it is seen until a scheduled check finds it silent for longer than
/// `scan_timeout`.
#[derive(Debug)]
pub struct PresenceDriver {
    present: bool,
    scan_timeout: Duration,
}

impl PresenceDriver {
    pub fn new(scan_timeout: Duration) -> Self {
        PresenceDriver {
            present: true,
            scan_timeout,
        }
    }

    /// Returns `true` only on the present to absent edge.
    fn check_timeout(&mut self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // a clock step backwards counts as no time elapsed
        let silent_for = (now - last_seen).to_std().unwrap_or_default();
        if self.present && silent_for > self.scan_timeout {
            self.present = false;
            return true;
        }
        false
    }
}

impl Driver for PresenceDriver {
    fn on_discovery_refresh(&mut self) -> bool {
        let arrived = !self.present;
        self.present = true;
        arrived
    }

    fn state(&self) -> DeviceState {
        DeviceState::Presence(PresenceState {
            present: self.present,
        })
    }
}

impl DeviceEntry<PresenceDriver> {
    pub(super) async fn expire(&self, now: DateTime<Utc>) -> Option<DeviceSnapshot> {
        let mut guard = self.record.lock().await;
        let record = &mut *guard;
        if record.driver.check_timeout(record.last_seen, now) {
            info!(
                "{} not seen since {}, marking absent",
                self.address, record.last_seen
            );
            return Some(self.snapshot_of(record));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as TimeDelta;

    use super::*;
    use crate::config::DriverConfig;
    use crate::drivers::{Device, Variant};
    use crate::peripheral::{AddressType, DiscoveryEvent};
    use crate::testing::FakeIo;

    fn device(t0: DateTime<Utc>) -> Device {
        let event = DiscoveryEvent {
            address: "00:1A:7D:DA:71:13".parse().unwrap(),
            address_type: AddressType::Public,
            rssi: Some(-50),
            is_new: true,
        };
        Device::new(Variant::Presence, &event, None, &DriverConfig::default(), t0)
    }

    fn present(snapshot: &DeviceSnapshot) -> bool {
        match &snapshot.state {
            DeviceState::Presence(state) => state.present,
            DeviceState::Sensor(_) => panic!("not a presence snapshot"),
        }
    }

    #[tokio::test]
    async fn test_timeout_boundary() {
        let io = FakeIo::default();
        let t0 = Utc::now();
        let device = device(t0);

        let update = device
            .on_scheduled_update(&io, t0 + TimeDelta::seconds(59))
            .await
            .unwrap();
        assert!(update.is_none());
        assert!(present(&device.snapshot().await));

        let update = device
            .on_scheduled_update(&io, t0 + TimeDelta::seconds(61))
            .await
            .unwrap();
        assert!(!present(&update.unwrap()));
        assert!(!present(&device.snapshot().await));
        assert!(io.calls().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_timeouts_are_idempotent() {
        let io = FakeIo::default();
        let t0 = Utc::now();
        let device = device(t0);

        assert!(
            device
                .on_scheduled_update(&io, t0 + TimeDelta::seconds(61))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            device
                .on_scheduled_update(&io, t0 + TimeDelta::seconds(120))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_discovery_brings_device_back() {
        let io = FakeIo::default();
        let t0 = Utc::now();
        let device = device(t0);
        device
            .on_scheduled_update(&io, t0 + TimeDelta::seconds(61))
            .await
            .unwrap();

        let later = t0 + TimeDelta::seconds(300);
        let arrived = device.on_discovery_refresh(Some(-40), later).await.unwrap();
        assert!(present(&arrived));
        assert_eq!(arrived.last_seen, later);

        // already present, nothing to announce
        assert!(
            device
                .on_discovery_refresh(Some(-42), later + TimeDelta::seconds(1))
                .await
                .is_none()
        );

        // the window restarts from the new sighting
        assert!(
            device
                .on_scheduled_update(&io, later + TimeDelta::seconds(59))
                .await
                .unwrap()
                .is_none()
        );
    }
}
