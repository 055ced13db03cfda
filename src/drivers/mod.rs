//! Per-family device drivers.
//!
//! A [`Device`] is a tagged union over [`DeviceEntry`]s, one per supported
//! family. Each entry carries the immutable identity of the peripheral plus a
//! [`Record`] behind its own lock: liveness metadata written by discovery and
//! driver state written by scheduled updates. The lock is never held across
//! radio I/O.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use mac_address::MacAddress;
use tokio::sync::Mutex;

use crate::config::{DriverConfig, VendorPrefix};
use crate::error::UpdateError;
use crate::messages::{DeviceSnapshot, DeviceState};
use crate::peripheral::{AddressType, DiscoveryEvent, PeripheralIo};

pub mod presence;
pub mod sensor;

pub use presence::PresenceDriver;
pub use sensor::SensorDriver;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Presence,
    Sensor,
}

/// Pick a driver for a newly discovered peripheral. `None` means the device is
/// not supported and should be ignored.
pub fn select_variant(
    address: &MacAddress,
    address_type: AddressType,
    prefix: &VendorPrefix,
) -> Option<Variant> {
    match address_type {
        AddressType::Public if prefix.matches(address) => Some(Variant::Sensor),
        AddressType::Public => Some(Variant::Presence),
        AddressType::Random => None,
    }
}

/// Behaviour every driver shares, independent of how it is updated.
pub trait Driver: Send {
    /// Called under the record lock for every discovery event. Returns `true`
    /// when the public state changed and should be announced.
    fn on_discovery_refresh(&mut self) -> bool {
        false
    }

    fn state(&self) -> DeviceState;
}

pub struct Record<D> {
    pub rssi: Option<i16>,
    pub last_seen: DateTime<Utc>,
    pub driver: D,
}

pub struct DeviceEntry<D> {
    address: MacAddress,
    address_type: AddressType,
    name: Option<String>,
    update_interval: Option<Duration>,
    record: Mutex<Record<D>>,
}

impl<D: Driver> DeviceEntry<D> {
    fn new(
        event: &DiscoveryEvent,
        name: Option<String>,
        update_interval: Option<Duration>,
        driver: D,
        now: DateTime<Utc>,
    ) -> Self {
        DeviceEntry {
            address: event.address,
            address_type: event.address_type,
            name,
            update_interval,
            record: Mutex::new(Record {
                rssi: event.rssi,
                last_seen: now,
                driver,
            }),
        }
    }

    fn snapshot_of(&self, record: &Record<D>) -> DeviceSnapshot {
        DeviceSnapshot {
            address: self.address,
            name: self.name.clone(),
            rssi: record.rssi,
            last_seen: record.last_seen,
            state: record.driver.state(),
        }
    }

    pub async fn snapshot(&self) -> DeviceSnapshot {
        let record = self.record.lock().await;
        self.snapshot_of(&record)
    }

    async fn on_discovery_refresh(
        &self,
        rssi: Option<i16>,
        now: DateTime<Utc>,
    ) -> Option<DeviceSnapshot> {
        let mut record = self.record.lock().await;
        if rssi.is_some() {
            record.rssi = rssi;
        }
        if now > record.last_seen {
            record.last_seen = now;
        }
        if record.driver.on_discovery_refresh() {
            Some(self.snapshot_of(&record))
        } else {
            None
        }
    }
}

pub enum Device {
    Presence(DeviceEntry<PresenceDriver>),
    Sensor(DeviceEntry<SensorDriver>),
}

impl Device {
    pub fn new(
        variant: Variant,
        event: &DiscoveryEvent,
        name: Option<String>,
        config: &DriverConfig,
        now: DateTime<Utc>,
    ) -> Self {
        match variant {
            Variant::Presence => Device::Presence(DeviceEntry::new(
                event,
                name,
                config.presence_interval,
                PresenceDriver::new(config.scan_timeout),
                now,
            )),
            Variant::Sensor => Device::Sensor(DeviceEntry::new(
                event,
                name,
                config.sensor_interval,
                SensorDriver::new(config),
                now,
            )),
        }
    }

    pub fn address(&self) -> MacAddress {
        match self {
            Device::Presence(entry) => entry.address,
            Device::Sensor(entry) => entry.address,
        }
    }

    pub fn address_type(&self) -> AddressType {
        match self {
            Device::Presence(entry) => entry.address_type,
            Device::Sensor(entry) => entry.address_type,
        }
    }

    pub fn variant(&self) -> Variant {
        match self {
            Device::Presence(_) => Variant::Presence,
            Device::Sensor(_) => Variant::Sensor,
        }
    }

    pub fn update_interval(&self) -> Option<Duration> {
        match self {
            Device::Presence(entry) => entry.update_interval,
            Device::Sensor(entry) => entry.update_interval,
        }
    }

    pub async fn snapshot(&self) -> DeviceSnapshot {
        match self {
            Device::Presence(entry) => entry.snapshot().await,
            Device::Sensor(entry) => entry.snapshot().await,
        }
    }

    /// Refresh liveness from a discovery event. Returns a snapshot when the
    /// event changed the device's public state.
    pub async fn on_discovery_refresh(
        &self,
        rssi: Option<i16>,
        now: DateTime<Utc>,
    ) -> Option<DeviceSnapshot> {
        match self {
            Device::Presence(entry) => entry.on_discovery_refresh(rssi, now).await,
            Device::Sensor(entry) => entry.on_discovery_refresh(rssi, now).await,
        }
    }

    /// Run one scheduled refresh. Returns a snapshot to publish, if any.
    pub async fn on_scheduled_update(
        &self,
        io: &dyn PeripheralIo,
        now: DateTime<Utc>,
    ) -> Result<Option<DeviceSnapshot>, UpdateError> {
        debug!("Updating {} ({:?})", self.address(), self.variant());
        match self {
            Device::Presence(entry) => Ok(entry.expire(now).await),
            Device::Sensor(entry) => entry.update(io, now).await.map(Some),
        }
    }
}
