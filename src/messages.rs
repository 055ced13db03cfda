use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mac_address::MacAddress;
use serde_derive::Serialize;

use crate::error::PublishError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PresenceState {
    pub present: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SensorState {
    pub firmware_version: Option<String>,
    pub battery: Option<u8>,
    pub temperature: Option<f32>,
    pub brightness: Option<u32>,
    pub moisture: Option<u8>,
    pub conductivity: Option<i16>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceState {
    Presence(PresenceState),
    Sensor(SensorState),
}

/// Public view of a device, as published on the bus.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    #[serde(rename = "id", serialize_with = "serialize_address")]
    pub address: MacAddress,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub state: DeviceState,
}

impl DeviceSnapshot {
    /// Name used as the topic leaf; falls back to the address.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.address.to_string())
    }
}

fn serialize_address<S: serde::Serializer>(
    address: &MacAddress,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(address)
}

#[async_trait]
pub trait PublishSink: Send + Sync {
    async fn publish(&self, snapshot: &DeviceSnapshot) -> Result<(), PublishError>;
}
