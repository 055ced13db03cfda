//! Flower-care soil sensors.
//!
//! Each update resolves the firmware version (cached for a day, since reading
//! it costs a connection and battery), switches newer firmware into data mode
//! and then reads one sensor record. Readings only replace the cached values
//! when the whole record validates.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::{DeviceEntry, Driver};
use crate::codec::{self, MODE_CHANGE, SensorReading};
use crate::config::DriverConfig;
use crate::error::{TransportError, UpdateError};
use crate::messages::{DeviceSnapshot, DeviceState, SensorState};
use crate::peripheral::{PeripheralIo, Register};

#[derive(Debug)]
pub struct SensorDriver {
    state: SensorState,
    firmware_next_check: Option<DateTime<Utc>>,
    firmware_threshold: String,
    firmware_refresh: Duration,
    firmware_retry: Duration,
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Compare dotted version strings numerically, component by component.
pub fn version_at_least(version: &str, threshold: &str) -> bool {
    fn components(version: &str) -> Vec<u32> {
        version
            .split('.')
            .map(|part| {
                part.trim_matches(|c: char| !c.is_ascii_digit())
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    }
    components(version) >= components(threshold)
}

/// Version/battery register: battery percentage, one unused byte, then the
/// firmware version as ASCII.
fn parse_version_battery(data: &[u8]) -> Result<(u8, String), TransportError> {
    if data.len() < 3 {
        return Err(TransportError::EmptyResponse(Register::VersionBattery));
    }
    let version = String::from_utf8_lossy(&data[2..])
        .trim_end_matches('\0')
        .trim()
        .to_string();
    Ok((data[0], version))
}

impl SensorDriver {
    pub fn new(config: &DriverConfig) -> Self {
        SensorDriver {
            state: SensorState::default(),
            firmware_next_check: None,
            firmware_threshold: config.firmware_threshold.clone(),
            firmware_refresh: config.firmware_refresh,
            firmware_retry: config.firmware_retry,
        }
    }

    fn firmware_due(&self, now: DateTime<Utc>) -> bool {
        self.firmware_next_check.is_none_or(|next| next < now)
    }

    fn record_firmware(&mut self, battery: u8, version: String, now: DateTime<Utc>) {
        self.state.battery = Some(battery);
        self.state.firmware_version = Some(version);
        self.firmware_next_check = Some(after(now, self.firmware_refresh));
    }

    fn defer_firmware(&mut self, now: DateTime<Utc>) {
        self.firmware_next_check = Some(after(now, self.firmware_retry));
    }

    fn apply(&mut self, reading: SensorReading, now: DateTime<Utc>) {
        self.state.temperature = Some(reading.temperature);
        self.state.brightness = Some(reading.brightness);
        self.state.moisture = Some(reading.moisture);
        self.state.conductivity = Some(reading.conductivity);
        self.state.last_update = Some(now);
    }
}

impl Driver for SensorDriver {
    fn state(&self) -> DeviceState {
        DeviceState::Sensor(self.state.clone())
    }
}

impl DeviceEntry<SensorDriver> {
    /// Cached firmware version, re-read from the device when the cache is due.
    pub async fn firmware_version(
        &self,
        io: &dyn PeripheralIo,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let due = self.record.lock().await.driver.firmware_due(now);
        if due {
            let result = io
                .read_register(self.address, Register::VersionBattery)
                .await
                .and_then(|data| parse_version_battery(&data));

            let mut record = self.record.lock().await;
            match result {
                Ok((battery, version)) => {
                    debug!(
                        "{} firmware {}, battery {}%",
                        self.address, version, battery
                    );
                    record.driver.record_firmware(battery, version, now);
                }
                Err(err) => {
                    warn!("Failed to read firmware of {}: {}", self.address, err);
                    record.driver.defer_firmware(now);
                }
            }
        }

        self.record
            .lock()
            .await
            .driver
            .state
            .firmware_version
            .clone()
    }

    pub(super) async fn update(
        &self,
        io: &dyn PeripheralIo,
        now: DateTime<Utc>,
    ) -> Result<DeviceSnapshot, UpdateError> {
        let firmware = self
            .firmware_version(io, now)
            .await
            .ok_or(UpdateError::FirmwareUnavailable)?;

        let threshold = self.record.lock().await.driver.firmware_threshold.clone();
        let newer_firmware = version_at_least(&firmware, &threshold);
        if newer_firmware {
            if let Err(err) = io
                .write_register(self.address, Register::ModeChange, &MODE_CHANGE, true)
                .await
            {
                warn!("Mode change on {} failed, reading anyway: {}", self.address, err);
            }
        }

        let data = io.read_register(self.address, Register::SensorData).await?;
        let reading = codec::decode(&data, newer_firmware)?;

        let mut record = self.record.lock().await;
        record.driver.apply(reading, now);
        info!(
            "{}: {:.1}°C, {} lux, {}%, {} µS/cm",
            self.address,
            reading.temperature,
            reading.brightness,
            reading.moisture,
            reading.conductivity
        );
        Ok(self.snapshot_of(&record))
    }
}
