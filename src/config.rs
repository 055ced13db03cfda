use std::str::FromStr;
use std::time::Duration;

use mac_address::MacAddress;
use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub devices: Option<Vec<BleDevice>>,
    pub scan: Option<ScanConfig>,
    pub presence: Option<PresenceConfig>,
    pub sensor: Option<SensorConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    pub topic_path: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BleDevice {
    pub address: MacAddress,
    pub name: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ScanConfig {
    pub tick_millis: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PresenceConfig {
    pub update_interval_seconds: Option<u64>,
    pub scan_timeout_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct SensorConfig {
    pub update_interval_seconds: Option<u64>,
    pub vendor_prefix: Option<String>,
    pub firmware_threshold: Option<String>,
    pub firmware_refresh_hours: Option<u64>,
    pub firmware_retry_minutes: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid vendor prefix {0:?}, expected three hex octets like C4:7C:8D")]
pub struct InvalidPrefix(String);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Prefix(#[from] InvalidPrefix),
    #[error("scan.tick_millis must be at least 1")]
    ZeroTick,
    #[error("{field} = {value} is too large")]
    OutOfRange { field: &'static str, value: u64 },
}

/// First three octets of a hardware address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VendorPrefix([u8; 3]);

impl VendorPrefix {
    pub fn matches(&self, address: &MacAddress) -> bool {
        address.bytes()[..3] == self.0
    }
}

impl FromStr for VendorPrefix {
    type Err = InvalidPrefix;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets = s
            .split([':', '-'])
            .map(|octet| match octet.len() {
                2 => u8::from_str_radix(octet, 16).ok(),
                _ => None,
            })
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| InvalidPrefix(s.to_string()))?;

        <[u8; 3]>::try_from(octets)
            .map(VendorPrefix)
            .map_err(|_| InvalidPrefix(s.to_string()))
    }
}

/// Resolved driver settings shared by every device.
#[derive(Clone, Debug)]
pub struct DriverConfig {
    pub presence_interval: Option<Duration>,
    pub scan_timeout: Duration,
    pub sensor_interval: Option<Duration>,
    pub vendor_prefix: VendorPrefix,
    pub firmware_threshold: String,
    pub firmware_refresh: Duration,
    pub firmware_retry: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            presence_interval: Some(Duration::from_secs(10)),
            scan_timeout: Duration::from_secs(60),
            sensor_interval: Some(Duration::from_secs(30 * 60)),
            vendor_prefix: VendorPrefix([0xC4, 0x7C, 0x8D]),
            firmware_threshold: "2.6.6".to_string(),
            firmware_refresh: Duration::from_secs(24 * 60 * 60),
            firmware_retry: Duration::from_secs(5 * 60),
        }
    }
}

fn scaled(field: &'static str, value: u64, unit_secs: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(unit_secs)
        .map(Duration::from_secs)
        .ok_or(ConfigError::OutOfRange { field, value })
}

// Zero disables scheduling for the variant.
fn interval(seconds: Option<u64>, default: Option<Duration>) -> Option<Duration> {
    match seconds {
        Some(0) => None,
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => default,
    }
}

impl AppConfig {
    pub fn driver_config(&self) -> Result<DriverConfig, ConfigError> {
        let defaults = DriverConfig::default();
        let presence = self.presence.clone().unwrap_or_default();
        let sensor = self.sensor.clone().unwrap_or_default();

        let vendor_prefix = match sensor.vendor_prefix.as_deref() {
            Some(prefix) => prefix.parse()?,
            None => defaults.vendor_prefix,
        };

        Ok(DriverConfig {
            presence_interval: interval(
                presence.update_interval_seconds,
                defaults.presence_interval,
            ),
            scan_timeout: presence
                .scan_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.scan_timeout),
            sensor_interval: interval(sensor.update_interval_seconds, defaults.sensor_interval),
            vendor_prefix,
            firmware_threshold: sensor
                .firmware_threshold
                .unwrap_or(defaults.firmware_threshold),
            firmware_refresh: match sensor.firmware_refresh_hours {
                Some(hours) => scaled("sensor.firmware_refresh_hours", hours, 60 * 60)?,
                None => defaults.firmware_refresh,
            },
            firmware_retry: match sensor.firmware_retry_minutes {
                Some(minutes) => scaled("sensor.firmware_retry_minutes", minutes, 60)?,
                None => defaults.firmware_retry,
            },
        })
    }

    /// Scheduler tick; must be non-zero.
    pub fn tick(&self) -> Result<Duration, ConfigError> {
        match self.scan.as_ref().and_then(|s| s.tick_millis).unwrap_or(1000) {
            0 => Err(ConfigError::ZeroTick),
            millis => Ok(Duration::from_millis(millis)),
        }
    }
}
