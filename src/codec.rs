//! Sensor-data record of the flower-care sensor family.
//!
//! Layout (little-endian, 16 bytes on the wire):
//!
//! | offset | size | field                        |
//! |--------|------|------------------------------|
//! | 0      | 2    | temperature, i16, 0.1 °C     |
//! | 2      | 1    | reserved                     |
//! | 3      | 4    | brightness, u32, lux         |
//! | 7      | 1    | moisture, u8, %              |
//! | 8      | 2    | conductivity, i16, µS/cm     |
//! | 10     | 6    | reserved                     |

use crate::error::DecodeError;

#[cfg(test)]
pub const PAYLOAD_LEN: usize = 16;
const FIELDS_LEN: usize = 10;
const TAIL_OFFSET: usize = 10;

/// Command written to the mode-change register before reading sensor data.
pub const MODE_CHANGE: [u8; 2] = [0xA0, 0x1F];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub temperature: f32,
    pub brightness: u32,
    pub moisture: u8,
    pub conductivity: i16,
}

fn byte_sum(bytes: &[u8]) -> u32 {
    bytes.iter().map(|b| u32::from(*b)).sum()
}

/// Validate and decode a sensor-data payload.
///
/// `firmware_ready_check` enables the tail check newer firmware needs: those
/// devices answer with a zeroed tail until the mode change has taken effect.
pub fn decode(data: &[u8], firmware_ready_check: bool) -> Result<SensorReading, DecodeError> {
    if data.len() < FIELDS_LEN {
        return Err(DecodeError::Truncated(data.len()));
    }

    let moisture = data[7];
    if moisture > 100 {
        return Err(DecodeError::MoistureOutOfRange(moisture));
    }
    if firmware_ready_check && byte_sum(&data[TAIL_OFFSET..]) == 0 {
        return Err(DecodeError::NotReady);
    }
    if byte_sum(data) == 0 {
        return Err(DecodeError::Empty);
    }

    let temperature = i16::from_le_bytes([data[0], data[1]]);
    Ok(SensorReading {
        temperature: f32::from(temperature) / 10.0,
        brightness: u32::from_le_bytes([data[3], data[4], data[5], data[6]]),
        moisture,
        conductivity: i16::from_le_bytes([data[8], data[9]]),
    })
}

/// Lay out a reading the way the device reports it. Reserved bytes in the
/// tail are filled with `tail`.
#[cfg(test)]
pub fn encode(reading: &SensorReading, tail: u8) -> [u8; PAYLOAD_LEN] {
    let mut out = [tail; PAYLOAD_LEN];
    let temperature = (reading.temperature * 10.0).round() as i16;
    out[0..2].copy_from_slice(&temperature.to_le_bytes());
    out[2] = 0;
    out[3..7].copy_from_slice(&reading.brightness.to_le_bytes());
    out[7] = reading.moisture;
    out[8..10].copy_from_slice(&reading.conductivity.to_le_bytes());
    out
}
