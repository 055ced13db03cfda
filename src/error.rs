use mac_address::MacAddress;
use thiserror::Error;

use crate::peripheral::Register;

/// Failure talking to a peripheral over the radio.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peripheral {0} is not known to the adapter")]
    NotFound(MacAddress),
    #[error("peripheral {address} does not expose register {register:?}")]
    MissingRegister {
        address: MacAddress,
        register: Register,
    },
    #[error("empty response reading {0:?}")]
    EmptyResponse(Register),
    #[error(transparent)]
    Ble(#[from] btleplug::Error),
}

/// Reasons a sensor payload is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload too short ({0} bytes)")]
    Truncated(usize),
    #[error("moisture reading {0}% is out of range")]
    MoistureOutOfRange(u8),
    #[error("sensor reported not ready")]
    NotReady,
    #[error("payload is all zeros")]
    Empty,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Mqtt(#[from] rumqttc::ClientError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Anything that can go wrong during a scheduled update.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid sensor payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("firmware version unavailable")]
    FirmwareUnavailable,
}
