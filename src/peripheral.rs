use async_trait::async_trait;
use futures::stream::BoxStream;
use mac_address::MacAddress;

use crate::error::TransportError;

/// GATT registers exposed by the sensor family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    VersionBattery,
    SensorData,
    ModeChange,
}

impl Register {
    pub fn handle(&self) -> u16 {
        match self {
            Register::VersionBattery => 0x38,
            Register::SensorData => 0x35,
            Register::ModeChange => 0x33,
        }
    }

    /// 16-bit UUID of the characteristic behind this handle.
    pub fn uuid16(&self) -> u16 {
        match self {
            Register::VersionBattery => 0x1a02,
            Register::SensorData => 0x1a01,
            Register::ModeChange => 0x1a00,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

#[derive(Clone, Debug)]
pub struct DiscoveryEvent {
    pub address: MacAddress,
    pub address_type: AddressType,
    pub rssi: Option<i16>,
    pub is_new: bool,
}

pub type DiscoveryStream = BoxStream<'static, DiscoveryEvent>;

/// Register access against a single peripheral. Implementations are not
/// expected to be reentrant for the same address.
#[async_trait]
pub trait PeripheralIo: Send + Sync {
    async fn read_register(
        &self,
        address: MacAddress,
        register: Register,
    ) -> Result<Vec<u8>, TransportError>;

    async fn write_register(
        &self,
        address: MacAddress,
        register: Register,
        data: &[u8],
        require_response: bool,
    ) -> Result<(), TransportError>;
}
