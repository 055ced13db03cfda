use async_trait::async_trait;
use btleplug::api::{
    AddressType as BleAddressType, Central as _, CentralEvent, Characteristic, Peripheral as _,
    ScanFilter, WriteType, bleuuid::uuid_from_u16,
};
use btleplug::platform::{Adapter, Peripheral};
use futures::StreamExt as _;
use log::debug;
use mac_address::MacAddress;

use crate::error::TransportError;
use crate::peripheral::{AddressType, DiscoveryEvent, DiscoveryStream, PeripheralIo, Register};

/// Discovery and register access on top of a btleplug adapter.
#[derive(Clone)]
pub struct BleScanner {
    adapter: Adapter,
}

async fn discovery_event(adapter: &Adapter, event: CentralEvent) -> Option<DiscoveryEvent> {
    let (id, is_new) = match event {
        CentralEvent::DeviceDiscovered(id) => (id, true),
        CentralEvent::DeviceUpdated(id) => (id, false),
        _ => return None,
    };

    let properties = match adapter.peripheral(&id).await {
        Ok(peripheral) => peripheral.properties().await.ok().flatten(),
        Err(err) => {
            debug!("Peripheral {:?} vanished: {}", id, err);
            None
        }
    }?;

    let address_type = match properties.address_type {
        Some(BleAddressType::Public) => AddressType::Public,
        Some(BleAddressType::Random) => AddressType::Random,
        None => {
            debug!("No address type for {}, dropping event", properties.address);
            return None;
        }
    };

    Some(DiscoveryEvent {
        address: MacAddress::new(properties.address.into_inner()),
        address_type,
        rssi: properties.rssi,
        is_new,
    })
}

impl BleScanner {
    pub fn new(adapter: Adapter) -> Self {
        BleScanner { adapter }
    }

    /// Start scanning and return the stream of discovery events.
    pub async fn start(&self) -> Result<DiscoveryStream, btleplug::Error> {
        let events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        Ok(events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move { discovery_event(&adapter, event).await }
            })
            .boxed())
    }

    async fn connect(&self, address: MacAddress) -> Result<Peripheral, TransportError> {
        let mut found = None;
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.address().into_inner() == address.bytes() {
                found = Some(peripheral);
                break;
            }
        }
        let peripheral = found.ok_or(TransportError::NotFound(address))?;

        if !peripheral.is_connected().await? {
            debug!("Connecting to {}", address);
            peripheral.connect().await?;
            peripheral.discover_services().await?;
        }
        Ok(peripheral)
    }

    fn characteristic(
        peripheral: &Peripheral,
        address: MacAddress,
        register: Register,
    ) -> Result<Characteristic, TransportError> {
        let uuid = uuid_from_u16(register.uuid16());
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::MissingRegister { address, register })
    }
}

#[async_trait]
impl PeripheralIo for BleScanner {
    // Reads end the connection. Writes leave it open so the following read
    // sees the mode the write selected.
    async fn read_register(
        &self,
        address: MacAddress,
        register: Register,
    ) -> Result<Vec<u8>, TransportError> {
        let peripheral = self.connect(address).await?;
        let result = match Self::characteristic(&peripheral, address, register) {
            Ok(characteristic) => peripheral.read(&characteristic).await.map_err(Into::into),
            Err(err) => Err(err),
        };
        if let Err(err) = peripheral.disconnect().await {
            debug!("Disconnecting {} failed: {}", address, err);
        }

        let data = result?;
        if data.is_empty() {
            return Err(TransportError::EmptyResponse(register));
        }
        debug!(
            "Read {} bytes from {} handle {:#04x}",
            data.len(),
            address,
            register.handle()
        );
        Ok(data)
    }

    async fn write_register(
        &self,
        address: MacAddress,
        register: Register,
        data: &[u8],
        require_response: bool,
    ) -> Result<(), TransportError> {
        let peripheral = self.connect(address).await?;
        let characteristic = Self::characteristic(&peripheral, address, register)?;
        let write_type = if require_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        peripheral.write(&characteristic, data, write_type).await?;
        debug!(
            "Wrote {} bytes to {} handle {:#04x}",
            data.len(),
            address,
            register.handle()
        );
        Ok(())
    }
}
