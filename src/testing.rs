//! In-memory peripherals and sink used by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mac_address::MacAddress;
use tokio::sync::Semaphore;

use crate::error::{PublishError, TransportError};
use crate::messages::{DeviceSnapshot, PublishSink};
use crate::peripheral::{PeripheralIo, Register};

/// Version/battery register contents for the given battery level and version.
pub fn firmware_payload(battery: u8, version: &str) -> Vec<u8> {
    let mut data = vec![battery, 0x15];
    data.extend_from_slice(version.as_bytes());
    data
}

#[derive(Default)]
pub struct FakeIo {
    responses: Mutex<HashMap<(MacAddress, Register), Option<Vec<u8>>>>,
    calls: Mutex<Vec<(MacAddress, Register)>>,
    writes: Mutex<Vec<(MacAddress, Register, Vec<u8>)>>,
    sensor_gate: Option<Arc<Semaphore>>,
}

impl FakeIo {
    /// Sensor-data reads wait for a permit from `gate` before answering.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        FakeIo {
            sensor_gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn respond(&self, address: MacAddress, register: Register, data: Vec<u8>) {
        self.responses
            .lock()
            .unwrap()
            .insert((address, register), Some(data));
    }

    pub fn fail(&self, address: MacAddress, register: Register) {
        self.responses
            .lock()
            .unwrap()
            .insert((address, register), None);
    }

    pub fn calls(&self) -> Vec<(MacAddress, Register)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, address: MacAddress, register: Register) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == (address, register))
            .count()
    }

    pub fn written(&self, address: MacAddress, register: Register) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, r, _)| *a == address && *r == register)
            .map(|(_, _, data)| data.clone())
            .collect()
    }

    fn response(&self, address: MacAddress, register: Register) -> Option<Option<Vec<u8>>> {
        self.responses
            .lock()
            .unwrap()
            .get(&(address, register))
            .cloned()
    }
}

#[async_trait]
impl PeripheralIo for FakeIo {
    async fn read_register(
        &self,
        address: MacAddress,
        register: Register,
    ) -> Result<Vec<u8>, TransportError> {
        self.calls.lock().unwrap().push((address, register));
        if let (Some(gate), Register::SensorData) = (&self.sensor_gate, register) {
            gate.acquire().await.unwrap().forget();
        }
        match self.response(address, register) {
            Some(Some(data)) => Ok(data),
            _ => Err(TransportError::NotFound(address)),
        }
    }

    async fn write_register(
        &self,
        address: MacAddress,
        register: Register,
        data: &[u8],
        _require_response: bool,
    ) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push((address, register));
        self.writes
            .lock()
            .unwrap()
            .push((address, register, data.to_vec()));
        match self.response(address, register) {
            Some(None) => Err(TransportError::NotFound(address)),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<DeviceSnapshot>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<DeviceSnapshot> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PublishSink for RecordingSink {
    async fn publish(&self, snapshot: &DeviceSnapshot) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}
