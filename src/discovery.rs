use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt as _;
use log::{debug, error, info};
use mac_address::MacAddress;

use crate::config::DriverConfig;
use crate::drivers::{Device, Variant, select_variant};
use crate::messages::{DeviceSnapshot, PublishSink};
use crate::peripheral::{DiscoveryEvent, DiscoveryStream};
use crate::registry::DeviceRegistry;
use crate::scheduler::Scheduler;

/// Turns advertisements into registry entries and keeps their liveness
/// fields current. Discovery never talks to the peripherals themselves.
pub struct DiscoveryLoop {
    registry: Arc<DeviceRegistry>,
    scheduler: Arc<Scheduler>,
    sink: Arc<dyn PublishSink>,
    config: DriverConfig,
    names: HashMap<MacAddress, String>,
}

impl DiscoveryLoop {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        scheduler: Arc<Scheduler>,
        sink: Arc<dyn PublishSink>,
        config: DriverConfig,
        names: HashMap<MacAddress, String>,
    ) -> Self {
        DiscoveryLoop {
            registry,
            scheduler,
            sink,
            config,
            names,
        }
    }

    /// Consume events until the stream ends.
    pub async fn run(&self, mut events: DiscoveryStream) {
        while let Some(event) = events.next().await {
            self.handle(event, Utc::now()).await;
        }
        info!("Discovery stream closed");
    }

    pub async fn handle(&self, event: DiscoveryEvent, now: DateTime<Utc>) {
        if let Some(device) = self.registry.get(&event.address).await {
            self.refresh(&device, &event, now).await;
            return;
        }

        if !event.is_new {
            debug!("Ignoring update for unregistered device {}", event.address);
            return;
        }

        let Some(variant) =
            select_variant(&event.address, event.address_type, &self.config.vendor_prefix)
        else {
            debug!(
                "Discovered device {} ({:?}), but no driver available",
                event.address, event.address_type
            );
            return;
        };

        let name = self.names.get(&event.address).cloned();
        let device = Device::new(variant, &event, name, &self.config, now);
        self.register(device, &event, now).await;
    }

    async fn register(&self, device: Device, event: &DiscoveryEvent, now: DateTime<Utc>) {
        let Some(device) = self.registry.insert_if_absent(device).await else {
            // another event registered this address first
            if let Some(winner) = self.registry.get(&event.address).await {
                self.refresh(&winner, event, now).await;
            }
            return;
        };
        debug!(
            "Discovered device {} ({:?}), using {:?} driver",
            device.address(),
            device.address_type(),
            device.variant()
        );

        if let Some(interval) = device.update_interval() {
            self.scheduler.schedule(device.address(), interval).await;
        }
        if device.variant() == Variant::Presence {
            self.announce(&device.snapshot().await).await;
        }
    }

    async fn refresh(&self, device: &Device, event: &DiscoveryEvent, now: DateTime<Utc>) {
        if let Some(snapshot) = device.on_discovery_refresh(event.rssi, now).await {
            info!("{} is back", event.address);
            self.announce(&snapshot).await;
        }
    }

    async fn announce(&self, snapshot: &DeviceSnapshot) {
        if let Err(err) = self.sink.publish(snapshot).await {
            error!("Error publishing {}: {}", snapshot.address, err);
        }
    }
}
