use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::task::JoinHandle;

use crate::config::DriverConfig;
use crate::discovery::DiscoveryLoop;
use crate::messages::PublishSink;
use crate::peripheral::{DiscoveryStream, PeripheralIo};
use crate::registry::DeviceRegistry;
use crate::scheduler::Scheduler;

/// Owns the device registry and the two loops that share it.
pub struct Manager {
    registry: Arc<DeviceRegistry>,
    scheduler: Arc<Scheduler>,
    discovery: DiscoveryLoop,
}

/// A started [`Manager`]. Dropping it leaves the tasks running.
pub struct RunningManager {
    registry: Arc<DeviceRegistry>,
    jobs: Arc<Scheduler>,
    discovery: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

impl Manager {
    pub fn new(
        drivers: DriverConfig,
        tick: Duration,
        names: HashMap<mac_address::MacAddress, String>,
        io: Arc<dyn PeripheralIo>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let scheduler = Arc::new(Scheduler::new(tick, registry.clone(), io, sink.clone()));
        let discovery =
            DiscoveryLoop::new(registry.clone(), scheduler.clone(), sink, drivers, names);

        Manager {
            registry,
            scheduler,
            discovery,
        }
    }

    pub fn start(self, events: DiscoveryStream) -> RunningManager {
        info!("Starting discovery and update loops");
        let jobs = self.scheduler.clone();
        let scheduler = tokio::spawn(self.scheduler.run());
        let discovery = self.discovery;
        let discovery = tokio::spawn(async move { discovery.run(events).await });

        RunningManager {
            registry: self.registry,
            jobs,
            discovery,
            scheduler,
        }
    }
}

impl RunningManager {
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Wait for the discovery stream to end, then stop scheduling updates.
    pub async fn wait(&mut self) {
        if let Err(err) = (&mut self.discovery).await {
            error!("Discovery loop failed: {:?}", err);
        }
        self.scheduler.abort();
        info!(
            "Exiting manager, {} devices known, {} scheduled",
            self.registry.len().await,
            self.jobs.job_count().await
        );
    }

    /// Abort both loops. In-flight updates are not drained.
    pub fn stop(&self) {
        self.discovery.abort();
        self.scheduler.abort();
    }
}
