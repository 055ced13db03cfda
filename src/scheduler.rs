//! Periodic device refreshes.
//!
//! Every device with an update interval owns one job. A coarse ticker checks
//! which jobs are due; each due job is spawned as its own task so slow radios
//! do not hold up other devices. A job whose previous run has not finished
//! skips its turn instead of queueing behind it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, warn};
use mac_address::MacAddress;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::messages::PublishSink;
use crate::peripheral::PeripheralIo;
use crate::registry::DeviceRegistry;

struct Job {
    address: MacAddress,
    interval: Duration,
    next_run: Instant,
    in_flight: Arc<AtomicBool>,
}

/// Clears the in-flight flag even if the update panics.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Scheduler {
    tick: Duration,
    jobs: Mutex<Vec<Job>>,
    registry: Arc<DeviceRegistry>,
    io: Arc<dyn PeripheralIo>,
    sink: Arc<dyn PublishSink>,
}

impl Scheduler {
    pub fn new(
        tick: Duration,
        registry: Arc<DeviceRegistry>,
        io: Arc<dyn PeripheralIo>,
        sink: Arc<dyn PublishSink>,
    ) -> Self {
        Scheduler {
            tick,
            jobs: Mutex::new(Vec::new()),
            registry,
            io,
            sink,
        }
    }

    /// Add a recurring job for `address`. The first run is due immediately.
    pub async fn schedule(&self, address: MacAddress, interval: Duration) {
        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|job| job.address == address) {
            debug!("{} already scheduled", address);
            return;
        }
        debug!("Scheduling {} every {:?}", address, interval);
        jobs.push(Job {
            address,
            interval,
            next_run: Instant::now(),
            in_flight: Arc::new(AtomicBool::new(false)),
        });
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.run_pending().await;
        }
    }

    /// Start every job that is due. Returns the spawned runs.
    pub async fn run_pending(&self) -> Vec<JoinHandle<()>> {
        let now = Instant::now();
        let mut started = Vec::new();
        let mut jobs = self.jobs.lock().await;

        for job in jobs.iter_mut().filter(|job| job.next_run <= now) {
            job.next_run = now + job.interval;

            if job.in_flight.swap(true, Ordering::AcqRel) {
                debug!("Previous update of {} still running, skipping", job.address);
                continue;
            }

            let guard = InFlight(job.in_flight.clone());
            let address = job.address;
            let registry = self.registry.clone();
            let io = self.io.clone();
            let sink = self.sink.clone();
            started.push(tokio::spawn(async move {
                let _guard = guard;
                run_job(address, &registry, io.as_ref(), sink.as_ref()).await;
            }));
        }
        started
    }
}

async fn run_job(
    address: MacAddress,
    registry: &DeviceRegistry,
    io: &dyn PeripheralIo,
    sink: &dyn PublishSink,
) {
    let Some(device) = registry.get(&address).await else {
        error!("Scheduled device {} is not registered", address);
        return;
    };

    match device.on_scheduled_update(io, Utc::now()).await {
        Ok(Some(snapshot)) => {
            if let Err(err) = sink.publish(&snapshot).await {
                error!("Error publishing {}: {}", address, err);
            }
        }
        Ok(None) => {}
        Err(err) => warn!("Update of {} failed: {}", address, err),
    }
}
