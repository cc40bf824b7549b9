use std::{
    sync::{
        Arc, Mutex,
        mpsc::{self, Receiver, Sender},
    },
    thread::JoinHandle,
    time::Duration,
};

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    foundation::{
        core::PixelGrid,
        error::{CoverError, CoverResult},
    },
    quantize::{AmbientColorPair, pick_ambient_pair, quantize},
};

pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(2);

/// A light that takes a colour pair in one idempotent request.
pub trait AmbientDevice: Send {
    fn name(&self) -> &str;

    fn set_colors(&self, pair: AmbientColorPair) -> CoverResult<()>;

    fn turn_off(&self) -> CoverResult<()>;
}

/// WLED controller driven through its `/win` HTTP API.
pub struct WledDevice {
    base_url: String,
    agent: ureq::Agent,
}

impl WledDevice {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEVICE_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    pub fn colors_url(&self, pair: AmbientColorPair) -> String {
        let (a, b) = (pair.primary, pair.secondary);
        format!(
            "{}/win&T=1&R={}&G={}&B={}&R2={}&G2={}&B2={}",
            self.base_url, a.r, a.g, a.b, b.r, b.g, b.b
        )
    }

    pub fn off_url(&self) -> String {
        format!("{}/win&T=0", self.base_url)
    }

    fn get(&self, url: &str) -> CoverResult<()> {
        self.agent
            .get(url)
            .call()
            .map(|_| ())
            .map_err(|e| CoverError::device(format!("{}: {e}", self.base_url)))
    }
}

impl AmbientDevice for WledDevice {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn set_colors(&self, pair: AmbientColorPair) -> CoverResult<()> {
        self.get(&self.colors_url(pair))
    }

    fn turn_off(&self) -> CoverResult<()> {
        self.get(&self.off_url())
    }
}

#[derive(Debug)]
pub enum AmbientJob {
    /// Extract `k` colours from `grid` and send a pair to every device.
    Colors { grid: Arc<PixelGrid>, k: usize },
    Off,
}

/// Owns the ambient worker thread. Dropping it drains queued jobs and joins the worker.
pub struct AmbientDispatcher {
    tx: Option<Sender<AmbientJob>>,
    last: Arc<Mutex<Option<AmbientColorPair>>>,
    device_names: Vec<String>,
    worker: Option<JoinHandle<()>>,
}

impl AmbientDispatcher {
    pub fn spawn(devices: Vec<Box<dyn AmbientDevice>>) -> Self {
        Self::spawn_seeded(devices, rand::random())
    }

    pub fn spawn_seeded(devices: Vec<Box<dyn AmbientDevice>>, seed: u64) -> Self {
        let (tx, rx) = mpsc::channel();
        let last = Arc::new(Mutex::new(None));
        let device_names = devices.iter().map(|d| d.name().to_string()).collect();
        let worker_last = Arc::clone(&last);
        let worker = std::thread::Builder::new()
            .name("ambient".to_string())
            .spawn(move || worker_loop(rx, devices, worker_last, StdRng::seed_from_u64(seed)))
            .map_err(|e| tracing::error!(error = %e, "could not start ambient worker"))
            .ok();
        Self {
            tx: worker.as_ref().map(|_| tx),
            last,
            device_names,
            worker,
        }
    }

    pub fn dispatch_colors(&self, grid: Arc<PixelGrid>, k: usize) {
        self.send(AmbientJob::Colors { grid, k });
    }

    pub fn turn_off(&self) {
        self.send(AmbientJob::Off);
    }

    fn send(&self, job: AmbientJob) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                tracing::warn!("ambient worker has stopped");
            }
        }
    }

    pub fn last_pair(&self) -> Option<AmbientColorPair> {
        *self.last.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn device_names(&self) -> &[String] {
        &self.device_names
    }
}

impl Drop for AmbientDispatcher {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    rx: Receiver<AmbientJob>,
    devices: Vec<Box<dyn AmbientDevice>>,
    last: Arc<Mutex<Option<AmbientColorPair>>>,
    mut rng: StdRng,
) {
    while let Ok(mut job) = rx.recv() {
        // Only the newest queued job matters.
        while let Ok(newer) = rx.try_recv() {
            job = newer;
        }

        let pair = match job {
            AmbientJob::Colors { grid, k } => {
                match quantize(&grid, k, &mut rng).and_then(|p| pick_ambient_pair(&p, &mut rng)) {
                    Ok(pair) => Some(pair),
                    Err(e) => {
                        tracing::warn!(error = %e, "ambient colour extraction failed");
                        continue;
                    }
                }
            }
            AmbientJob::Off => None,
        };

        for device in &devices {
            let sent = match pair {
                Some(pair) => device.set_colors(pair),
                None => device.turn_off(),
            };
            if let Err(e) = sent {
                tracing::debug!(device = device.name(), error = %e, "ambient device skipped");
            }
        }
        if let Some(pair) = pair {
            tracing::debug!(primary = %pair.primary, secondary = %pair.secondary, "ambient colours sent");
        }
        *last.lock().unwrap_or_else(|p| p.into_inner()) = pair;
    }
}
