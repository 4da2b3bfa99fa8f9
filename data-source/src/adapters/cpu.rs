//! Host CPU usage as a data source.
//!
//! The vehicle context is fixed to `"CPU"`. Every subscribed key, whatever its
//! name, receives the global CPU usage percentage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gauge_protocol::VariableKey;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use sysinfo::{System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SourceError};
use crate::source::{clamp_poll_rate, DataSource, ValueCallback, VehicleCallback};
use crate::var_table::VarTable;

struct CpuSampler {
    system: System,
    last_refresh: Option<Instant>,
    usage: f32,
}

impl CpuSampler {
    fn new() -> Self {
        Self {
            system: System::new(),
            last_refresh: None,
            usage: 0.0,
        }
    }

    /// Latest usage percentage. sysinfo needs a minimum gap between refreshes,
    /// so faster polls reuse the previous sample.
    fn sample(&mut self) -> f32 {
        let due = self
            .last_refresh
            .map_or(true, |at| at.elapsed() >= MINIMUM_CPU_UPDATE_INTERVAL);

        if due {
            self.system.refresh_cpu_usage();
            self.usage = self.system.global_cpu_usage();
            self.last_refresh = Some(Instant::now());
        }

        self.usage
    }
}

pub struct CpuSource {
    connected: AtomicBool,
    listening: AtomicBool,
    vars: VarTable,
    vehicle_callback: RwLock<Option<VehicleCallback>>,
    sampler: Mutex<CpuSampler>,
    stop: Mutex<CancellationToken>,
}

impl CpuSource {
    pub const NAME: &'static str = "cpu";
    pub const VEHICLE: &'static str = "CPU";

    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            vars: VarTable::new(),
            vehicle_callback: RwLock::new(None),
            sampler: Mutex::new(CpuSampler::new()),
            stop: Mutex::new(CancellationToken::new()),
        }
    }

    fn deliver_all(&self) {
        if self.vars.is_empty() {
            return;
        }

        let usage = self.sampler.lock().sample();
        for (_, callbacks) in self.vars.snapshot() {
            for callback in &callbacks {
                callback(Value::from(f64::from(usage)));
            }
        }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for CpuSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        if !self.connected.swap(true, Ordering::SeqCst) {
            *self.stop.lock() = CancellationToken::new();
            tracing::info!("CPU source connected");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.stop.lock().cancel();
            tracing::info!("CPU source disconnected");
        }
        Ok(())
    }

    fn subscribe_var(&self, key: &VariableKey, on_value: ValueCallback) -> Result<()> {
        if self.vars.insert(key, on_value) {
            tracing::debug!("CPU source subscribed to {}", key);
        }
        Ok(())
    }

    fn unsubscribe_var(&self, key: &VariableKey) -> Result<()> {
        self.vars.remove(key);
        Ok(())
    }

    fn subscribe_vehicle(&self, on_change: VehicleCallback) {
        // The vehicle never changes; keep the callback for symmetry with other sources
        *self.vehicle_callback.write() = Some(on_change);
    }

    fn current_vehicle(&self) -> Option<String> {
        Some(Self::VEHICLE.to_string())
    }

    async fn listen(&self, poll_rate: Duration, shutdown: CancellationToken) -> Result<()> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected(Self::NAME.to_string()));
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyListening(Self::NAME.to_string()));
        }

        let stop = self.stop.lock().clone();
        let mut ticker = interval(clamp_poll_rate(poll_rate));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("Polling CPU usage");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = stop.cancelled() => break,
                _ = ticker.tick() => self.deliver_all(),
            }
        }

        self.listening.store(false, Ordering::SeqCst);
        tracing::info!("Stopped polling CPU usage");
        Ok(())
    }
}
