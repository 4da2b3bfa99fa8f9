//! Emulated flight simulator
//!
//! Runs a [`FlightModel`] on a fast physics tick, delivers subscribed values at
//! the configured poll rate and switches the active vehicle on a slow timer so
//! clients exercise the re-initialization handshake.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gauge_protocol::VariableKey;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::flight_model::FlightModel;
use crate::error::{Result, SourceError};
use crate::source::{clamp_poll_rate, DataSource, ValueCallback, VehicleCallback};
use crate::var_table::VarTable;

const PHYSICS_TICK: Duration = Duration::from_millis(10);

/// Emulator settings read from `sourceOptions`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmulatorOptions {
    /// Vehicle names to rotate between
    pub vehicles: Vec<String>,
    /// Seconds between vehicle switches
    pub vehicle_interval_secs: u64,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            vehicles: vec!["Cessna Skyhawk".to_string(), "Piper PA44".to_string()],
            vehicle_interval_secs: 5,
        }
    }
}

impl EmulatorOptions {
    pub fn vehicle_interval(&self) -> Duration {
        Duration::from_secs(self.vehicle_interval_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.vehicles.is_empty() {
            return Err(invalid("at least one vehicle is required"));
        }
        if self.vehicle_interval_secs == 0 {
            return Err(invalid("vehicleIntervalSecs must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> SourceError {
    SourceError::InvalidOptions {
        source_name: EmulatorSource::NAME.to_string(),
        reason: reason.into(),
    }
}

/// Picks vehicles at random without repeating one until all have been used
struct VehicleCycle {
    all: Vec<String>,
    remaining: Vec<String>,
    rng: StdRng,
}

impl VehicleCycle {
    fn new(all: Vec<String>) -> Self {
        Self {
            remaining: all.clone(),
            all,
            rng: StdRng::from_os_rng(),
        }
    }

    /// The next vehicle, or `None` if the draw repeated the current one
    fn next(&mut self, current: Option<&str>) -> Option<String> {
        if self.remaining.is_empty() {
            self.remaining = self.all.clone();
        }

        let index = self.rng.random_range(0..self.remaining.len());
        let picked = self.remaining.remove(index);

        (current != Some(picked.as_str())).then_some(picked)
    }
}

/// Data source that fabricates plausible aircraft instrument values
pub struct EmulatorSource {
    options: EmulatorOptions,
    connected: AtomicBool,
    listening: AtomicBool,
    vars: VarTable,
    vehicle_callback: RwLock<Option<VehicleCallback>>,
    current_vehicle: RwLock<Option<String>>,
    flight: Mutex<FlightModel>,
    unknown_vars: Mutex<HashSet<VariableKey>>,
    stop: Mutex<CancellationToken>,
}

impl EmulatorSource {
    pub const NAME: &'static str = "emulator";

    pub fn new(options: EmulatorOptions) -> Result<Self> {
        options.validate()?;

        Ok(Self {
            options,
            connected: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            vars: VarTable::new(),
            vehicle_callback: RwLock::new(None),
            current_vehicle: RwLock::new(None),
            flight: Mutex::new(FlightModel::new()),
            unknown_vars: Mutex::new(HashSet::new()),
            stop: Mutex::new(CancellationToken::new()),
        })
    }

    /// Build from the opaque `sourceOptions` value; `None` uses defaults
    pub fn from_options(options: Option<&Value>) -> Result<Self> {
        let options = match options {
            Some(value) => EmulatorOptions::deserialize(value).map_err(|e| invalid(e.to_string()))?,
            None => EmulatorOptions::default(),
        };
        Self::new(options)
    }

    /// Number of distinct variables registered upstream
    pub fn subscribed_count(&self) -> usize {
        self.vars.len()
    }

    fn step_physics(&self) {
        self.flight.lock().step();
    }

    fn set_vehicle(&self, name: String) {
        *self.current_vehicle.write() = Some(name.clone());
        tracing::info!("Emulator switched to vehicle '{}'", name);

        let callback = self.vehicle_callback.read().clone();
        if let Some(callback) = callback {
            callback(Some(name));
        }
    }

    fn deliver_all(&self) {
        let entries = self.vars.snapshot();
        let values: Vec<Option<f64>> = {
            let flight = self.flight.lock();
            entries.iter().map(|(key, _)| flight.read(key)).collect()
        };

        for ((key, callbacks), value) in entries.into_iter().zip(values) {
            match value {
                Some(value) => {
                    for callback in &callbacks {
                        callback(Value::from(value));
                    }
                }
                None => {
                    if self.unknown_vars.lock().insert(key.clone()) {
                        tracing::warn!("Emulator does not simulate variable {}", key);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl DataSource for EmulatorSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.stop.lock() = CancellationToken::new();
        tracing::info!("Emulator connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop.lock().cancel();
        tracing::info!("Emulator disconnected");
        Ok(())
    }

    fn subscribe_var(&self, key: &VariableKey, on_value: ValueCallback) -> Result<()> {
        if self.vars.insert(key, on_value) {
            tracing::debug!("Emulator subscribed to {}", key);
        }
        Ok(())
    }

    fn unsubscribe_var(&self, key: &VariableKey) -> Result<()> {
        if self.vars.remove(key) {
            self.unknown_vars.lock().remove(key);
            tracing::debug!("Emulator unsubscribed from {}", key);
        }
        Ok(())
    }

    fn subscribe_vehicle(&self, on_change: VehicleCallback) {
        *self.vehicle_callback.write() = Some(on_change);
        tracing::debug!("Emulator subscribed to vehicle changes");
    }

    fn current_vehicle(&self) -> Option<String> {
        self.current_vehicle.read().clone()
    }

    async fn listen(&self, poll_rate: Duration, shutdown: CancellationToken) -> Result<()> {
        if !self.is_connected() {
            return Err(SourceError::NotConnected(Self::NAME.to_string()));
        }
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(SourceError::AlreadyListening(Self::NAME.to_string()));
        }

        let stop = self.stop.lock().clone();
        let poll_rate = clamp_poll_rate(poll_rate);
        tracing::info!("Emulator sending data every {:?}", poll_rate);

        let mut physics = interval(PHYSICS_TICK);
        let mut delivery = interval(poll_rate);
        let mut vehicles = interval(self.options.vehicle_interval());
        for timer in [&mut physics, &mut delivery, &mut vehicles] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        let mut cycle = VehicleCycle::new(self.options.vehicles.clone());

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = stop.cancelled() => break,
                _ = physics.tick() => self.step_physics(),
                _ = vehicles.tick() => {
                    let current = self.current_vehicle();
                    if let Some(next) = cycle.next(current.as_deref()) {
                        self.set_vehicle(next);
                    }
                }
                _ = delivery.tick() => self.deliver_all(),
            }
        }

        self.listening.store(false, Ordering::SeqCst);
        tracing::info!("Emulator stopped listening");
        Ok(())
    }
}
