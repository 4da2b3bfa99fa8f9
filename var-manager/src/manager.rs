//! Reference-counted subscription manager
//!
//! Every variable key has at most one upstream registration with the data
//! source. Sessions ("holders") are counted per key; the upstream registration
//! is dropped when the last holder lets go.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use data_source::{DataSource, ValueCallback, VehicleCallback};
use gauge_protocol::VariableKey;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::{Result, VarManagerError};
use crate::value::coerce_numeric;

/// Identity of whoever holds a subscription (a client session id)
pub type HolderId = u64;

/// Receives the resolved value for a key each time the data source delivers it.
pub type ResolvedCallback = Arc<dyn Fn(&VariableKey, Value) + Send + Sync>;

/// Number of diagnostic lines a watch emits before it disarms
pub const WATCH_LINE_LIMIT: usize = 10;

struct Subscription {
    holders: HashSet<HolderId>,
    on_value: ResolvedCallback,
}

struct Watch {
    name: String,
    unit: Option<String>,
    emitted: usize,
}

impl Watch {
    fn matches(&self, key: &VariableKey) -> bool {
        if !key.name_matches(&self.name) {
            return false;
        }
        match &self.unit {
            None => true,
            Some(wanted) => key.unit_matches(Some(wanted)),
        }
    }
}

#[derive(Default)]
struct VehicleContext {
    live: Option<String>,
    forced: Option<String>,
}

impl VehicleContext {
    fn current(&self) -> Option<String> {
        self.forced.clone().or_else(|| self.live.clone())
    }
}

struct Inner {
    source: Arc<dyn DataSource>,
    subscriptions: DashMap<VariableKey, Subscription>,
    values: DashMap<VariableKey, Value>,
    forced: DashMap<VariableKey, Value>,
    watch: Mutex<Option<Watch>>,
    vehicle: RwLock<VehicleContext>,
    on_vehicle: RwLock<Option<VehicleCallback>>,
}

impl Inner {
    fn resolve(&self, key: &VariableKey) -> Value {
        let value = self
            .forced
            .get(key)
            .map(|forced| forced.value().clone())
            .or_else(|| self.values.get(key).map(|cached| cached.value().clone()))
            .unwrap_or(Value::Null);

        coerce_numeric(value)
    }

    fn deliver(&self, key: &VariableKey, raw: Value) {
        let on_value = {
            let Some(subscription) = self.subscriptions.get(key) else {
                // Raced with the last holder releasing the key
                return;
            };
            // Cached under the subscription guard; a release waits for it
            self.values.insert(key.clone(), raw.clone());
            Arc::clone(&subscription.on_value)
        };

        let resolved = self.resolve(key);
        self.trace_watch(key, &raw, &resolved);

        on_value(key, resolved);
    }

    fn trace_watch(&self, key: &VariableKey, raw: &Value, resolved: &Value) {
        let mut watch = self.watch.lock();
        let Some(active) = watch.as_mut().filter(|active| active.matches(key)) else {
            return;
        };

        active.emitted += 1;
        tracing::info!(
            "Watch {} [{}/{}]: raw={} resolved={}",
            key,
            active.emitted,
            WATCH_LINE_LIMIT,
            raw,
            resolved
        );

        if active.emitted >= WATCH_LINE_LIMIT {
            *watch = None;
        }
    }

    fn vehicle_changed(&self, live: Option<String>) {
        let current = {
            let mut context = self.vehicle.write();
            context.live = live;
            context.current()
        };

        tracing::info!("Vehicle context is now {:?}", current);
        self.notify_vehicle(current);
    }

    fn notify_vehicle(&self, current: Option<String>) {
        let callback = self.on_vehicle.read().clone();
        if let Some(callback) = callback {
            callback(current);
        }
    }
}

/// Subscription manager shared by the orchestrator and the console
///
/// Cloning is cheap; clones share the same tables.
///
/// # Example
///
/// ```rust,ignore
/// let manager = SubscriptionManager::new(source);
/// let key = VariableKey::new("INDICATED ALTITUDE", Some("feet"));
///
/// // First holder registers upstream, later holders only bump the count
/// manager.subscribe_var(&key, 1, Arc::new(|key, value| println!("{key} = {value}")))?;
/// manager.subscribe_var(&key, 2, Arc::new(|_, _| {}))?;
/// assert_eq!(manager.ref_count(&key), 2);
///
/// // Session 1 goes away; the key stays subscribed for session 2
/// manager.release_all(1);
/// assert!(manager.is_subscribed(&key));
/// ```
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                subscriptions: DashMap::new(),
                values: DashMap::new(),
                forced: DashMap::new(),
                watch: Mutex::new(None),
                vehicle: RwLock::new(VehicleContext::default()),
                on_vehicle: RwLock::new(None),
            }),
        }
    }

    /// The data source this manager registers with
    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.inner.source
    }

    /// Add `holder` to the holders of `key` (ref-counted)
    ///
    /// The first holder registers with the data source and its `on_value`
    /// receives every resolved value from then on. Later holders only join the
    /// holder set; their callback is not used. Subscribing a key the holder
    /// already has is a no-op.
    ///
    /// Returns `true` when this call created the upstream registration.
    pub fn subscribe_var(
        &self,
        key: &VariableKey,
        holder: HolderId,
        on_value: ResolvedCallback,
    ) -> Result<bool> {
        match self.inner.subscriptions.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let holders = &mut entry.get_mut().holders;
                if holders.insert(holder) {
                    tracing::debug!(
                        "Holder count for {}: {} -> {}",
                        key,
                        holders.len() - 1,
                        holders.len()
                    );
                }
                Ok(false)
            }
            Entry::Vacant(entry) => {
                let upstream = upstream_callback(Arc::downgrade(&self.inner), key.clone());
                self.inner
                    .source
                    .subscribe_var(key, upstream)
                    .map_err(|source| VarManagerError::Subscribe {
                        key: key.clone(),
                        source,
                    })?;

                entry.insert(Subscription {
                    holders: HashSet::from([holder]),
                    on_value,
                });
                tracing::debug!("Subscribed to {} for holder {}", key, holder);
                Ok(true)
            }
        }
    }

    /// Remove `holder` from the holders of `key`
    ///
    /// When the last holder leaves, the upstream registration and the cached
    /// value are dropped. Forced values survive.
    ///
    /// Returns `true` when the upstream registration was dropped.
    pub fn unsubscribe_var(&self, key: &VariableKey, holder: HolderId) -> Result<bool> {
        let Entry::Occupied(mut entry) = self.inner.subscriptions.entry(key.clone()) else {
            tracing::warn!(
                "Attempted to release {} for holder {} but it is not subscribed",
                key,
                holder
            );
            return Ok(false);
        };

        if !entry.get_mut().holders.remove(&holder) {
            tracing::warn!("Holder {} does not hold {}", holder, key);
            return Ok(false);
        }

        let remaining = entry.get().holders.len();
        tracing::debug!("Holder count for {}: {} -> {}", key, remaining + 1, remaining);
        if remaining > 0 {
            return Ok(false);
        }

        self.inner.values.remove(key);
        entry.remove();
        self.inner
            .source
            .unsubscribe_var(key)
            .map_err(|source| VarManagerError::Unsubscribe {
                key: key.clone(),
                source,
            })?;

        tracing::debug!("Unsubscribed from {}", key);
        Ok(true)
    }

    /// Release every key `holder` has, returning how many upstream
    /// registrations were dropped as a result
    pub fn release_all(&self, holder: HolderId) -> usize {
        let held = self.keys_held_by(holder);
        self.release_keys(holder, held)
    }

    /// Release every key `holder` has that is not in `active`
    ///
    /// Used when a session re-initializes with a different variable list.
    pub fn unsubscribe_unused(&self, holder: HolderId, active: &[VariableKey]) -> usize {
        let stale: Vec<VariableKey> = self
            .keys_held_by(holder)
            .into_iter()
            .filter(|key| !active.contains(key))
            .collect();

        self.release_keys(holder, stale)
    }

    fn release_keys(&self, holder: HolderId, keys: Vec<VariableKey>) -> usize {
        let mut dropped = 0;
        for key in keys {
            match self.unsubscribe_var(&key, holder) {
                Ok(true) => dropped += 1,
                Ok(false) => {}
                Err(error) => tracing::warn!("{}", error),
            }
        }
        dropped
    }

    /// Keys `holder` currently holds
    pub fn keys_held_by(&self, holder: HolderId) -> Vec<VariableKey> {
        self.inner
            .subscriptions
            .iter()
            .filter(|entry| entry.holders.contains(&holder))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Resolve the value a consumer should see for `key` right now
    ///
    /// Forced value if one is set, otherwise the last delivered value, otherwise
    /// `null`. Numeric strings come back as numbers.
    pub fn resolve(&self, key: &VariableKey) -> Value {
        self.inner.resolve(key)
    }

    /// Override what consumers see for `key` until cleared
    ///
    /// Takes effect on the next delivery; does not need an active subscription.
    pub fn force_value(&self, key: &VariableKey, value: Value) {
        tracing::info!("Forcing {} to {}", key, value);
        self.inner.forced.insert(key.clone(), value);
    }

    /// Drop the override for `key`, returning whether one was set
    pub fn clear_forced_value(&self, key: &VariableKey) -> bool {
        let cleared = self.inner.forced.remove(key).is_some();
        if cleared {
            tracing::info!("Cleared forced value for {}", key);
        }
        cleared
    }

    pub fn forced_value(&self, key: &VariableKey) -> Option<Value> {
        self.inner.forced.get(key).map(|forced| forced.value().clone())
    }

    /// Log the next [`WATCH_LINE_LIMIT`] deliveries for variables named `name`
    ///
    /// With a unit only that unit's deliveries are traced. Replaces any
    /// previous watch.
    pub fn watch(&self, name: &str, unit: Option<&str>) {
        tracing::info!("Watching {} ({})", name, unit.unwrap_or("any unit"));
        *self.inner.watch.lock() = Some(Watch {
            name: name.to_string(),
            unit: unit.map(str::to_string),
            emitted: 0,
        });
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watch.lock().is_some()
    }

    /// Track the upstream vehicle context and report changes to `on_change`
    ///
    /// The context is seeded from the data source straight away, so sources
    /// with a fixed vehicle never need to report a change. The context is
    /// updated before `on_change` runs; `on_change` receives the effective
    /// (possibly forced) context.
    pub fn subscribe_vehicle(&self, on_change: VehicleCallback) {
        let seeded = self.inner.source.current_vehicle();
        self.inner.vehicle.write().live = seeded.clone();
        *self.inner.on_vehicle.write() = Some(on_change);

        let inner = Arc::downgrade(&self.inner);
        self.inner.source.subscribe_vehicle(Arc::new(move |vehicle| {
            if let Some(inner) = inner.upgrade() {
                inner.vehicle_changed(vehicle);
            }
        }));

        tracing::debug!("Tracking vehicle context, starting at {:?}", seeded);
    }

    /// Report `vehicle` as the context until cleared, notifying subscribers
    pub fn force_vehicle(&self, vehicle: impl Into<String>) {
        let vehicle = vehicle.into();
        tracing::info!("Forcing vehicle '{}'", vehicle);

        let current = {
            let mut context = self.inner.vehicle.write();
            context.forced = Some(vehicle);
            context.current()
        };
        self.inner.notify_vehicle(current);
    }

    /// Drop a forced vehicle, returning whether one was set
    ///
    /// Subscribers are notified when the effective context changes as a result.
    pub fn clear_forced_vehicle(&self) -> bool {
        let (previous, current) = {
            let mut context = self.inner.vehicle.write();
            let Some(previous) = context.forced.take() else {
                return false;
            };
            (previous, context.current())
        };

        tracing::info!("Cleared forced vehicle '{}'", previous);
        if current.as_deref() != Some(previous.as_str()) {
            self.inner.notify_vehicle(current);
        }
        true
    }

    /// The forced vehicle if set, else the live upstream one
    pub fn current_vehicle(&self) -> Option<String> {
        self.inner.vehicle.read().current()
    }

    pub fn is_subscribed(&self, key: &VariableKey) -> bool {
        self.inner.subscriptions.contains_key(key)
    }

    /// Number of keys registered upstream
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Number of holders of `key`
    pub fn ref_count(&self, key: &VariableKey) -> usize {
        self.inner
            .subscriptions
            .get(key)
            .map_or(0, |subscription| subscription.holders.len())
    }

    /// Holder counts for every subscribed key
    pub fn subscription_stats(&self) -> HashMap<VariableKey, usize> {
        self.inner
            .subscriptions
            .iter()
            .map(|entry| (entry.key().clone(), entry.holders.len()))
            .collect()
    }
}

fn upstream_callback(inner: Weak<Inner>, key: VariableKey) -> ValueCallback {
    Arc::new(move |raw| {
        if let Some(inner) = inner.upgrade() {
            inner.deliver(&key, raw);
        }
    })
}

impl Drop for Inner {
    fn drop(&mut self) {
        tracing::debug!(
            "Subscription manager dropping, {} active subscriptions",
            self.subscriptions.len()
        );
    }
}
