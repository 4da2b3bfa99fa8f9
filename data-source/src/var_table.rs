//! Variable registration bookkeeping shared by adapters
//!
//! Adapters keep one `VarTable` each. It records which keys are registered
//! upstream and which callbacks want each key, so repeated registrations for a
//! key never repeat upstream work while still fanning every delivery out to all
//! registered callbacks.

use std::collections::HashMap;

use gauge_protocol::VariableKey;
use parking_lot::RwLock;
use serde_json::Value;

use crate::source::ValueCallback;

/// Thread-safe key → callbacks table
#[derive(Default)]
pub struct VarTable {
    entries: RwLock<HashMap<VariableKey, Vec<ValueCallback>>>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback for `key`.
    ///
    /// Returns `true` when this is the first registration for the key, i.e.
    /// when the adapter should set up its upstream side.
    pub fn insert(&self, key: &VariableKey, callback: ValueCallback) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(callbacks) => {
                callbacks.push(callback);
                false
            }
            None => {
                entries.insert(key.clone(), vec![callback]);
                true
            }
        }
    }

    /// Remove every callback for `key`. Returns `true` if the key was registered.
    pub fn remove(&self, key: &VariableKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn contains(&self, key: &VariableKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of distinct registered keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered keys
    pub fn keys(&self) -> Vec<VariableKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Copy of the table, so deliveries never run while the lock is held
    pub fn snapshot(&self) -> Vec<(VariableKey, Vec<ValueCallback>)> {
        self.entries
            .read()
            .iter()
            .map(|(key, callbacks)| (key.clone(), callbacks.clone()))
            .collect()
    }

    /// Deliver `value` to every callback registered for `key`.
    ///
    /// Returns the number of callbacks invoked.
    pub fn deliver(&self, key: &VariableKey, value: Value) -> usize {
        let callbacks = match self.entries.read().get(key) {
            Some(callbacks) => callbacks.clone(),
            None => return 0,
        };

        for callback in &callbacks {
            callback(value.clone());
        }
        callbacks.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_callback(counter: &Arc<AtomicUsize>) -> ValueCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_first_insert_reports_new_key() {
        let table = VarTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = VariableKey::new("ALT", Some("feet"));

        assert!(table.insert(&key, counting_callback(&counter)));
        assert!(!table.insert(
            &VariableKey::new("alt", Some("FEET")),
            counting_callback(&counter)
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_deliver_reaches_every_callback() {
        let table = VarTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = VariableKey::new("ALT", Some("feet"));

        table.insert(&key, counting_callback(&counter));
        table.insert(&key, counting_callback(&counter));

        assert_eq!(table.deliver(&key, json!(1000.0)), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_stops_delivery() {
        let table = VarTable::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let key = VariableKey::new("ALT", Some("feet"));

        table.insert(&key, counting_callback(&counter));
        assert!(table.remove(&key));
        assert!(!table.remove(&key));

        assert_eq!(table.deliver(&key, json!(1.0)), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_callback_may_touch_table() {
        let table = Arc::new(VarTable::new());
        let key = VariableKey::new("ALT", Some("feet"));

        let inner = Arc::clone(&table);
        let inner_key = key.clone();
        table.insert(
            &key,
            Arc::new(move |_| {
                inner.remove(&inner_key);
            }),
        );

        // Would deadlock if callbacks ran under the lock
        table.deliver(&key, json!(1.0));
        assert!(!table.contains(&key));
    }
}
