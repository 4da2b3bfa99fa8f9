//! Static name → constructor table for data sources
//!
//! Adapters are compiled in and registered at startup; configuration selects
//! one by name (case-insensitive).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::adapters::{CpuSource, EmulatorSource};
use crate::error::{Result, SourceError};
use crate::source::DataSource;

/// Builds an adapter from the opaque `sourceOptions` configuration value.
pub type SourceConstructor = fn(Option<&Value>) -> Result<Arc<dyn DataSource>>;

/// Registry of available data sources
#[derive(Clone, Default)]
pub struct SourceRegistry {
    constructors: BTreeMap<String, SourceConstructor>,
}

impl SourceRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every adapter shipped with this crate
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(EmulatorSource::NAME, build_emulator);
        registry.register(CpuSource::NAME, build_cpu);
        registry
    }

    /// Register (or replace) a constructor under `name`
    pub fn register(&mut self, name: &str, constructor: SourceConstructor) {
        let key = name.to_lowercase();
        if self.constructors.insert(key, constructor).is_some() {
            tracing::warn!("Replaced data source constructor '{}'", name);
        }
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_lowercase())
    }

    /// Construct the adapter registered under `name`
    pub fn create(&self, name: &str, options: Option<&Value>) -> Result<Arc<dyn DataSource>> {
        let key = name.to_lowercase();
        tracing::debug!("Creating data source '{}'", name);

        let constructor = self
            .constructors
            .get(&key)
            .ok_or_else(|| SourceError::UnknownSource {
                name: name.to_string(),
                available: self.names(),
            })?;

        constructor(options)
    }
}

fn build_emulator(options: Option<&Value>) -> Result<Arc<dyn DataSource>> {
    let source: Arc<dyn DataSource> = Arc::new(EmulatorSource::from_options(options)?);
    Ok(source)
}

fn build_cpu(_options: Option<&Value>) -> Result<Arc<dyn DataSource>> {
    let source: Arc<dyn DataSource> = Arc::new(CpuSource::new());
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_names() {
        let registry = SourceRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["cpu".to_string(), "emulator".to_string()]);
        assert!(registry.contains("Emulator"));
        assert!(registry.contains("CPU"));
    }

    #[test]
    fn test_create_is_case_insensitive() {
        let registry = SourceRegistry::with_builtin();
        let source = registry.create("EMULATOR", None).unwrap();
        assert_eq!(source.name(), EmulatorSource::NAME);
    }

    #[test]
    fn test_unknown_source_lists_available() {
        let registry = SourceRegistry::with_builtin();
        match registry.create("simconnect", None) {
            Err(SourceError::UnknownSource { name, available }) => {
                assert_eq!(name, "simconnect");
                assert_eq!(available.len(), 2);
            }
            Err(other) => panic!("Expected UnknownSource, got {other:?}"),
            Ok(_) => panic!("Expected UnknownSource, got a source"),
        }
    }

    #[test]
    fn test_options_reach_constructor() {
        let registry = SourceRegistry::with_builtin();
        let bad = json!({"vehicles": "not a list"});
        assert!(matches!(
            registry.create("emulator", Some(&bad)),
            Err(SourceError::InvalidOptions { .. })
        ));
    }
}
