//! Process-wide id -> driver map, built once from configuration.
//!
//! Dialect selection is a closed set the host composes at startup (the
//! reference binary registers only `"harrislrc"`); `router-core` itself
//! knows nothing about any concrete dialect, so new protocol dialects plug
//! in without touching this crate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RouterError;
use crate::router::Router;
use crate::sink::CrosspointSink;

/// One `[[drivers]]` entry from the process configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub id: u32,
    pub display_name: String,
    pub short_name: String,
    /// The `type` field: a dialect tag, e.g. `"harrislrc"`.
    pub dialect: String,
    /// Opaque per-dialect options bag; validated by the dialect, not here.
    pub config: toml::Value,
    /// Consulted by the host's operator UI only; the core carries it
    /// through unread.
    pub alternate_levels: HashMap<String, Vec<u32>>,
}

pub type DialectFactory =
    Arc<dyn Fn(&DriverConfig) -> Result<Arc<dyn Router>, RouterError> + Send + Sync>;

/// A process-wide map of router id -> running driver.
pub struct Registry {
    drivers: HashMap<u32, Arc<dyn Router>>,
}

impl Registry {
    /// Build a registry from configuration, instantiating one driver per
    /// entry via the matching factory in `dialects`. An entry naming an
    /// unregistered dialect is a configuration error (§7 item 1).
    pub fn build(
        configs: &[DriverConfig],
        dialects: &HashMap<String, DialectFactory>,
        sink: Arc<dyn CrosspointSink>,
    ) -> Result<Self, RouterError> {
        let mut drivers = HashMap::with_capacity(configs.len());
        for cfg in configs {
            let factory = dialects
                .get(&cfg.dialect)
                .ok_or_else(|| RouterError::UnknownDialect(cfg.dialect.clone()))?;
            let driver = factory(cfg)?;
            driver.set_crosspoint_notify(sink.clone());
            drivers.insert(cfg.id, driver);
        }
        Ok(Self { drivers })
    }

    pub fn get(&self, id: u32) -> Option<Arc<dyn Router>> {
        self.drivers.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.drivers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn start_all(&self) -> Result<(), RouterError> {
        for driver in self.drivers.values() {
            driver.start().await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        for driver in self.drivers.values() {
            driver.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::entity::{Crosspoint, Destination, Level, Source};

    struct StubRouter {
        started: Mutex<bool>,
    }

    #[async_trait]
    impl Router for StubRouter {
        async fn start(&self) -> Result<(), RouterError> {
            *self.started.lock().await = true;
            Ok(())
        }
        async fn stop(&self) {
            *self.started.lock().await = false;
        }
        fn set_crosspoint_notify(&self, _sink: Arc<dyn CrosspointSink>) {}
        async fn get_levels(&self) -> Vec<Level> {
            Vec::new()
        }
        async fn get_sources(&self) -> Vec<Source> {
            Vec::new()
        }
        async fn get_destinations(&self) -> Vec<Destination> {
            Vec::new()
        }
        async fn get_crosspoints(&self) -> Vec<Crosspoint> {
            Vec::new()
        }
        async fn get_source(&self, _id: u32) -> Source {
            Source::default()
        }
        async fn get_destination(&self, _id: u32) -> Destination {
            Destination::default()
        }
        async fn get_level(&self, _id: u32) -> Level {
            Level::default()
        }
        async fn set_crosspoint(&self, _: u32, _: u32, _: u32, _: u32) -> Result<(), RouterError> {
            Ok(())
        }
        async fn lock_destination(&self, _: u32, _: u32) -> Result<(), RouterError> {
            Ok(())
        }
        async fn unlock_destination(&self, _: u32, _: u32) -> Result<(), RouterError> {
            Ok(())
        }
    }

    struct NullSink;
    #[async_trait]
    impl CrosspointSink for NullSink {
        async fn deliver(&self, _crosspoint: Crosspoint) {}
    }

    fn config(id: u32, dialect: &str) -> DriverConfig {
        DriverConfig {
            id,
            display_name: "Test".to_owned(),
            short_name: "t".to_owned(),
            dialect: dialect.to_owned(),
            config: toml::Value::Table(Default::default()),
            alternate_levels: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn unknown_dialect_is_a_configuration_error() {
        let dialects = HashMap::new();
        let result = Registry::build(&[config(1, "nonexistent")], &dialects, Arc::new(NullSink));
        assert!(matches!(result, Err(RouterError::UnknownDialect(_))));
    }

    #[tokio::test]
    async fn start_all_starts_every_registered_driver() {
        let mut dialects: HashMap<String, DialectFactory> = HashMap::new();
        dialects.insert(
            "stub".to_owned(),
            Arc::new(|_: &DriverConfig| {
                Ok(Arc::new(StubRouter {
                    started: Mutex::new(false),
                }) as Arc<dyn Router>)
            }),
        );
        let registry =
            Registry::build(&[config(1, "stub"), config(2, "stub")], &dialects, Arc::new(NullSink))
                .unwrap();
        registry.start_all().await.unwrap();
        assert_eq!(registry.ids(), vec![1, 2]);
    }
}
