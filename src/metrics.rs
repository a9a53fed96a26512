//! Entry point: a shared store handle plus counter defaults.
//!
//! [`Metrics`] owns nothing mutable; it carries the store handle, the key
//! prefix, and the default counter options, and stamps out [`Counter`]
//! descriptors on demand.

use serde::Deserialize;
use std::sync::Arc;

use crate::counter::{Counter, CounterOptions};
use crate::error::{Result, TallyError};
use crate::store::CounterStore;

/// Prefix every counter key starts with unless configured otherwise.
pub const DEFAULT_KEY_PREFIX: &str = "c";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Key namespace; counter `foo` lives under `<key_prefix>:foo`.
    pub key_prefix: String,
    /// Options used by [`Metrics::counter`].
    pub counter_defaults: CounterOptions,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            counter_defaults: CounterOptions::default(),
        }
    }
}

/// Factory for counters sharing one store and one namespace.
#[derive(Clone)]
pub struct Metrics {
    store: Arc<dyn CounterStore>,
    config: MetricsConfig,
}

impl Metrics {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Metrics::with_config(store, MetricsConfig::default())
    }

    pub fn with_config(store: Arc<dyn CounterStore>, config: MetricsConfig) -> Self {
        Metrics { store, config }
    }

    /// Build from a TOML fragment, e.g.
    ///
    /// ```toml
    /// key_prefix = "stats"
    ///
    /// [counter_defaults]
    /// time_granularity = "hour"
    ///
    /// [counter_defaults.expiration]
    /// total = 86400
    /// ```
    pub fn from_toml(store: Arc<dyn CounterStore>, source: &str) -> Result<Self> {
        let config: MetricsConfig = toml::from_str(source)
            .map_err(|e| TallyError::InvalidArgument(format!("bad config: {}", e)))?;
        Ok(Metrics::with_config(store, config))
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn CounterStore> {
        self.store.clone()
    }

    /// A counter with the configured defaults.
    pub fn counter(&self, name: &str) -> Counter {
        self.counter_with(name, self.config.counter_defaults.clone())
    }

    /// A counter with explicit options.
    pub fn counter_with(&self, name: &str, options: CounterOptions) -> Counter {
        Counter::new(
            self.store.clone(),
            &self.config.key_prefix,
            name,
            options,
        )
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
