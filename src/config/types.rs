//! Raw config types for the tenanted surface: defaults, providers, resolvers
//! and tenancies, keyed by name.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

fn default_name() -> String {
    "tenants".into()
}

/// Names used when a caller omits one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_name")]
    pub provider: String,
    #[serde(default = "default_name")]
    pub resolver: String,
    #[serde(default = "default_name")]
    pub tenancy: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Defaults {
            provider: default_name(),
            resolver: default_name(),
            tenancy: default_name(),
        }
    }
}

/// Driver-based config for a provider or resolver. The driver key may be
/// absent (a construction error surfaced later, by name) and the remaining
/// keys are driver-specific.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl DriverConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        DriverConfig {
            driver: Some(driver.into()),
            options: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Optional string option; null and non-string values read as absent.
    pub fn str_option(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn u64_option(&self, key: &str) -> Option<u64> {
        self.options.get(key).and_then(Value::as_u64)
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }
}

/// Config for a named tenancy: which provider it uses, and optionally which
/// resolver. Everything else is carried through for the tenancy to consult.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TenancyConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub resolver: Option<String>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Data source for the array provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Whole configuration surface consumed by the manager.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TenantedConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub providers: HashMap<String, DriverConfig>,
    #[serde(default)]
    pub resolvers: HashMap<String, DriverConfig>,
    #[serde(default)]
    pub tenancies: HashMap<String, TenancyConfig>,
}

impl TenantedConfig {
    pub fn provider_config(&self, name: &str) -> Option<&DriverConfig> {
        self.providers.get(name)
    }

    pub fn resolver_config(&self, name: &str) -> Option<&DriverConfig> {
        self.resolvers.get(name)
    }

    pub fn tenancy_config(&self, name: &str) -> Option<&TenancyConfig> {
        self.tenancies.get(name)
    }
}
