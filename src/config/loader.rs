//! Load config from a JSON string or file.

use crate::config::TenantedConfig;
use crate::error::ConfigError;
use std::path::Path;

pub fn from_json_str(json: &str) -> Result<TenantedConfig, ConfigError> {
    let config: TenantedConfig =
        serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    validate(&config)?;
    Ok(config)
}

pub fn from_json_file(path: impl AsRef<Path>) -> Result<TenantedConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(e.to_string()))?;
    from_json_str(&raw)
}

/// Referential checks only; per-driver requirements are checked at
/// construction time so custom drivers stay unconstrained here.
pub fn validate(config: &TenantedConfig) -> Result<(), ConfigError> {
    for (name, tenancy) in &config.tenancies {
        if let Some(provider) = tenancy.provider.as_deref() {
            if !config.providers.contains_key(provider) {
                return Err(ConfigError::Validation(format!(
                    "tenancy '{}' references unknown provider '{}'",
                    name, provider
                )));
            }
        }
        if let Some(resolver) = tenancy.resolver.as_deref() {
            if !config.resolvers.contains_key(resolver) {
                return Err(ConfigError::Validation(format!(
                    "tenancy '{}' references unknown resolver '{}'",
                    name, resolver
                )));
            }
        }
    }
    Ok(())
}
