//! Tenant providers: lookup strategies against a backing store.

pub mod array;
pub mod database;
pub mod model;

pub use array::ArrayTenantProvider;
pub use database::DatabaseTenantProvider;
pub use model::{ModelTenantProvider, TenantModel};

use crate::entity::TenantRef;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::Value;

/// Lookup strategy for tenants. Lookups are side-effect-free; a miss is
/// `Ok(None)`, never an error.
#[async_trait]
pub trait TenantProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Look up by the provider's configured identifier field.
    async fn retrieve_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<TenantRef>, ProviderError>;

    /// Look up by the provider's configured key field.
    async fn retrieve_by_key(&self, key: &Value) -> Result<Option<TenantRef>, ProviderError>;

    /// Generic lookup by arbitrary field; the two above are convenience
    /// wrappers over this with fixed field names.
    async fn retrieve_by(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Option<TenantRef>, ProviderError>;
}

/// Canonical string form of a key value, so a key arriving as a route or
/// header string still matches a numeric source key.
pub(crate) fn canonical_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
