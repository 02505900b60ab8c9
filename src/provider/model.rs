//! Model-backed tenant provider: lookups against one statically-declared
//! tenant model type.

use crate::entity::{Tenant, TenantRef};
use crate::error::ProviderError;
use crate::provider::{canonical_key, TenantProvider};
use crate::sql::quoted;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::PgPool;
use std::marker::PhantomData;
use std::sync::Arc;

/// A tenant model type: carries its own table and column metadata, and
/// hydrates from a row. The provided `find_by` covers the common case; types
/// with bespoke storage can override it.
#[async_trait]
pub trait TenantModel: Tenant + DeserializeOwned + Sized + 'static {
    fn table() -> &'static str;
    fn identifier_column() -> &'static str;
    fn key_column() -> &'static str;

    async fn find_by(
        pool: &PgPool,
        column: &str,
        value: &Value,
    ) -> Result<Option<Self>, ProviderError> {
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} AS t WHERE t.{}::text = $1 LIMIT 1",
            quoted(Self::table()),
            quoted(column),
        );
        let row = sqlx::query_scalar::<_, Value>(&sql)
            .bind(canonical_key(value))
            .fetch_optional(pool)
            .await?;

        match row {
            Some(raw) => serde_json::from_value(raw)
                .map(Some)
                .map_err(|e| ProviderError::IncompleteTenant {
                    field: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

pub struct ModelTenantProvider<M: TenantModel> {
    name: String,
    pool: PgPool,
    _model: PhantomData<fn() -> M>,
}

impl<M: TenantModel> ModelTenantProvider<M> {
    pub fn new(name: impl Into<String>, pool: PgPool) -> Self {
        ModelTenantProvider {
            name: name.into(),
            pool,
            _model: PhantomData,
        }
    }
}

#[async_trait]
impl<M: TenantModel> TenantProvider for ModelTenantProvider<M> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<TenantRef>, ProviderError> {
        self.retrieve_by(M::identifier_column(), &Value::String(identifier.into()))
            .await
    }

    async fn retrieve_by_key(&self, key: &Value) -> Result<Option<TenantRef>, ProviderError> {
        self.retrieve_by(M::key_column(), key).await
    }

    async fn retrieve_by(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Option<TenantRef>, ProviderError> {
        tracing::debug!(provider = %self.name, table = M::table(), field, "tenant lookup");
        Ok(M::find_by(&self.pool, field, value)
            .await?
            .map(|model| Arc::new(model) as TenantRef))
    }
}
