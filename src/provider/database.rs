//! Table-backed tenant provider: single-row equality queries over sqlx.

use crate::entity::{TenantEntity, TenantRef};
use crate::error::ProviderError;
use crate::provider::{canonical_key, TenantProvider};
use crate::sql::quoted;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

/// Delegates each lookup to a single-row equality query against a configured
/// table. `retrieve_by` is the query primitive; the other lookups wrap it.
pub struct DatabaseTenantProvider {
    name: String,
    pool: PgPool,
    table: String,
    identifier: String,
    key: String,
}

impl DatabaseTenantProvider {
    pub fn new(
        name: impl Into<String>,
        pool: PgPool,
        table: impl Into<String>,
        identifier: Option<String>,
        key: Option<String>,
    ) -> Self {
        DatabaseTenantProvider {
            name: name.into(),
            pool,
            table: table.into(),
            identifier: identifier.unwrap_or_else(|| "identifier".into()),
            key: key.unwrap_or_else(|| "id".into()),
        }
    }
}

#[async_trait]
impl TenantProvider for DatabaseTenantProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<TenantRef>, ProviderError> {
        self.retrieve_by(&self.identifier.clone(), &Value::String(identifier.into()))
            .await
    }

    async fn retrieve_by_key(&self, key: &Value) -> Result<Option<TenantRef>, ProviderError> {
        self.retrieve_by(&self.key.clone(), key).await
    }

    async fn retrieve_by(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Option<TenantRef>, ProviderError> {
        // Compare on text so a key that arrived as a path or header string
        // still matches integer and uuid columns.
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} AS t WHERE t.{}::text = $1 LIMIT 1",
            quoted(&self.table),
            quoted(field),
        );
        tracing::debug!(sql = %sql, provider = %self.name, "tenant lookup");

        let row = sqlx::query_scalar::<_, Value>(&sql)
            .bind(canonical_key(value))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(Value::Object(attributes)) => {
                let entity =
                    TenantEntity::new(self.identifier.clone(), self.key.clone(), attributes)?;
                Ok(Some(Arc::new(entity) as TenantRef))
            }
            _ => Ok(None),
        }
    }
}
