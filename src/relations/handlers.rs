//! The six relation-kind strategies behind a closed dispatch table.

use crate::entity::same_tenant;
use crate::error::RelationError;
use crate::provider::canonical_key;
use crate::relations::{TenantOwned, TenantRelationHandler, TenantRelationKind};
use crate::sql::SelectQuery;
use crate::tenancy::Tenancy;
use serde_json::Value;

/// Closed dispatch table from relation kind to handler.
pub fn handler_for(kind: TenantRelationKind) -> &'static dyn TenantRelationHandler {
    match kind {
        TenantRelationKind::BelongsTo => &BelongsToHandler,
        TenantRelationKind::BelongsToMany => &BelongsToManyHandler,
        TenantRelationKind::HasOne => &HasOneHandler,
        TenantRelationKind::HasMany => &HasManyHandler,
        TenantRelationKind::HasManyThrough => &HasManyThroughHandler,
        TenantRelationKind::None => &NoRelationHandler,
    }
}

fn orphaned(model: &dyn TenantOwned, tenancy: &Tenancy) -> RelationError {
    RelationError::Orphaned {
        column: model.tenant_relation().foreign_key.clone(),
        tenancy: tenancy.name().to_string(),
    }
}

fn mismatch(model: &dyn TenantOwned, tenancy: &Tenancy) -> RelationError {
    RelationError::Mismatch {
        column: model.tenant_relation().foreign_key.clone(),
        tenancy: tenancy.name().to_string(),
    }
}

fn key_matches(candidate: &Value, tenant_key: &Value) -> bool {
    canonical_key(candidate) == canonical_key(tenant_key)
}

/// Foreign key on the model itself.
pub struct BelongsToHandler;

impl TenantRelationHandler for BelongsToHandler {
    fn kind(&self) -> TenantRelationKind {
        TenantRelationKind::BelongsTo
    }

    fn populate_for_creation(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };
        match model.tenant_key() {
            None | Some(Value::Null) => {
                model.set_tenant_key(tenant.key());
                model.set_loaded_tenants(vec![tenant]);
                Ok(())
            }
            Some(key) if key_matches(&key, &tenant.key()) => Ok(()),
            Some(_) => Err(mismatch(model, tenancy)),
        }
    }

    fn populate_after_loading(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };

        // An already-loaded relation is the source of truth; no extra query.
        if let Some(loaded) = model.loaded_tenants() {
            return match loaded.first() {
                Some(existing) if same_tenant(existing.as_ref(), tenant.as_ref()) => Ok(()),
                Some(_) => Err(mismatch(model, tenancy)),
                None => Err(orphaned(model, tenancy)),
            };
        }

        match model.tenant_key() {
            None | Some(Value::Null) => Err(orphaned(model, tenancy)),
            Some(key) if key_matches(&key, &tenant.key()) => {
                model.set_loaded_tenants(vec![tenant]);
                Ok(())
            }
            Some(_) => Err(mismatch(model, tenancy)),
        }
    }

    fn scope_for_query(&self, model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery) {
        if let Some(tenant) = tenancy.tenant() {
            query.and_where_eq(&model.tenant_relation().foreign_key, tenant.key());
        }
    }
}

/// Pivot table between the model and tenants.
pub struct BelongsToManyHandler;

impl TenantRelationHandler for BelongsToManyHandler {
    fn kind(&self) -> TenantRelationKind {
        TenantRelationKind::BelongsToMany
    }

    fn populate_for_creation(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };
        // Only the already-loaded collection is consulted before attaching.
        let already_attached = model.loaded_tenants().is_some_and(|loaded| {
            loaded
                .iter()
                .any(|existing| same_tenant(existing.as_ref(), tenant.as_ref()))
        });
        if !already_attached {
            model.attach_loaded_tenant(tenant);
        }
        Ok(())
    }

    fn populate_after_loading(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };
        match model.loaded_tenants() {
            Some(loaded) => {
                let present = loaded
                    .iter()
                    .any(|existing| same_tenant(existing.as_ref(), tenant.as_ref()));
                if present {
                    Ok(())
                } else {
                    Err(mismatch(model, tenancy))
                }
            }
            None => {
                model.set_loaded_tenants(vec![tenant]);
                Ok(())
            }
        }
    }

    fn scope_for_query(&self, model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery) {
        let (Some(tenant), Some(pivot)) = (tenancy.tenant(), &model.tenant_relation().pivot)
        else {
            return;
        };
        query.and_where_exists(
            &pivot.table,
            &pivot.local_key,
            model.key_column(),
            &pivot.tenant_key,
            tenant.key(),
        );
    }
}

/// Foreign key on the related table, one row per model.
pub struct HasOneHandler;

impl TenantRelationHandler for HasOneHandler {
    fn kind(&self) -> TenantRelationKind {
        TenantRelationKind::HasOne
    }

    fn populate_for_creation(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        if let Some(tenant) = tenancy.tenant() {
            model.set_loaded_tenants(vec![tenant]);
        }
        Ok(())
    }

    fn populate_after_loading(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };
        match model.loaded_tenants().and_then(|loaded| loaded.first()) {
            Some(existing) if same_tenant(existing.as_ref(), tenant.as_ref()) => Ok(()),
            Some(_) => Err(mismatch(model, tenancy)),
            None => {
                model.set_loaded_tenants(vec![tenant]);
                Ok(())
            }
        }
    }

    fn scope_for_query(&self, model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery) {
        scope_through_related(model, tenancy, query);
    }
}

/// Foreign key on the related table, many rows per model.
pub struct HasManyHandler;

impl TenantRelationHandler for HasManyHandler {
    fn kind(&self) -> TenantRelationKind {
        TenantRelationKind::HasMany
    }

    fn populate_for_creation(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };
        let already_attached = model.loaded_tenants().is_some_and(|loaded| {
            loaded
                .iter()
                .any(|existing| same_tenant(existing.as_ref(), tenant.as_ref()))
        });
        if !already_attached {
            model.attach_loaded_tenant(tenant);
        }
        Ok(())
    }

    fn populate_after_loading(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        let Some(tenant) = tenancy.tenant() else {
            return Ok(());
        };
        match model.loaded_tenants() {
            Some(loaded) => {
                let present = loaded
                    .iter()
                    .any(|existing| same_tenant(existing.as_ref(), tenant.as_ref()));
                if present {
                    Ok(())
                } else {
                    Err(mismatch(model, tenancy))
                }
            }
            None => {
                model.set_loaded_tenants(vec![tenant]);
                Ok(())
            }
        }
    }

    fn scope_for_query(&self, model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery) {
        scope_through_related(model, tenancy, query);
    }
}

/// Tenant reached through an intermediate model, which owns its own tenant
/// correctness. The least validation of any handler, deliberately.
pub struct HasManyThroughHandler;

impl TenantRelationHandler for HasManyThroughHandler {
    fn kind(&self) -> TenantRelationKind {
        TenantRelationKind::HasManyThrough
    }

    fn populate_for_creation(
        &self,
        _model: &mut dyn TenantOwned,
        _tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        Ok(())
    }

    fn populate_after_loading(
        &self,
        _model: &mut dyn TenantOwned,
        _tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        Ok(())
    }

    fn scope_for_query(
        &self,
        _model: &dyn TenantOwned,
        _tenancy: &Tenancy,
        _query: &mut SelectQuery,
    ) {
    }
}

/// No relation declared: a plain attribute carries the tenant key.
pub struct NoRelationHandler;

impl TenantRelationHandler for NoRelationHandler {
    fn kind(&self) -> TenantRelationKind {
        TenantRelationKind::None
    }

    fn populate_for_creation(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        if let Some(tenant) = tenancy.tenant() {
            model.set_tenant_key(tenant.key());
        }
        Ok(())
    }

    fn populate_after_loading(
        &self,
        _model: &mut dyn TenantOwned,
        _tenancy: &Tenancy,
    ) -> Result<(), RelationError> {
        Ok(())
    }

    fn scope_for_query(&self, model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery) {
        if let Some(tenant) = tenancy.tenant() {
            query.and_where_eq(&model.tenant_relation().foreign_key, tenant.key());
        }
    }
}

fn scope_through_related(model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery) {
    let relation = model.tenant_relation();
    let (Some(tenant), Some(related_table)) = (tenancy.tenant(), &relation.related_table) else {
        return;
    };
    query.and_where_exists(
        related_table,
        &relation.foreign_key,
        model.key_column(),
        tenant.key_name(),
        tenant.key(),
    );
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::entity::TenantRef;
    use crate::relations::TenantRelation;

    /// Bare-bones tenant-owned model for handler tests.
    pub struct TestModel {
        relation: TenantRelation,
        tenant_key: Option<Value>,
        loaded: Option<Vec<TenantRef>>,
    }

    impl TestModel {
        pub fn new(relation: TenantRelation) -> Self {
            TestModel {
                relation,
                tenant_key: None,
                loaded: None,
            }
        }

        pub fn with_tenant_key(mut self, key: Value) -> Self {
            self.tenant_key = Some(key);
            self
        }

        pub fn with_loaded(mut self, loaded: Vec<TenantRef>) -> Self {
            self.loaded = Some(loaded);
            self
        }
    }

    impl TenantOwned for TestModel {
        fn tenant_relation(&self) -> &TenantRelation {
            &self.relation
        }

        fn table(&self) -> &str {
            "projects"
        }

        fn key_column(&self) -> &str {
            "id"
        }

        fn tenant_key(&self) -> Option<Value> {
            self.tenant_key.clone()
        }

        fn set_tenant_key(&mut self, key: Value) {
            self.tenant_key = Some(key);
        }

        fn loaded_tenants(&self) -> Option<&[TenantRef]> {
            self.loaded.as_deref()
        }

        fn set_loaded_tenants(&mut self, tenants: Vec<TenantRef>) {
            self.loaded = Some(tenants);
        }

        fn attach_loaded_tenant(&mut self, tenant: TenantRef) {
            self.loaded.get_or_insert_with(Vec::new).push(tenant);
        }
    }
}
