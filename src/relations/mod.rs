//! Tenant relation handling: per-model strategies for populating,
//! validating and scoping a model's association to the current tenant.

pub mod handlers;

pub use handlers::handler_for;

use crate::entity::TenantRef;
use crate::error::RelationError;
use crate::sql::SelectQuery;
use crate::tenancy::Tenancy;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::RwLock;

/// The declared kind of a model's tenant relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TenantRelationKind {
    BelongsTo,
    BelongsToMany,
    HasOne,
    HasMany,
    HasManyThrough,
    None,
}

/// Pivot table declaration for many-to-many tenant relations.
#[derive(Clone, Debug)]
pub struct PivotSpec {
    pub table: String,
    /// Pivot column referencing the model's key.
    pub local_key: String,
    /// Pivot column referencing the tenant's key.
    pub tenant_key: String,
}

/// Metadata describing where a model's tenant association lives. Declared
/// once per model type.
#[derive(Clone, Debug)]
pub struct TenantRelation {
    pub kind: TenantRelationKind,
    /// Column holding the tenant key: on the model itself (belongs-to and
    /// attribute-only), or on the related table (has-one and has-many).
    pub foreign_key: String,
    /// Table carrying the foreign key for has-one and has-many relations.
    pub related_table: Option<String>,
    pub pivot: Option<PivotSpec>,
}

impl TenantRelation {
    pub fn belongs_to(foreign_key: impl Into<String>) -> Self {
        TenantRelation {
            kind: TenantRelationKind::BelongsTo,
            foreign_key: foreign_key.into(),
            related_table: None,
            pivot: None,
        }
    }

    pub fn belongs_to_many(
        table: impl Into<String>,
        local_key: impl Into<String>,
        tenant_key: impl Into<String>,
    ) -> Self {
        let tenant_key = tenant_key.into();
        TenantRelation {
            kind: TenantRelationKind::BelongsToMany,
            foreign_key: tenant_key.clone(),
            related_table: None,
            pivot: Some(PivotSpec {
                table: table.into(),
                local_key: local_key.into(),
                tenant_key,
            }),
        }
    }

    pub fn has_one(related_table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        TenantRelation {
            kind: TenantRelationKind::HasOne,
            foreign_key: foreign_key.into(),
            related_table: Some(related_table.into()),
            pivot: None,
        }
    }

    pub fn has_many(related_table: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        TenantRelation {
            kind: TenantRelationKind::HasMany,
            foreign_key: foreign_key.into(),
            related_table: Some(related_table.into()),
            pivot: None,
        }
    }

    pub fn has_many_through(foreign_key: impl Into<String>) -> Self {
        TenantRelation {
            kind: TenantRelationKind::HasManyThrough,
            foreign_key: foreign_key.into(),
            related_table: None,
            pivot: None,
        }
    }

    pub fn none(attribute: impl Into<String>) -> Self {
        TenantRelation {
            kind: TenantRelationKind::None,
            foreign_key: attribute.into(),
            related_table: None,
            pivot: None,
        }
    }
}

/// Model boundary for tenant ownership: relation metadata plus access to the
/// raw tenant-key attribute and the in-memory relation state. Implemented by
/// the host's data layer.
pub trait TenantOwned: Send + Sync {
    fn tenant_relation(&self) -> &TenantRelation;
    fn table(&self) -> &str;
    /// The model's own primary key column.
    fn key_column(&self) -> &str;

    /// Raw tenant-key attribute: `None` when the column is unset,
    /// `Some(Null)` when present but null.
    fn tenant_key(&self) -> Option<Value>;
    fn set_tenant_key(&mut self, key: Value);

    /// The hydrated tenant relation, if loaded. Singular relations hold at
    /// most one element.
    fn loaded_tenants(&self) -> Option<&[TenantRef]>;
    fn set_loaded_tenants(&mut self, tenants: Vec<TenantRef>);
    fn attach_loaded_tenant(&mut self, tenant: TenantRef);
}

/// One strategy per relation kind. Handlers are stateless; every operation
/// is a pure function of `(model, tenancy)` plus an effect on the model or
/// the query.
pub trait TenantRelationHandler: Send + Sync {
    fn kind(&self) -> TenantRelationKind;

    /// Attach or validate the tenant association before a new record is
    /// persisted.
    fn populate_for_creation(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError>;

    /// Populate the in-memory relation after hydration, reusing the loaded
    /// value instead of issuing a validation query.
    fn populate_after_loading(
        &self,
        model: &mut dyn TenantOwned,
        tenancy: &Tenancy,
    ) -> Result<(), RelationError>;

    /// Constrain a query to the current tenant. No-op without one.
    fn scope_for_query(&self, model: &dyn TenantOwned, tenancy: &Tenancy, query: &mut SelectQuery);
}

/// Per-model-type handler cache. First population races are tolerated:
/// `handler_for` is pure, so a duplicate insert picks the same handler.
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<HashMap<TypeId, &'static dyn TenantRelationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler_for_model<M: TenantOwned + 'static>(
        &self,
        model: &M,
    ) -> &'static dyn TenantRelationHandler {
        let id = TypeId::of::<M>();
        if let Some(handler) = self.inner.read().unwrap().get(&id) {
            return *handler;
        }
        let handler = handler_for(model.tenant_relation().kind);
        *self.inner.write().unwrap().entry(id).or_insert(handler)
    }
}
