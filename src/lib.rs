//! Configuration-driven multi-tenancy resolution for axum services.
//!
//! Named tenancies each pair a tenant provider (array, database table, or
//! model backed) with a tenant resolver (subdomain, path, header, cookie,
//! or session) and track the currently-identified tenant. The
//! [`TenantedManager`] builds and caches all of it lazily from config, and
//! the [`Tenanted`] middleware runs resolution around a route group.
//!
//! ```ignore
//! let config = tenantry::config::from_json_file("tenanted.json")?;
//! let manager = Arc::new(TenantedManager::new(config));
//! let tenancy = manager.tenancy(None)?;
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod manager;
pub mod middleware;
pub mod provider;
pub mod relations;
pub mod resolver;
pub mod routing;
pub mod sql;
pub mod tenancy;

pub use entity::{Tenant, TenantEntity, TenantRef};
pub use error::TenantedError;
pub use events::{EventListeners, ListenerId, TenancyChanged, TenancyEvent, TenantFound};
pub use manager::TenantedManager;
pub use middleware::{CurrentTenancy, Tenanted};
pub use provider::{
    ArrayTenantProvider, DatabaseTenantProvider, ModelTenantProvider, TenantModel, TenantProvider,
};
pub use relations::{
    handler_for, HandlerRegistry, TenantOwned, TenantRelation, TenantRelationHandler,
    TenantRelationKind,
};
pub use resolver::{
    CookieTenantResolver, HeaderTenantResolver, PathTenantResolver, SessionStore,
    SessionTenantResolver, SubdomainTenantResolver, TenantResolver,
};
pub use tenancy::Tenancy;
