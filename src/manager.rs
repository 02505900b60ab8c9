//! The manager: builds and caches providers, resolvers and tenancies from
//! config, with creator overrides for custom drivers.

use crate::config::{DriverConfig, SourceConfig, TenantedConfig};
use crate::error::{ProviderError, ResolverError, TenancyError, TenantedError};
use crate::events::{EventListeners, ListenerId, TenancyEvent};
use crate::provider::{
    ArrayTenantProvider, DatabaseTenantProvider, ModelTenantProvider, TenantModel, TenantProvider,
};
use crate::resolver::{
    CookieTenantResolver, HeaderTenantResolver, PathTenantResolver, SessionTenantResolver,
    SubdomainTenantResolver, TenantResolver,
};
use crate::tenancy::Tenancy;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Builds a provider from its name and config. Registered under a provider
/// name or a driver name; the config is absent when the name has no entry.
pub type ProviderCreator = Arc<
    dyn Fn(
            &TenantedManager,
            &str,
            Option<&DriverConfig>,
        ) -> Result<Arc<dyn TenantProvider>, TenantedError>
        + Send
        + Sync,
>;

pub type ResolverCreator = Arc<
    dyn Fn(
            &TenantedManager,
            &str,
            Option<&DriverConfig>,
        ) -> Result<Arc<dyn TenantResolver>, TenantedError>
        + Send
        + Sync,
>;

/// Materialises array-provider records for a custom source type.
pub type SourceResolver =
    Arc<dyn Fn(&SourceConfig) -> Result<Vec<Map<String, Value>>, ProviderError> + Send + Sync>;

/// Central registry. Providers, resolvers and tenancies are built lazily on
/// first request and cached by name; registered creators take precedence
/// over the built-in drivers.
pub struct TenantedManager {
    config: TenantedConfig,
    pool: Option<PgPool>,
    providers: RwLock<HashMap<String, Arc<dyn TenantProvider>>>,
    resolvers: RwLock<HashMap<String, Arc<dyn TenantResolver>>>,
    tenancies: RwLock<HashMap<String, Arc<Tenancy>>>,
    provider_creators: RwLock<HashMap<String, ProviderCreator>>,
    resolver_creators: RwLock<HashMap<String, ResolverCreator>>,
    source_resolvers: RwLock<HashMap<String, SourceResolver>>,
    stack: RwLock<Vec<Arc<Tenancy>>>,
    listeners: EventListeners,
}

impl TenantedManager {
    pub fn new(config: TenantedConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_pool(config: TenantedConfig, pool: PgPool) -> Self {
        Self::build(config, Some(pool))
    }

    fn build(config: TenantedConfig, pool: Option<PgPool>) -> Self {
        TenantedManager {
            config,
            pool,
            providers: RwLock::new(HashMap::new()),
            resolvers: RwLock::new(HashMap::new()),
            tenancies: RwLock::new(HashMap::new()),
            provider_creators: RwLock::new(HashMap::new()),
            resolver_creators: RwLock::new(HashMap::new()),
            source_resolvers: RwLock::new(HashMap::new()),
            stack: RwLock::new(Vec::new()),
            listeners: EventListeners::new(),
        }
    }

    pub fn config(&self) -> &TenantedConfig {
        &self.config
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    pub fn listeners(&self) -> &EventListeners {
        &self.listeners
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TenancyEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Register a creator for a provider name or driver name. Name entries
    /// win over config; driver entries win over the built-in drivers.
    pub fn register_provider<F>(&self, key: impl Into<String>, creator: F)
    where
        F: Fn(
                &TenantedManager,
                &str,
                Option<&DriverConfig>,
            ) -> Result<Arc<dyn TenantProvider>, TenantedError>
            + Send
            + Sync
            + 'static,
    {
        self.provider_creators
            .write()
            .unwrap()
            .insert(key.into(), Arc::new(creator));
    }

    pub fn register_resolver<F>(&self, key: impl Into<String>, creator: F)
    where
        F: Fn(
                &TenantedManager,
                &str,
                Option<&DriverConfig>,
            ) -> Result<Arc<dyn TenantResolver>, TenantedError>
            + Send
            + Sync
            + 'static,
    {
        self.resolver_creators
            .write()
            .unwrap()
            .insert(key.into(), Arc::new(creator));
    }

    /// Register a records loader for a custom array source type.
    pub fn register_source<F>(&self, type_: impl Into<String>, resolver: F)
    where
        F: Fn(&SourceConfig) -> Result<Vec<Map<String, Value>>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.source_resolvers
            .write()
            .unwrap()
            .insert(type_.into(), Arc::new(resolver));
    }

    /// Back the named provider with a statically-declared tenant model.
    pub fn register_model<M: TenantModel>(&self, name: impl Into<String>) {
        self.register_provider(name, |manager: &TenantedManager, name: &str, _config: Option<&DriverConfig>| {
            let pool = manager.pool().cloned().ok_or_else(|| {
                ProviderError::MissingValue {
                    value: "database pool".into(),
                    name: name.to_string(),
                }
            })?;
            Ok(Arc::new(ModelTenantProvider::<M>::new(name, pool)) as Arc<dyn TenantProvider>)
        });
    }

    /// Insert a ready-made tenancy into the cache under its own name.
    pub fn register_tenancy(&self, tenancy: Arc<Tenancy>) {
        self.tenancies
            .write()
            .unwrap()
            .insert(tenancy.name().to_string(), tenancy);
    }

    pub fn provider(&self, name: Option<&str>) -> Result<Arc<dyn TenantProvider>, TenantedError> {
        let name = name.unwrap_or(&self.config.defaults.provider);
        if let Some(provider) = self.providers.read().unwrap().get(name) {
            return Ok(provider.clone());
        }

        let provider = self.create_provider(name)?;
        let mut cache = self.providers.write().unwrap();
        Ok(cache
            .entry(name.to_string())
            .or_insert(provider)
            .clone())
    }

    pub fn resolver(&self, name: Option<&str>) -> Result<Arc<dyn TenantResolver>, TenantedError> {
        let name = name.unwrap_or(&self.config.defaults.resolver);
        if let Some(resolver) = self.resolvers.read().unwrap().get(name) {
            return Ok(resolver.clone());
        }

        let resolver = self.create_resolver(name)?;
        let mut cache = self.resolvers.write().unwrap();
        Ok(cache
            .entry(name.to_string())
            .or_insert(resolver)
            .clone())
    }

    pub fn tenancy(&self, name: Option<&str>) -> Result<Arc<Tenancy>, TenantedError> {
        let name = name.unwrap_or(&self.config.defaults.tenancy);
        if let Some(tenancy) = self.tenancies.read().unwrap().get(name) {
            return Ok(tenancy.clone());
        }

        let config = self
            .config
            .tenancy_config(name)
            .ok_or_else(|| TenancyError::MissingConfig(name.to_string()))?
            .clone();

        let provider = self.provider(config.provider.as_deref())?;
        let tenancy = Arc::new(Tenancy::new(
            name,
            provider,
            config.clone(),
            self.listeners.clone(),
        ));
        if let Some(resolver) = config.resolver.as_deref() {
            tenancy.use_resolver(self.resolver(Some(resolver))?);
        }

        tracing::debug!(tenancy = name, "tenancy created");
        let mut cache = self.tenancies.write().unwrap();
        Ok(cache.entry(name.to_string()).or_insert(tenancy).clone())
    }

    /// Push a tenancy onto the request's stack, making it current. Callers
    /// must pop it again once the request finishes.
    pub fn stack_tenancy(&self, tenancy: Arc<Tenancy>) {
        self.stack.write().unwrap().push(tenancy);
    }

    /// Pop the most recently stacked tenancy.
    pub fn pop_tenancy(&self) -> Option<Arc<Tenancy>> {
        self.stack.write().unwrap().pop()
    }

    /// Tenancies stacked so far, outermost first.
    pub fn tenancy_stack(&self) -> Vec<Arc<Tenancy>> {
        self.stack.read().unwrap().clone()
    }

    /// The most recently stacked tenancy.
    pub fn current(&self) -> Option<Arc<Tenancy>> {
        self.stack.read().unwrap().last().cloned()
    }

    fn create_provider(&self, name: &str) -> Result<Arc<dyn TenantProvider>, TenantedError> {
        let config = self.config.provider_config(name).cloned();

        if let Some(creator) = self.provider_creators.read().unwrap().get(name).cloned() {
            return creator(self, name, config.as_ref());
        }

        let config = config.ok_or_else(|| ProviderError::MissingConfig(name.to_string()))?;
        let driver = config
            .driver
            .as_deref()
            .ok_or_else(|| ProviderError::MissingDriver(name.to_string()))?;

        if let Some(creator) = self.provider_creators.read().unwrap().get(driver).cloned() {
            return creator(self, name, Some(&config));
        }

        match driver {
            "array" => self.create_array_provider(name, &config),
            "database" => self.create_database_provider(name, &config),
            other => Err(ProviderError::Unknown(format!("{} ({})", name, other)).into()),
        }
    }

    fn create_array_provider(
        &self,
        name: &str,
        config: &DriverConfig,
    ) -> Result<Arc<dyn TenantProvider>, TenantedError> {
        let source = config
            .option("source")
            .cloned()
            .ok_or_else(|| ProviderError::MissingValue {
                value: "source".into(),
                name: name.to_string(),
            })?;
        let source: SourceConfig = serde_json::from_value(source)
            .map_err(|e| ProviderError::Source(e.to_string()))?;
        let records = self.resolve_source(name, &source)?;

        let provider = ArrayTenantProvider::new(
            name,
            records,
            config.str_option("identifier").map(str::to_string),
            config.str_option("key").map(str::to_string),
        )?;
        Ok(Arc::new(provider))
    }

    fn create_database_provider(
        &self,
        name: &str,
        config: &DriverConfig,
    ) -> Result<Arc<dyn TenantProvider>, TenantedError> {
        let pool = self.pool().cloned().ok_or_else(|| ProviderError::MissingValue {
            value: "database pool".into(),
            name: name.to_string(),
        })?;
        let table = config
            .str_option("table")
            .ok_or_else(|| ProviderError::MissingValue {
                value: "table".into(),
                name: name.to_string(),
            })?;

        Ok(Arc::new(DatabaseTenantProvider::new(
            name,
            pool,
            table,
            config.str_option("identifier").map(str::to_string),
            config.str_option("key").map(str::to_string),
        )))
    }

    /// Materialise array-provider records from a source declaration.
    fn resolve_source(
        &self,
        provider: &str,
        source: &SourceConfig,
    ) -> Result<Vec<Map<String, Value>>, ProviderError> {
        if let Some(custom) = self.source_resolvers.read().unwrap().get(&source.type_).cloned() {
            return custom(source);
        }

        match source.type_.as_str() {
            "inline" => {
                let data = source.data.clone().ok_or_else(|| ProviderError::MissingValue {
                    value: "source.data".into(),
                    name: provider.to_string(),
                })?;
                records_from_value(data)
            }
            "json" => {
                let raw = match (&source.path, &source.data) {
                    (Some(path), _) => std::fs::read_to_string(path)
                        .map_err(|e| ProviderError::Source(format!("{}: {}", path, e)))?,
                    (None, Some(Value::String(literal))) => literal.clone(),
                    (None, Some(data)) => return records_from_value(data.clone()),
                    (None, None) => {
                        return Err(ProviderError::MissingValue {
                            value: "source.path".into(),
                            name: provider.to_string(),
                        })
                    }
                };
                let parsed: Value = serde_json::from_str(&raw)
                    .map_err(|e| ProviderError::Source(e.to_string()))?;
                records_from_value(parsed)
            }
            other => Err(ProviderError::UnknownSourceType(other.to_string())),
        }
    }

    fn create_resolver(&self, name: &str) -> Result<Arc<dyn TenantResolver>, TenantedError> {
        let config = self.config.resolver_config(name).cloned();

        if let Some(creator) = self.resolver_creators.read().unwrap().get(name).cloned() {
            return creator(self, name, config.as_ref());
        }

        let config = config.ok_or_else(|| ResolverError::MissingConfig(name.to_string()))?;
        let driver = config
            .driver
            .as_deref()
            .ok_or_else(|| ResolverError::MissingDriver(name.to_string()))?;

        if let Some(creator) = self.resolver_creators.read().unwrap().get(driver).cloned() {
            return creator(self, name, Some(&config));
        }

        let resolver: Arc<dyn TenantResolver> = match driver {
            "subdomain" => {
                let domain =
                    config
                        .str_option("domain")
                        .ok_or_else(|| ResolverError::MissingValue {
                            value: "domain".into(),
                            name: name.to_string(),
                        })?;
                Arc::new(SubdomainTenantResolver::new(name, domain))
            }
            "path" => Arc::new(PathTenantResolver::new(
                name,
                config.u64_option("segment").map(|s| s as usize),
            )),
            "header" => Arc::new(HeaderTenantResolver::new(
                name,
                config.str_option("header").map(str::to_string),
            )),
            "cookie" => Arc::new(CookieTenantResolver::new(
                name,
                config.str_option("cookie").map(str::to_string),
            )),
            "session" => Arc::new(SessionTenantResolver::new(
                name,
                config.str_option("session_key").map(str::to_string),
            )),
            other => {
                return Err(ResolverError::Unknown(format!("{} ({})", name, other)).into())
            }
        };
        Ok(resolver)
    }
}

fn records_from_value(data: Value) -> Result<Vec<Map<String, Value>>, ProviderError> {
    let Value::Array(items) = data else {
        return Err(ProviderError::Source(
            "source data must be an array of objects".into(),
        ));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(ProviderError::Source(format!(
                "source record must be an object, got {}",
                other
            ))),
        })
        .collect()
}
