//! A tenancy: one provider, one resolver and the current-tenant state for a
//! named slice of the application.

use crate::config::TenancyConfig;
use crate::entity::{same_tenant, TenantRef};
use crate::error::TenantedError;
use crate::events::{EventListeners, TenancyChanged, TenancyEvent, TenantFound};
use crate::manager::TenantedManager;
use crate::provider::TenantProvider;
use crate::resolver::{ResolverRequest, TenantResolver};
use serde_json::Value;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct State {
    tenant: Option<TenantRef>,
    via: Option<String>,
    via_value: Option<Value>,
}

/// Runtime state machine for one named tenancy. Mutable state lives behind
/// locks so a cached instance can be shared; keeping instances request-scoped
/// is the hosting pipeline's job.
pub struct Tenancy {
    name: String,
    provider: Arc<dyn TenantProvider>,
    config: TenancyConfig,
    resolver: RwLock<Option<Arc<dyn TenantResolver>>>,
    state: RwLock<State>,
    listeners: EventListeners,
}

impl Tenancy {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn TenantProvider>,
        config: TenancyConfig,
        listeners: EventListeners,
    ) -> Self {
        Tenancy {
            name: name.into(),
            provider,
            config,
            resolver: RwLock::new(None),
            state: RwLock::new(State::default()),
            listeners,
        }
    }

    /// A detached copy with fresh tenant state, sharing the provider,
    /// resolver and listeners. The request pipeline forks the cached
    /// instance so resolution never mutates process-wide state.
    pub fn fork(&self) -> Tenancy {
        Tenancy {
            name: self.name.clone(),
            provider: self.provider.clone(),
            config: self.config.clone(),
            resolver: RwLock::new(self.resolver()),
            state: RwLock::new(State::default()),
            listeners: self.listeners.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider(&self) -> &Arc<dyn TenantProvider> {
        &self.provider
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    pub fn use_resolver(&self, resolver: Arc<dyn TenantResolver>) {
        *self.resolver.write().unwrap() = Some(resolver);
    }

    pub fn resolver(&self) -> Option<Arc<dyn TenantResolver>> {
        self.resolver.read().unwrap().clone()
    }

    /// True iff there is a current tenant.
    pub fn check(&self) -> bool {
        self.state.read().unwrap().tenant.is_some()
    }

    pub fn tenant(&self) -> Option<TenantRef> {
        self.state.read().unwrap().tenant.clone()
    }

    pub fn identifier(&self) -> Option<String> {
        self.tenant().map(|t| t.identifier())
    }

    pub fn key(&self) -> Option<Value> {
        self.tenant().map(|t| t.key())
    }

    /// Field name the current tenant was found by, if identification ran.
    pub fn identified_via(&self) -> Option<String> {
        self.state.read().unwrap().via.clone()
    }

    /// Raw value the current tenant was found with, if identification ran.
    pub fn identified_using(&self) -> Option<Value> {
        self.state.read().unwrap().via_value.clone()
    }

    fn set_via(&self, via: String, value: Value) {
        let mut state = self.state.write().unwrap();
        state.via = Some(via);
        state.via_value = Some(value);
    }

    /// Set the current tenant, firing a changed event only when the value
    /// actually differs (including null transitions).
    pub fn set_tenant(&self, tenant: Option<TenantRef>) -> &Self {
        let previous = {
            let mut state = self.state.write().unwrap();
            let changed = match (&state.tenant, &tenant) {
                (None, None) => false,
                (Some(a), Some(b)) => !same_tenant(a.as_ref(), b.as_ref()),
                _ => true,
            };
            if !changed {
                return self;
            }
            std::mem::replace(&mut state.tenant, tenant.clone())
        };

        self.listeners
            .emit(&TenancyEvent::Changed(TenancyChanged {
                current: tenant,
                previous,
                tenancy: self.name.clone(),
            }));
        self
    }

    /// Identify and set the current tenant by identifier, or by an explicit
    /// field when one is given. The attempted via/value are recorded even on
    /// a miss, for diagnostics.
    pub async fn identify(
        &self,
        identifier: &str,
        field: Option<&str>,
    ) -> Result<bool, TenantedError> {
        let tenant = match field {
            Some(field) => {
                self.provider
                    .retrieve_by(field, &Value::String(identifier.to_string()))
                    .await?
            }
            None => self.provider.retrieve_by_identifier(identifier).await?,
        };

        let via = match (&tenant, field) {
            (_, Some(field)) => field.to_string(),
            (Some(tenant), None) => tenant.identifier_name().to_string(),
            (None, None) => "identifier".to_string(),
        };
        self.set_via(via.clone(), Value::String(identifier.to_string()));

        if let Some(tenant) = &tenant {
            self.listeners.emit(&TenancyEvent::Identified(TenantFound::new(
                tenant.clone(),
                self.name.clone(),
                Some(via),
            )));
        }

        Ok(self.set_tenant(tenant).check())
    }

    /// Load and set the current tenant by key.
    pub async fn load(&self, key: &Value) -> Result<bool, TenantedError> {
        let tenant = self.provider.retrieve_by_key(key).await?;

        let via = tenant
            .as_ref()
            .map(|t| t.key_name().to_string())
            .unwrap_or_else(|| "key".to_string());
        self.set_via(via.clone(), key.clone());

        if let Some(tenant) = &tenant {
            self.listeners.emit(&TenancyEvent::Loaded(TenantFound::new(
                tenant.clone(),
                self.name.clone(),
                Some(via),
            )));
        }

        Ok(self.set_tenant(tenant).check())
    }

    /// Resolve against a request, lazily adopting the manager's default
    /// resolver when none is attached.
    pub async fn resolve(
        &self,
        request: &ResolverRequest<'_>,
        manager: &TenantedManager,
    ) -> Result<bool, TenantedError> {
        let resolver = match self.resolver() {
            Some(resolver) => resolver,
            None => {
                let resolver = manager.resolver(None)?;
                self.use_resolver(resolver.clone());
                resolver
            }
        };

        tracing::debug!(tenancy = %self.name, resolver = %resolver.name(), "resolving tenant");
        resolver.resolve(request, self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ArrayTenantProvider;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider() -> Arc<dyn TenantProvider> {
        let records = vec![
            json!({"identifier": "acme", "id": 1}).as_object().unwrap().clone(),
            json!({"identifier": "beta", "id": 2}).as_object().unwrap().clone(),
        ];
        Arc::new(ArrayTenantProvider::new("tenants", records, None, None).unwrap())
    }

    fn tenancy() -> Tenancy {
        Tenancy::new(
            "primary",
            provider(),
            TenancyConfig::default(),
            EventListeners::new(),
        )
    }

    #[tokio::test]
    async fn identify_sets_tenant_and_records_via() {
        let tenancy = tenancy();

        assert!(tenancy.identify("acme", None).await.unwrap());
        assert!(tenancy.check());
        assert_eq!(tenancy.identifier().as_deref(), Some("acme"));
        assert_eq!(tenancy.key(), Some(json!(1)));
        assert_eq!(tenancy.identified_via().as_deref(), Some("identifier"));
        assert_eq!(tenancy.identified_using(), Some(json!("acme")));
    }

    #[tokio::test]
    async fn failed_identify_still_records_attempt() {
        let tenancy = tenancy();

        assert!(!tenancy.identify("nope", None).await.unwrap());
        assert!(!tenancy.check());
        assert_eq!(tenancy.identifier(), None);
        assert_eq!(tenancy.key(), None);
        assert_eq!(tenancy.identified_via().as_deref(), Some("identifier"));
        assert_eq!(tenancy.identified_using(), Some(json!("nope")));
    }

    #[tokio::test]
    async fn load_uses_the_key_field() {
        let tenancy = tenancy();

        assert!(tenancy.load(&json!(2)).await.unwrap());
        assert_eq!(tenancy.identifier().as_deref(), Some("beta"));
        assert_eq!(tenancy.identified_via().as_deref(), Some("id"));
        assert_eq!(tenancy.identified_using(), Some(json!(2)));
    }

    #[tokio::test]
    async fn fork_shares_wiring_but_not_state() {
        let tenancy = tenancy();
        tenancy.identify("acme", None).await.unwrap();

        let fork = tenancy.fork();
        assert!(!fork.check());
        assert!(fork.identified_via().is_none());
        assert!(Arc::ptr_eq(fork.provider(), tenancy.provider()));

        fork.identify("beta", None).await.unwrap();
        assert_eq!(tenancy.identifier().as_deref(), Some("acme"));
        assert_eq!(fork.identifier().as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn check_tracks_tenant_across_transitions() {
        let tenancy = tenancy();
        assert_eq!(tenancy.check(), tenancy.tenant().is_some());

        tenancy.identify("acme", None).await.unwrap();
        assert_eq!(tenancy.check(), tenancy.tenant().is_some());

        tenancy.set_tenant(None);
        assert_eq!(tenancy.check(), tenancy.tenant().is_some());
        assert!(!tenancy.check());
    }

    #[tokio::test]
    async fn set_tenant_fires_changed_only_on_actual_change() {
        let listeners = EventListeners::new();
        let changes = Arc::new(AtomicUsize::new(0));
        let changes_clone = changes.clone();
        listeners.subscribe(move |event| {
            if matches!(event, TenancyEvent::Changed(_)) {
                changes_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let tenancy = Tenancy::new("primary", provider(), TenancyConfig::default(), listeners);

        tenancy.identify("acme", None).await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        // Same tenant again: no event.
        tenancy.identify("acme", None).await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 1);

        // Different tenant, then back to none: one event each.
        tenancy.identify("beta", None).await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 2);
        tenancy.set_tenant(None);
        assert_eq!(changes.load(Ordering::SeqCst), 3);
        tenancy.set_tenant(None);
        assert_eq!(changes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn changed_event_carries_current_and_previous() {
        let listeners = EventListeners::new();
        let seen: Arc<RwLock<Vec<(Option<String>, Option<String>)>>> =
            Arc::new(RwLock::new(Vec::new()));
        let seen_clone = seen.clone();
        listeners.subscribe(move |event| {
            if let TenancyEvent::Changed(changed) = event {
                seen_clone.write().unwrap().push((
                    changed.current.as_ref().map(|t| t.identifier()),
                    changed.previous.as_ref().map(|t| t.identifier()),
                ));
            }
        });

        let tenancy = Tenancy::new("primary", provider(), TenancyConfig::default(), listeners);
        tenancy.identify("acme", None).await.unwrap();
        tenancy.identify("beta", None).await.unwrap();

        let seen = seen.read().unwrap();
        assert_eq!(seen[0], (Some("acme".into()), None));
        assert_eq!(seen[1], (Some("beta".into()), Some("acme".into())));
    }

    #[tokio::test]
    async fn identified_event_fires_with_via() {
        let listeners = EventListeners::new();
        let via: Arc<RwLock<Option<String>>> = Arc::new(RwLock::new(None));
        let via_clone = via.clone();
        listeners.subscribe(move |event| {
            if let TenancyEvent::Identified(found) = event {
                *via_clone.write().unwrap() = found.via().map(str::to_string);
            }
        });

        let tenancy = Tenancy::new("primary", provider(), TenancyConfig::default(), listeners);
        tenancy.identify("acme", None).await.unwrap();
        assert_eq!(via.read().unwrap().as_deref(), Some("identifier"));
    }
}
