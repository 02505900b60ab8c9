//! Tenancy lifecycle events, dispatched to an explicit listener list rather
//! than a framework-wide bus.

use crate::entity::TenantRef;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// A tenant was retrieved from storage. The tenancy is carried by name and
/// the via field is snapshotted at dispatch.
#[derive(Debug, Clone)]
pub struct TenantFound {
    tenant: TenantRef,
    tenancy: String,
    via: Option<String>,
}

impl TenantFound {
    pub fn new(tenant: TenantRef, tenancy: impl Into<String>, via: Option<String>) -> Self {
        TenantFound {
            tenant,
            tenancy: tenancy.into(),
            via,
        }
    }

    pub fn tenant(&self) -> &TenantRef {
        &self.tenant
    }

    pub fn tenancy(&self) -> &str {
        &self.tenancy
    }

    pub fn via(&self) -> Option<&str> {
        self.via.as_deref()
    }
}

/// The current tenant of a tenancy changed, including null transitions.
#[derive(Debug, Clone)]
pub struct TenancyChanged {
    pub current: Option<TenantRef>,
    pub previous: Option<TenantRef>,
    pub tenancy: String,
}

#[derive(Debug, Clone)]
pub enum TenancyEvent {
    Changed(TenancyChanged),
    Identified(TenantFound),
    Loaded(TenantFound),
}

pub type Listener = Arc<dyn Fn(&TenancyEvent) + Send + Sync>;

/// Listener registry shared between the manager and its tenancies.
#[derive(Clone, Default)]
pub struct EventListeners {
    inner: Arc<RwLock<HashMap<ListenerId, Listener>>>,
}

impl EventListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TenancyEvent) + Send + Sync + 'static,
    {
        let id = next_listener_id();
        self.inner.write().unwrap().insert(id, Arc::new(listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.inner.write().unwrap().remove(&id);
    }

    pub fn emit(&self, event: &TenancyEvent) {
        let listeners: Vec<Listener> = self.inner.read().unwrap().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TenantEntity;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn tenant() -> TenantRef {
        Arc::new(
            TenantEntity::new(
                "identifier",
                "id",
                json!({"identifier": "acme", "id": 1})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
            .unwrap(),
        )
    }

    #[test]
    fn emits_to_subscribers_until_unsubscribed() {
        let listeners = EventListeners::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = seen.clone();
        let id = listeners.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        let event = TenancyEvent::Identified(TenantFound::new(tenant(), "primary", None));
        listeners.emit(&event);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        listeners.unsubscribe(id);
        listeners.emit(&event);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn found_event_exposes_tenant_tenancy_and_via() {
        let event = TenantFound::new(tenant(), "primary", Some("identifier".into()));
        assert_eq!(event.tenant().identifier(), "acme");
        assert_eq!(event.tenancy(), "primary");
        assert_eq!(event.via(), Some("identifier"));
    }
}
