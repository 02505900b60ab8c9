//! Session resolver: the tenant identifier lives in the host's session
//! store, and is written back after a resolution through another channel.

use crate::error::TenantedError;
use crate::resolver::{
    apply_identifier, no_identifier, ActsAsMiddleware, ResolverRequest, TenantResolver,
};
use crate::routing;
use crate::tenancy::Tenancy;
use async_trait::async_trait;
use axum::http::request::Parts;
use axum::response::Response;
use std::collections::HashMap;
use std::sync::RwLock;

/// Key/value session storage as the host exposes it. Backing storage and
/// persistence are the host's concern.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory session, for tests and single-process hosts.
#[derive(Default)]
pub struct MemorySession {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySession {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.values.write().unwrap().insert(key.to_string(), value);
    }
}

pub struct SessionTenantResolver {
    name: String,
    session_key: Option<String>,
}

impl SessionTenantResolver {
    pub fn new(name: impl Into<String>, session_key: Option<String>) -> Self {
        SessionTenantResolver {
            name: name.into(),
            session_key,
        }
    }

    /// Configured session key, or the route parameter name for this
    /// tenancy/resolver pair.
    pub fn session_key(&self, tenancy: &Tenancy) -> String {
        match &self.session_key {
            Some(key) => key.clone(),
            None => routing::parameter_name(tenancy.name(), &self.name),
        }
    }
}

#[async_trait]
impl TenantResolver for SessionTenantResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        request: &ResolverRequest<'_>,
        tenancy: &Tenancy,
    ) -> Result<bool, TenantedError> {
        let key = self.session_key(tenancy);
        let value = request
            .session()
            .and_then(|session| session.get(&key));

        let Some(value) = value else {
            return Err(no_identifier("session", key, &self.name));
        };

        apply_identifier(tenancy, &value, None).await
    }

    fn as_middleware(&self) -> Option<&dyn ActsAsMiddleware> {
        Some(self)
    }
}

impl ActsAsMiddleware for SessionTenantResolver {
    fn apply_to_response(&self, request: &Parts, _response: &mut Response, tenancy: &Tenancy) {
        let same_resolver = tenancy.resolver().is_some_and(|r| r.name() == self.name);
        if !same_resolver || !tenancy.check() {
            return;
        }
        let Some(session) = ResolverRequest::new(request).session().cloned() else {
            return;
        };
        let key = self.session_key(tenancy);
        if session.has(&key) {
            return;
        }
        if let Some(value) = tenancy.identified_using() {
            let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            session.put(&key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::error::ResolverError;
    use crate::events::EventListeners;
    use crate::provider::ArrayTenantProvider;
    use crate::resolver::test_support::make_parts;
    use crate::resolver::SessionHandle;
    use serde_json::json;
    use std::sync::Arc;

    fn tenancy() -> Tenancy {
        let records = vec![
            json!({"identifier": "acme", "id": 1}).as_object().unwrap().clone(),
        ];
        Tenancy::new(
            "primary",
            Arc::new(ArrayTenantProvider::new("tenants", records, None, None).unwrap()),
            TenancyConfig::default(),
            EventListeners::new(),
        )
    }

    #[test]
    fn default_key_is_the_parameter_name() {
        let resolver = SessionTenantResolver::new("session", None);
        assert_eq!(resolver.session_key(&tenancy()), "primary_session");

        let resolver = SessionTenantResolver::new("session", Some("tenant".into()));
        assert_eq!(resolver.session_key(&tenancy()), "tenant");
    }

    #[tokio::test]
    async fn resolves_from_the_session() {
        let resolver = SessionTenantResolver::new("session", Some("tenant".into()));
        let tenancy = tenancy();

        let session = Arc::new(MemorySession::new());
        session.put("tenant", "acme".into());

        let mut parts = make_parts("/", &[]);
        parts.extensions.insert(SessionHandle(session));

        let found = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy)
            .await
            .unwrap();

        assert!(found);
        assert_eq!(tenancy.identifier().as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn missing_session_or_key_is_an_error() {
        let resolver = SessionTenantResolver::new("session", Some("tenant".into()));

        // No session at all.
        let parts = make_parts("/", &[]);
        let err = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantedError::Resolver(ResolverError::NoIdentifier { channel: "session", .. })
        ));

        // Session present, key absent.
        let mut parts = make_parts("/", &[]);
        parts
            .extensions
            .insert(SessionHandle(Arc::new(MemorySession::new())));
        let err = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantedError::Resolver(ResolverError::NoIdentifier { channel: "session", .. })
        ));
    }

    #[tokio::test]
    async fn writes_the_session_key_only_when_absent() {
        let resolver = Arc::new(SessionTenantResolver::new(
            "session",
            Some("tenant".into()),
        ));
        let tenancy = tenancy();
        tenancy.use_resolver(resolver.clone());
        tenancy.identify("acme", None).await.unwrap();

        let session = Arc::new(MemorySession::new());
        let mut parts = make_parts("/", &[]);
        parts.extensions.insert(SessionHandle(session.clone()));

        let mut response = Response::new(axum::body::Body::empty());
        resolver.apply_to_response(&parts, &mut response, &tenancy);
        assert_eq!(session.get("tenant").as_deref(), Some("acme"));

        // A value already in the session is left alone.
        session.put("tenant", "beta".into());
        resolver.apply_to_response(&parts, &mut response, &tenancy);
        assert_eq!(session.get("tenant").as_deref(), Some("beta"));
    }
}
