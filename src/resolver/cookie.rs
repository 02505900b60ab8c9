//! Cookie resolver: a request cookie carries the tenant identifier and is
//! set on the response when absent.

use crate::error::TenantedError;
use crate::resolver::{
    ambiguous_identifier, apply_identifier, no_identifier, ActsAsMiddleware, ResolverRequest,
    TenantResolver,
};
use crate::routing;
use crate::tenancy::Tenancy;
use async_trait::async_trait;
use axum::http::header::{HeaderValue, SET_COOKIE};
use axum::http::request::Parts;
use axum::response::Response;

pub struct CookieTenantResolver {
    name: String,
    cookie: Option<String>,
}

impl CookieTenantResolver {
    pub fn new(name: impl Into<String>, cookie: Option<String>) -> Self {
        CookieTenantResolver {
            name: name.into(),
            cookie,
        }
    }

    /// Configured cookie name, or the route parameter name for this
    /// tenancy/resolver pair.
    pub fn cookie_name(&self, tenancy: &Tenancy) -> String {
        match &self.cookie {
            Some(cookie) => cookie.clone(),
            None => routing::parameter_name(tenancy.name(), &self.name),
        }
    }
}

#[async_trait]
impl TenantResolver for CookieTenantResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        request: &ResolverRequest<'_>,
        tenancy: &Tenancy,
    ) -> Result<bool, TenantedError> {
        let cookie = self.cookie_name(tenancy);
        let mut values = request.cookie_values(&cookie);

        match values.len() {
            0 => Err(no_identifier("cookie", cookie, &self.name)),
            1 => apply_identifier(tenancy, &values.remove(0), None).await,
            _ => Err(ambiguous_identifier("cookie", cookie, &self.name)),
        }
    }

    fn as_middleware(&self) -> Option<&dyn ActsAsMiddleware> {
        Some(self)
    }
}

impl ActsAsMiddleware for CookieTenantResolver {
    fn apply_to_response(&self, request: &Parts, response: &mut Response, tenancy: &Tenancy) {
        let same_resolver = tenancy.resolver().is_some_and(|r| r.name() == self.name);
        if !same_resolver || !tenancy.check() {
            return;
        }
        let name = self.cookie_name(tenancy);

        // Keep an already-present request cookie as-is.
        if !ResolverRequest::new(request).cookie_values(&name).is_empty() {
            return;
        }

        let Some(value) = tenancy.identified_using() else {
            return;
        };
        let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        if let Ok(header) = HeaderValue::try_from(format!("{}={}; Path=/", name, value)) {
            response.headers_mut().append(SET_COOKIE, header);
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
    fn default_cookie_is_the_parameter_name() {
        let resolver = CookieTenantResolver::new("cookie", None);
        assert_eq!(resolver.cookie_name(&tenancy()), "primary_cookie");

        let resolver = CookieTenantResolver::new("cookie", Some("tenant".into()));
        assert_eq!(resolver.cookie_name(&tenancy()), "tenant");
    }

    #[tokio::test]
    async fn resolves_from_a_single_cookie() {
        let resolver = CookieTenantResolver::new("cookie", Some("tenant".into()));
        let tenancy = tenancy();

        let parts = make_parts("/", &[("cookie", "tenant=acme; theme=dark")]);
        let found = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy)
            .await
            .unwrap();

        assert!(found);
        assert_eq!(tenancy.identifier().as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn missing_cookie_is_an_error() {
        let resolver = CookieTenantResolver::new("cookie", Some("tenant".into()));
        let parts = make_parts("/", &[("cookie", "theme=dark")]);
        let err = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantedError::Resolver(ResolverError::NoIdentifier { channel: "cookie", .. })
        ));
    }

    #[tokio::test]
    async fn repeated_cookie_is_ambiguous() {
        let resolver = CookieTenantResolver::new("cookie", Some("tenant".into()));
        let parts = make_parts("/", &[("cookie", "tenant=acme; tenant=beta")]);
        let err = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantedError::Resolver(ResolverError::AmbiguousIdentifier { channel: "cookie", .. })
        ));
    }

    #[tokio::test]
    async fn sets_the_cookie_only_when_the_request_lacked_it() {
        let resolver = Arc::new(CookieTenantResolver::new("cookie", Some("tenant".into())));
        let tenancy = tenancy();
        tenancy.use_resolver(resolver.clone());

        let parts = make_parts("/", &[("cookie", "tenant=acme")]);
        resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy)
            .await
            .unwrap();

        let mut response = Response::new(axum::body::Body::empty());
        resolver.apply_to_response(&parts, &mut response, &tenancy);
        assert!(response.headers().get(SET_COOKIE).is_none());

        // Identified some other way: the cookie gets written.
        tenancy.identify("acme", None).await.unwrap();
        let bare = make_parts("/", &[]);
        let mut response = Response::new(axum::body::Body::empty());
        resolver.apply_to_response(&bare, &mut response, &tenancy);
        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            &HeaderValue::from_static("tenant=acme; Path=/")
        );
    }
}
