//! Header resolver: a request header carries the tenant identifier and is
//! echoed back on the response.

use crate::error::TenantedError;
use crate::resolver::{
    ambiguous_identifier, apply_identifier, no_identifier, ActsAsMiddleware, ResolverRequest,
    TenantResolver,
};
use crate::tenancy::Tenancy;
use async_trait::async_trait;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::response::Response;

pub struct HeaderTenantResolver {
    name: String,
    header: Option<String>,
}

impl HeaderTenantResolver {
    pub fn new(name: impl Into<String>, header: Option<String>) -> Self {
        HeaderTenantResolver {
            name: name.into(),
            header,
        }
    }

    /// Configured header name, or the tenancy name with its first letter
    /// upper-cased.
    pub fn header_name(&self, tenancy: &Tenancy) -> String {
        match &self.header {
            Some(header) => header.clone(),
            None => {
                let name = tenancy.name();
                let mut chars = name.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

#[async_trait]
impl TenantResolver for HeaderTenantResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        request: &ResolverRequest<'_>,
        tenancy: &Tenancy,
    ) -> Result<bool, TenantedError> {
        let header = self.header_name(tenancy);
        let mut values = request.header_values(&header);

        match values.len() {
            0 => Err(no_identifier("header", header, &self.name)),
            1 => apply_identifier(tenancy, &values.remove(0), None).await,
            _ => Err(ambiguous_identifier("header", header, &self.name)),
        }
    }

    fn as_middleware(&self) -> Option<&dyn ActsAsMiddleware> {
        Some(self)
    }
}

impl ActsAsMiddleware for HeaderTenantResolver {
    fn apply_to_response(&self, _request: &Parts, response: &mut Response, tenancy: &Tenancy) {
        let same_resolver = tenancy.resolver().is_some_and(|r| r.name() == self.name);
        if !same_resolver || !tenancy.check() {
            return;
        }
        let Some(value) = tenancy.identified_using() else {
            return;
        };
        let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
        let name = self.header_name(tenancy);
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response.headers_mut().insert(name, value);
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
    use axum::http::Request;
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
    fn default_header_is_the_capitalised_tenancy_name() {
        let resolver = HeaderTenantResolver::new("header", None);
        assert_eq!(resolver.header_name(&tenancy()), "Primary");

        let resolver = HeaderTenantResolver::new("header", Some("X-Tenant".into()));
        assert_eq!(resolver.header_name(&tenancy()), "X-Tenant");
    }

    #[tokio::test]
    async fn resolves_from_a_single_header_value() {
        let resolver = HeaderTenantResolver::new("header", Some("X-Tenant".into()));
        let tenancy = tenancy();

        let parts = make_parts("/", &[("x-tenant", "acme")]);
        let found = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy)
            .await
            .unwrap();

        assert!(found);
        assert_eq!(tenancy.identifier().as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn missing_header_is_an_error() {
        let resolver = HeaderTenantResolver::new("header", Some("X-Tenant".into()));
        let parts = make_parts("/", &[]);
        let err = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantedError::Resolver(ResolverError::NoIdentifier { channel: "header", .. })
        ));
    }

    #[tokio::test]
    async fn repeated_header_is_ambiguous() {
        let resolver = HeaderTenantResolver::new("header", Some("X-Tenant".into()));
        let parts = Request::builder()
            .uri("/")
            .header("x-tenant", "acme")
            .header("x-tenant", "beta")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let err = resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TenantedError::Resolver(ResolverError::AmbiguousIdentifier { channel: "header", .. })
        ));
    }

    #[tokio::test]
    async fn echoes_the_identifier_on_the_response() {
        let resolver = Arc::new(HeaderTenantResolver::new(
            "header",
            Some("X-Tenant".into()),
        ));
        let tenancy = tenancy();
        tenancy.use_resolver(resolver.clone());

        let parts = make_parts("/", &[("x-tenant", "acme")]);
        resolver
            .resolve(&ResolverRequest::new(&parts), &tenancy)
            .await
            .unwrap();

        let mut response = Response::new(axum::body::Body::empty());
        resolver.apply_to_response(&parts, &mut response, &tenancy);
        assert_eq!(
            response.headers().get("X-Tenant").unwrap(),
            &HeaderValue::from_static("acme")
        );
    }
}
