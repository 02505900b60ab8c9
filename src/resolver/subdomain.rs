//! Subdomain resolver: leftmost host label under a configured base domain.

use crate::error::TenantedError;
use crate::resolver::{
    apply_identifier, no_identifier, ActsAsMiddleware, ResolverRequest, TenantResolver,
    UrlDefaults,
};
use crate::routing;
use crate::tenancy::Tenancy;
use async_trait::async_trait;
use axum::http::request::Parts;
use axum::response::Response;

pub struct SubdomainTenantResolver {
    name: String,
    domain: String,
}

impl SubdomainTenantResolver {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        SubdomainTenantResolver {
            name: name.into(),
            domain: domain.into(),
        }
    }

    /// Strip the trailing `.{domain}` suffix; a bare domain has no subdomain.
    fn fallback(&self, request: &ResolverRequest<'_>) -> Option<String> {
        let host = request.host()?;
        let suffix = format!(".{}", self.domain);
        host.strip_suffix(suffix.as_str()).map(str::to_string)
    }
}

#[async_trait]
impl TenantResolver for SubdomainTenantResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(
        &self,
        request: &ResolverRequest<'_>,
        tenancy: &Tenancy,
    ) -> Result<bool, TenantedError> {
        let parameter = routing::parameter_name(tenancy.name(), &self.name);

        let (value, binding) = match request.route_params().and_then(|p| p.get(&parameter)) {
            Some(param) => (Some(param.value.clone()), param.binding.clone()),
            None => (self.fallback(request), None),
        };

        let Some(value) = value else {
            return Err(no_identifier("subdomain", parameter, &self.name));
        };

        apply_identifier(tenancy, &value, binding.as_deref()).await
    }

    fn as_middleware(&self) -> Option<&dyn ActsAsMiddleware> {
        Some(self)
    }
}

impl ActsAsMiddleware for SubdomainTenantResolver {
    fn apply_to_response(&self, _request: &Parts, response: &mut Response, tenancy: &Tenancy) {
        let same_resolver = tenancy.resolver().is_some_and(|r| r.name() == self.name);
        if !same_resolver || !tenancy.check() {
            return;
        }
        if let Some(value) = tenancy.identified_using() {
            let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            if response.extensions().get::<UrlDefaults>().is_none() {
                response.extensions_mut().insert(UrlDefaults::default());
            }
            if let Some(defaults) = response.extensions_mut().get_mut::<UrlDefaults>() {
                defaults
                    .0
                    .insert(routing::parameter_name(tenancy.name(), &self.name), value);
            }
        }
    }
}
