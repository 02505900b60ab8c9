//! Path resolver: a fixed path segment carries the tenant identifier.

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

pub const DEFAULT_SEGMENT: usize = 0;

pub struct PathTenantResolver {
    name: String,
    segment: usize,
}

impl PathTenantResolver {
    pub fn new(name: impl Into<String>, segment: Option<usize>) -> Self {
        PathTenantResolver {
            name: name.into(),
            segment: segment.unwrap_or(DEFAULT_SEGMENT),
        }
    }

    pub fn segment(&self) -> usize {
        self.segment
    }
}

#[async_trait]
impl TenantResolver for PathTenantResolver {
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
            None => (
                request.path_segment(self.segment).map(str::to_string),
                None,
            ),
        };

        let Some(value) = value else {
            return Err(no_identifier("path segment", parameter, &self.name));
        };

        apply_identifier(tenancy, &value, binding.as_deref()).await
    }

    fn as_middleware(&self) -> Option<&dyn ActsAsMiddleware> {
        Some(self)
    }
}

impl ActsAsMiddleware for PathTenantResolver {
    fn apply_to_response(&self, _request: &Parts, response: &mut Response, tenancy: &Tenancy) {
        let same_resolver = tenancy.resolver().is_some_and(|r| r.name() == self.name);
        if !same_resolver || !tenancy.check() {
            return;
        }
        if let Some(value) = tenancy.identified_using() {
            let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
            let parameter = routing::parameter_name(tenancy.name(), &self.name);
            if response.extensions().get::<UrlDefaults>().is_none() {
                response.extensions_mut().insert(UrlDefaults::default());
            }
            if let Some(defaults) = response.extensions_mut().get_mut::<UrlDefaults>() {
                defaults.0.insert(parameter, value);
            }
        }
    }
}
