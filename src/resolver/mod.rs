//! Tenant resolvers: strategies for extracting a tenant identifier from an
//! inbound request, and optionally writing it back to the response.

pub mod cookie;
pub mod header;
pub mod path;
pub mod session;
pub mod subdomain;

pub use cookie::CookieTenantResolver;
pub use header::HeaderTenantResolver;
pub use path::PathTenantResolver;
pub use session::{MemorySession, SessionStore, SessionTenantResolver};
pub use subdomain::SubdomainTenantResolver;

use crate::error::{ResolverError, TenantedError};
use crate::tenancy::Tenancy;
use async_trait::async_trait;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::response::Response;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Route binding sentinel: match the value against the tenant identifier.
pub const BINDING_IDENTIFIER: &str = "tenant_identifier";
/// Route binding sentinel: match the value against the tenant key.
pub const BINDING_KEY: &str = "tenant_key";

/// A route parameter as bound by the host's router: the raw value plus the
/// field it was declared to bind by, if any.
#[derive(Clone, Debug)]
pub struct RouteParam {
    pub value: String,
    pub binding: Option<String>,
}

impl RouteParam {
    pub fn new(value: impl Into<String>) -> Self {
        RouteParam {
            value: value.into(),
            binding: None,
        }
    }

    pub fn bound_by(value: impl Into<String>, binding: impl Into<String>) -> Self {
        RouteParam {
            value: value.into(),
            binding: Some(binding.into()),
        }
    }
}

/// Route parameters for the matched route. The host inserts this as a
/// request extension before resolution runs.
#[derive(Clone, Debug, Default)]
pub struct RouteParams(HashMap<String, RouteParam>);

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, param: RouteParam) {
        self.0.insert(name.into(), param);
    }

    pub fn get(&self, name: &str) -> Option<&RouteParam> {
        self.0.get(name)
    }
}

/// Session handle carried as a request extension; the storage behind it is a
/// host concern.
#[derive(Clone)]
pub struct SessionHandle(pub Arc<dyn SessionStore>);

/// Values identified during resolution that downstream URL generation should
/// default to, keyed by route parameter name. Inserted on the response by the
/// path and subdomain resolvers.
#[derive(Clone, Debug, Default)]
pub struct UrlDefaults(pub HashMap<String, String>);

/// Read-only view of the inbound request, as resolvers see it.
pub struct ResolverRequest<'a> {
    parts: &'a Parts,
}

impl<'a> ResolverRequest<'a> {
    pub fn new(parts: &'a Parts) -> Self {
        ResolverRequest { parts }
    }

    /// Request host without any port, from the Host header or the URI.
    pub fn host(&self) -> Option<String> {
        let raw = self
            .parts
            .headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.parts.uri.host());
        raw.map(|h| h.split(':').next().unwrap_or(h).to_string())
    }

    /// Zero-based path segment.
    pub fn path_segment(&self, index: usize) -> Option<&str> {
        let path = self.parts.uri.path();
        path.strip_prefix('/')
            .unwrap_or(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .nth(index)
    }

    /// All values for a header, in order.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.parts
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// All values for a cookie across every Cookie header. More than one
    /// value for the same name is a hard error at the call site.
    pub fn cookie_values(&self, name: &str) -> Vec<String> {
        let mut values = Vec::new();
        for header in self.parts.headers.get_all(axum::http::header::COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            for pair in raw.split(';') {
                if let Some((candidate, value)) = pair.trim().split_once('=') {
                    if candidate.trim() == name {
                        values.push(value.trim().to_string());
                    }
                }
            }
        }
        values
    }

    pub fn route_params(&self) -> Option<&RouteParams> {
        self.parts.extensions.get::<RouteParams>()
    }

    pub fn session(&self) -> Option<&Arc<dyn SessionStore>> {
        self.parts.extensions.get::<SessionHandle>().map(|h| &h.0)
    }
}

/// Strategy for extracting a tenant identifier from a request. Stateless
/// across requests; anything per-request is recorded on the tenancy.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    fn name(&self) -> &str;

    /// Extract and apply an identifier. Returns whether a tenant was found;
    /// raises when the expected channel is absent from the request.
    async fn resolve(
        &self,
        request: &ResolverRequest<'_>,
        tenancy: &Tenancy,
    ) -> Result<bool, TenantedError>;

    /// Resolvers that also influence the outgoing response.
    fn as_middleware(&self) -> Option<&dyn ActsAsMiddleware> {
        None
    }
}

/// Capability to rewrite the outgoing response after the main handler has
/// run (cookie set, header echo, URL defaults).
pub trait ActsAsMiddleware: Send + Sync {
    fn apply_to_response(&self, request: &Parts, response: &mut Response, tenancy: &Tenancy);
}

/// Shared binding-mode dispatch used by every resolver.
pub(crate) async fn apply_identifier(
    tenancy: &Tenancy,
    value: &str,
    binding: Option<&str>,
) -> Result<bool, TenantedError> {
    match binding {
        Some(BINDING_IDENTIFIER) | None => tenancy.identify(value, None).await,
        Some(BINDING_KEY) => tenancy.load(&Value::String(value.to_string())).await,
        Some(field) => tenancy.identify(value, Some(field)).await,
    }
}

pub(crate) fn no_identifier(
    channel: &'static str,
    expected: impl Into<String>,
    resolver: &str,
) -> TenantedError {
    TenantedError::Resolver(ResolverError::NoIdentifier {
        channel,
        expected: expected.into(),
        resolver: resolver.to_string(),
    })
}

pub(crate) fn ambiguous_identifier(
    channel: &'static str,
    expected: impl Into<String>,
    resolver: &str,
) -> TenantedError {
    TenantedError::Resolver(ResolverError::AmbiguousIdentifier {
        channel,
        expected: expected.into(),
        resolver: resolver.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::http::Request;

    /// Request parts fixture for resolver tests.
    pub fn make_parts(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }
}
