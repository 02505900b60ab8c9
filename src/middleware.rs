//! Request-pipeline integration: resolves a tenancy around the inner
//! handler and lets the resolver touch the outgoing response.

use crate::error::{TenancyError, TenantedError};
use crate::manager::TenantedManager;
use crate::resolver::ResolverRequest;
use crate::routing;
use crate::tenancy::Tenancy;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// The tenancy resolved for the current request, inserted as a request
/// extension for downstream handlers.
#[derive(Clone)]
pub struct CurrentTenancy(pub Arc<Tenancy>);

/// Tenancy middleware for one route group. Resolution failures surface as
/// the error's own response mapping (resolution misses become 404s).
///
/// Each request works on a fork of the cached tenancy, stacked for the
/// duration of the request and popped when it finishes; the manager's
/// cached instances never carry request state.
///
/// ```ignore
/// let tenanted = Tenanted::new(manager, Some("primary"), None);
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn(move |req, next| {
///         let tenanted = tenanted.clone();
///         async move { tenanted.handle(req, next).await }
///     }));
/// ```
#[derive(Clone)]
pub struct Tenanted {
    manager: Arc<TenantedManager>,
    tenancy: Option<String>,
    resolver: Option<String>,
}

struct StackGuard<'a> {
    manager: &'a TenantedManager,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.manager.pop_tenancy();
    }
}

impl Tenanted {
    pub fn new(
        manager: Arc<TenantedManager>,
        tenancy: Option<&str>,
        resolver: Option<&str>,
    ) -> Self {
        Tenanted {
            manager,
            tenancy: tenancy.map(str::to_string),
            resolver: resolver.map(str::to_string),
        }
    }

    /// Build from a `tenanted:{tenancy},{resolver}` descriptor.
    pub fn from_descriptor(manager: Arc<TenantedManager>, descriptor: &str) -> Option<Self> {
        let (tenancy, resolver) = routing::parse_descriptor(descriptor)?;
        Some(Tenanted {
            manager,
            tenancy,
            resolver,
        })
    }

    pub fn descriptor(&self) -> String {
        routing::middleware_descriptor(self.tenancy.as_deref(), self.resolver.as_deref())
    }

    pub async fn handle(&self, request: Request, next: Next) -> Response {
        match self.run(request, next).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "tenancy resolution failed");
                err.into_response()
            }
        }
    }

    async fn run(&self, request: Request, next: Next) -> Result<Response, TenantedError> {
        let tenancy = Arc::new(self.manager.tenancy(self.tenancy.as_deref())?.fork());

        if let Some(resolver) = self.resolver.as_deref() {
            tenancy.use_resolver(self.manager.resolver(Some(resolver))?);
        }

        self.manager.stack_tenancy(tenancy.clone());
        let _stacked = StackGuard {
            manager: self.manager.as_ref(),
        };

        let (mut parts, body) = request.into_parts();
        let found = tenancy
            .resolve(&ResolverRequest::new(&parts), &self.manager)
            .await?;
        if !found {
            return Err(TenancyError::TenantNotFound(tenancy.name().to_string()).into());
        }

        parts.extensions.insert(CurrentTenancy(tenancy.clone()));
        let request = Request::from_parts(parts.clone(), body);
        let mut response = next.run(request).await;

        if let Some(resolver) = tenancy.resolver() {
            if let Some(middleware) = resolver.as_middleware() {
                middleware.apply_to_response(&parts, &mut response, &tenancy);
            }
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::{Extension, Router};
    use serde_json::json;
    use tower::ServiceExt;

    fn manager() -> Arc<TenantedManager> {
        let config = config::from_json_str(
            &json!({
                "defaults": {"provider": "tenants", "resolver": "header", "tenancy": "primary"},
                "providers": {
                    "tenants": {
                        "driver": "array",
                        "source": {
                            "type": "inline",
                            "data": [
                                {"identifier": "acme", "id": 1, "active": true},
                                {"identifier": "beta", "id": 2, "active": false}
                            ]
                        }
                    }
                },
                "resolvers": {
                    "header": {"driver": "header", "header": "X-Tenant"}
                },
                "tenancies": {
                    "primary": {"provider": "tenants", "resolver": "header"}
                }
            })
            .to_string(),
        )
        .unwrap();
        Arc::new(TenantedManager::new(config))
    }

    async fn whoami(Extension(current): Extension<CurrentTenancy>) -> String {
        current.0.identifier().unwrap_or_default()
    }

    fn app(manager: Arc<TenantedManager>) -> Router {
        let tenanted = Tenanted::new(manager, Some("primary"), None);
        Router::new()
            .route("/", get(whoami))
            .layer(axum::middleware::from_fn(move |req: Request, next: Next| {
                let tenanted = tenanted.clone();
                async move { tenanted.handle(req, next).await }
            }))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn descriptor_round_trips_through_construction() {
        let manager = manager();
        let tenanted =
            Tenanted::from_descriptor(manager, "tenanted:primary,header").unwrap();
        assert_eq!(tenanted.descriptor(), "tenanted:primary,header");
    }

    #[tokio::test]
    async fn identified_requests_pass_through_with_the_header_echoed() {
        let manager = manager();
        let response = app(manager.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header("X-Tenant", "acme")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("X-Tenant").unwrap(), "acme");
        assert_eq!(body_string(response).await, "acme");
    }

    #[tokio::test]
    async fn requests_leave_no_stack_entries_or_cached_state_behind() {
        let manager = manager();
        let app = app(manager.clone());

        for (header, expected) in [("acme", "acme"), ("beta", "beta")] {
            let response = app
                .clone()
                .oneshot(
                    HttpRequest::builder()
                        .uri("/")
                        .header("X-Tenant", header)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_string(response).await, expected);
        }

        // Both requests popped their tenancy, and the cached instance never
        // carried either request's tenant.
        assert!(manager.tenancy_stack().is_empty());
        assert!(manager.current().is_none());
        assert!(!manager.tenancy(Some("primary")).unwrap().check());
    }

    #[tokio::test]
    async fn unknown_tenants_become_not_found() {
        let manager = manager();
        let response = app(manager.clone())
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header("X-Tenant", "nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"]["code"], "tenant_not_found");

        // Failed resolution pops the stack too.
        assert!(manager.tenancy_stack().is_empty());
    }

    #[tokio::test]
    async fn missing_channel_is_also_not_found() {
        let response = app(manager())
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
