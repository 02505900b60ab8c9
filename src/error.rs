//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Construction and lookup errors for tenant providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("no config found for tenant provider '{0}'")]
    MissingConfig(String),
    #[error("no driver found for tenant provider '{0}'")]
    MissingDriver(String),
    #[error("no tenant provider found '{0}'")]
    Unknown(String),
    #[error("configuration value '{value}' not found for tenant provider '{name}'")]
    MissingValue { value: String, name: String },
    #[error("unknown source type '{0}' for array tenant provider")]
    UnknownSourceType(String),
    #[error("tenant source: {0}")]
    Source(String),
    #[error("tenant record missing its '{field}' attribute")]
    IncompleteTenant { field: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Construction and resolution errors for tenant resolvers.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("no config found for tenant resolver '{0}'")]
    MissingConfig(String),
    #[error("no driver found for tenant resolver '{0}'")]
    MissingDriver(String),
    #[error("no tenant resolver found '{0}'")]
    Unknown(String),
    #[error("configuration value '{value}' not found for tenant resolver '{name}'")]
    MissingValue { value: String, name: String },
    #[error("request is missing its {channel} '{expected}', required by tenant resolver '{resolver}'")]
    NoIdentifier {
        channel: &'static str,
        expected: String,
        resolver: String,
    },
    #[error("multiple {channel} values present for '{expected}' on tenant resolver '{resolver}'")]
    AmbiguousIdentifier {
        channel: &'static str,
        expected: String,
        resolver: String,
    },
}

#[derive(Error, Debug)]
pub enum TenancyError {
    #[error("no config found for tenancy '{0}'")]
    MissingConfig(String),
    #[error("no current tenant for tenancy '{0}'")]
    TenantNotFound(String),
}

/// Data-integrity errors raised while populating or validating a model's
/// tenant relation. Orphaned and mismatched are deliberately distinct.
#[derive(Error, Debug)]
pub enum RelationError {
    #[error("record's tenant key '{column}' is null while tenancy '{tenancy}' has a current tenant")]
    Orphaned { column: String, tenancy: String },
    #[error("record's tenant (via '{column}') is not the current tenant of tenancy '{tenancy}'")]
    Mismatch { column: String, tenancy: String },
}

#[derive(Error, Debug)]
pub enum TenantedError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    #[error(transparent)]
    Relation(#[from] RelationError),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl TenantedError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            TenantedError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            TenantedError::Provider(ProviderError::Db(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
            }
            TenantedError::Provider(_) => (StatusCode::INTERNAL_SERVER_ERROR, "provider_error"),
            // A resolution failure means the request addressed no known tenant.
            TenantedError::Resolver(ResolverError::NoIdentifier { .. })
            | TenantedError::Resolver(ResolverError::AmbiguousIdentifier { .. }) => {
                (StatusCode::NOT_FOUND, "tenant_not_found")
            }
            TenantedError::Resolver(_) => (StatusCode::INTERNAL_SERVER_ERROR, "resolver_error"),
            TenantedError::Tenancy(TenancyError::TenantNotFound(_)) => {
                (StatusCode::NOT_FOUND, "tenant_not_found")
            }
            TenantedError::Tenancy(_) => (StatusCode::INTERNAL_SERVER_ERROR, "tenancy_error"),
            TenantedError::Relation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "relation_error"),
        }
    }
}

impl IntoResponse for TenantedError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_errors_map_to_not_found() {
        let err = TenantedError::Resolver(ResolverError::NoIdentifier {
            channel: "header",
            expected: "X-Tenant".into(),
            resolver: "header".into(),
        });
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);

        let err = TenantedError::Tenancy(TenancyError::TenantNotFound("primary".into()));
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);
    }

    #[test]
    fn config_errors_are_server_errors() {
        let err = TenantedError::Provider(ProviderError::MissingDriver("tenants".into()));
        assert_eq!(err.status_and_code().0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
