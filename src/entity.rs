//! The tenant contract and the default attribute-bag entity.

use crate::error::ProviderError;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// A tenant as seen by the rest of the crate. Providers create these;
/// everything else only reads them.
///
/// The identifier is the externally-facing handle (a slug, a subdomain
/// label), the key is the internal one (typically a primary key).
pub trait Tenant: fmt::Debug + Send + Sync {
    fn identifier(&self) -> String;
    fn identifier_name(&self) -> &str;
    fn key(&self) -> Value;
    fn key_name(&self) -> &str;

    fn attribute(&self, _name: &str) -> Option<&Value> {
        None
    }

    /// Consulted by external features, never by resolution itself.
    fn is_active(&self) -> bool {
        self.attribute("active")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

/// Two tenants are the same when their identifier/key pairs agree. Trait
/// objects carry no usable reference identity across `Arc` clones.
pub fn same_tenant(a: &dyn Tenant, b: &dyn Tenant) -> bool {
    a.identifier() == b.identifier() && a.key() == b.key()
}

/// Default tenant entity: a raw attribute map plus the names of the
/// identifier and key attributes within it.
#[derive(Clone, Debug)]
pub struct TenantEntity {
    identifier_name: String,
    key_name: String,
    attributes: Map<String, Value>,
}

impl TenantEntity {
    /// Both the identifier and key attributes must be present and non-null.
    pub fn new(
        identifier_name: impl Into<String>,
        key_name: impl Into<String>,
        attributes: Map<String, Value>,
    ) -> Result<Self, ProviderError> {
        let identifier_name = identifier_name.into();
        let key_name = key_name.into();

        for field in [&identifier_name, &key_name] {
            match attributes.get(field.as_str()) {
                None | Some(Value::Null) => {
                    return Err(ProviderError::IncompleteTenant {
                        field: field.clone(),
                    })
                }
                Some(_) => {}
            }
        }

        Ok(TenantEntity {
            identifier_name,
            key_name,
            attributes,
        })
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }
}

impl Tenant for TenantEntity {
    fn identifier(&self) -> String {
        match &self.attributes[self.identifier_name.as_str()] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn identifier_name(&self) -> &str {
        &self.identifier_name
    }

    fn key(&self) -> Value {
        self.attributes[self.key_name.as_str()].clone()
    }

    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Shared handle used everywhere a tenant crosses a boundary.
pub type TenantRef = Arc<dyn Tenant>;
