//! In-memory tenant provider over a fixed list of records.

use crate::entity::{TenantEntity, TenantRef};
use crate::error::ProviderError;
use crate::provider::{canonical_key, TenantProvider};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_IDENTIFIER: &str = "identifier";
pub const DEFAULT_KEY: &str = "id";

/// Holds an ordered list of raw records plus two lookup indexes built
/// eagerly at construction. Construction fails if any record lacks the
/// identifier or key field.
#[derive(Debug)]
pub struct ArrayTenantProvider {
    name: String,
    tenants: Vec<Map<String, Value>>,
    identifier_map: HashMap<String, usize>,
    key_map: HashMap<String, usize>,
    identifier: String,
    key: String,
}

impl ArrayTenantProvider {
    pub fn new(
        name: impl Into<String>,
        tenants: Vec<Map<String, Value>>,
        identifier: Option<String>,
        key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let identifier = identifier.unwrap_or_else(|| DEFAULT_IDENTIFIER.into());
        let key = key.unwrap_or_else(|| DEFAULT_KEY.into());

        let mut identifier_map = HashMap::with_capacity(tenants.len());
        let mut key_map = HashMap::with_capacity(tenants.len());

        for (index, tenant) in tenants.iter().enumerate() {
            let identifier_value = match tenant.get(identifier.as_str()) {
                None | Some(Value::Null) => {
                    return Err(ProviderError::IncompleteTenant {
                        field: identifier.clone(),
                    })
                }
                Some(v) => v,
            };
            let key_value = match tenant.get(key.as_str()) {
                None | Some(Value::Null) => {
                    return Err(ProviderError::IncompleteTenant { field: key.clone() })
                }
                Some(v) => v,
            };

            identifier_map.insert(canonical_key(identifier_value), index);
            key_map.insert(canonical_key(key_value), index);
        }

        Ok(ArrayTenantProvider {
            name: name.into(),
            tenants,
            identifier_map,
            key_map,
            identifier,
            key,
        })
    }

    fn make_entity(&self, index: usize) -> Result<Option<TenantRef>, ProviderError> {
        let Some(attributes) = self.tenants.get(index) else {
            return Ok(None);
        };
        let entity =
            TenantEntity::new(self.identifier.clone(), self.key.clone(), attributes.clone())?;
        Ok(Some(Arc::new(entity)))
    }

    /// Linear scan with a caller-supplied predicate, for flexible matching
    /// (e.g. case-insensitive comparison) the equality lookups can't express.
    pub fn retrieve_matching(
        &self,
        field: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Result<Option<TenantRef>, ProviderError> {
        for (index, tenant) in self.tenants.iter().enumerate() {
            if let Some(value) = tenant.get(field) {
                if predicate(value) {
                    return self.make_entity(index);
                }
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl TenantProvider for ArrayTenantProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<TenantRef>, ProviderError> {
        match self.identifier_map.get(identifier) {
            Some(&index) => self.make_entity(index),
            None => Ok(None),
        }
    }

    async fn retrieve_by_key(&self, key: &Value) -> Result<Option<TenantRef>, ProviderError> {
        match self.key_map.get(canonical_key(key).as_str()) {
            Some(&index) => self.make_entity(index),
            None => Ok(None),
        }
    }

    async fn retrieve_by(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Option<TenantRef>, ProviderError> {
        // Strict equality, unlike the canonicalized identifier/key indexes:
        // an arbitrary field has no declared type, so "1" and 1 stay distinct.
        self.retrieve_matching(field, |candidate| candidate == value)
    }
}
