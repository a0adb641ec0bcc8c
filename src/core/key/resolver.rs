//! The key resolver: turns a table's `describe_table` schema plus
//! caller-supplied hash/range values into the key `AttributeMap` every
//! store call needs.
//!
//! Grounded on the original source's `gen_key_attribute` (stringifies the
//! hash/range values according to the schema's reported scalar type, and
//! raises a configuration error when a range key is required but was not
//! given). We additionally cache each table's schema after the first
//! `describe_table`, since every item handle for the same table re-resolves
//! its key on every operation.

use crate::core::common::error::TxManagerError;
use crate::core::common::value::{AttributeMap, AttributeValue};
use crate::core::store::traits::{RemoteStore, TableSchema};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Resolves and caches table key schemas, and builds key `AttributeMap`s
/// from caller-supplied hash/range values.
pub struct KeyResolver {
    store: Arc<dyn RemoteStore>,
    cache: RwLock<HashMap<String, TableSchema>>,
}

impl KeyResolver {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store, cache: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached schema for `table`, fetching and caching it on
    /// first use.
    pub fn schema(&self, table: &str) -> Result<TableSchema, TxManagerError> {
        if let Some(schema) = self.cache.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(table) {
            return Ok(schema.clone());
        }
        let schema = self.store.describe_table(table)?;
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(table.to_string(), schema.clone());
        Ok(schema)
    }

    /// Drops a cached schema, forcing the next [`Self::schema`] call to
    /// refetch it. Used after `create_table` establishes a new auxiliary
    /// table whose schema was not yet known.
    pub fn invalidate(&self, table: &str) {
        self.cache.write().unwrap_or_else(std::sync::PoisonError::into_inner).remove(table);
    }

    /// Builds the key `AttributeMap` for `table` from a hash value and an
    /// optional range value, validating both against the table's schema.
    pub fn resolve(
        &self,
        table: &str,
        hash_value: AttributeValue,
        range_value: Option<AttributeValue>,
    ) -> Result<AttributeMap, TxManagerError> {
        let schema = self.schema(table)?;
        let hash_key = schema.hash_key().ok_or_else(|| {
            TxManagerError::KeyConfigurationError(format!("table {table} has no hash key in its key schema"))
        })?;

        let mut key = AttributeMap::new();
        key.insert(hash_key.attribute_name.clone(), hash_value);

        match (schema.range_key(), range_value) {
            (Some(range_key), Some(value)) => {
                key.insert(range_key.attribute_name.clone(), value);
            }
            (Some(range_key), None) => {
                return Err(TxManagerError::KeyConfigurationError(format!(
                    "table {table} requires a range key ({}) but none was given",
                    range_key.attribute_name
                )));
            }
            (None, Some(_)) => {
                return Err(TxManagerError::KeyConfigurationError(format!(
                    "table {table} has no range key but a range value was given"
                )));
            }
            (None, None) => {}
        }

        Ok(key)
    }
}
