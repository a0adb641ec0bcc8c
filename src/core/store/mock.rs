//! An in-memory [`RemoteStore`] used by this crate's own tests. Modeled on
//! the teacher's simple in-memory key-value engines: a `Mutex`-guarded map
//! per table, no persistence, no network — just enough behavioral fidelity
//! (conditional writes, `ALL_OLD` images, set-valued `ADD`/`DELETE`) to drive
//! the lock manager, WAL, and coordinator through their paces.

use crate::core::common::error::TxManagerError;
use crate::core::common::value::{AttributeMap, AttributeValue};
use crate::core::store::traits::{
    AttributeUpdates, Expected, ExpectedCondition, KeySchemaElement, KeyType, LocalSecondaryIndex,
    ProvisionedThroughput, RemoteStore, ScalarType, TableSchema, UpdateAction,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

struct Table {
    schema: TableSchema,
    items: BTreeMap<String, AttributeMap>,
}

/// An in-memory stand-in for a DynamoDB-family store.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<HashMap<String, Table>>,
}

fn canonical_key(key: &AttributeMap) -> Result<String, TxManagerError> {
    serde_json::to_string(key).map_err(Into::into)
}

fn apply_expected(
    current: Option<&AttributeMap>,
    expected: &Expected,
) -> Result<(), TxManagerError> {
    for (attr, condition) in expected {
        let actual = current.and_then(|item| item.get(attr));
        match condition {
            ExpectedCondition::NotExists => {
                if actual.is_some() {
                    return Err(TxManagerError::ConditionalCheckFailed(format!(
                        "attribute {attr} exists"
                    )));
                }
            }
            ExpectedCondition::Exists(expected_value) => match actual {
                Some(value) if value == expected_value => {}
                _ => {
                    return Err(TxManagerError::ConditionalCheckFailed(format!(
                        "attribute {attr} does not match expected value"
                    )));
                }
            },
        }
    }
    Ok(())
}

fn apply_update(item: &mut AttributeMap, attr: &str, action: &UpdateAction) -> Result<(), TxManagerError> {
    match action {
        UpdateAction::Put(value) => {
            item.insert(attr.to_string(), value.clone());
        }
        UpdateAction::Add(value) => match value {
            AttributeValue::N(delta) => {
                let delta: i64 = delta
                    .parse()
                    .map_err(|_| TxManagerError::Internal(format!("non-numeric ADD value for {attr}")))?;
                let current: i64 = match item.get(attr) {
                    Some(AttributeValue::N(n)) => n
                        .parse()
                        .map_err(|_| TxManagerError::Internal(format!("non-numeric current value for {attr}")))?,
                    _ => 0,
                };
                item.insert(attr.to_string(), AttributeValue::N((current + delta).to_string()));
            }
            AttributeValue::SS(additions) => {
                let mut set = match item.remove(attr) {
                    Some(AttributeValue::SS(existing)) => existing,
                    _ => BTreeSet::new(),
                };
                set.extend(additions.iter().cloned());
                item.insert(attr.to_string(), AttributeValue::SS(set));
            }
            other => {
                return Err(TxManagerError::Internal(format!(
                    "ADD is not supported for attribute type {}",
                    other.type_tag()
                )));
            }
        },
        UpdateAction::Delete(None) => {
            item.remove(attr);
        }
        UpdateAction::Delete(Some(AttributeValue::SS(removals))) => {
            if let Some(AttributeValue::SS(existing)) = item.get_mut(attr) {
                for r in removals {
                    existing.remove(r);
                }
                if existing.is_empty() {
                    item.remove(attr);
                }
            }
        }
        UpdateAction::Delete(Some(_)) => {
            item.remove(attr);
        }
    }
    Ok(())
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: registers a table with a string hash key and no range
    /// key, as `ACTIVE` immediately.
    pub fn seed_table(&self, table: &str, hash_key_name: &str) {
        self.seed_table_with_range(table, hash_key_name, None);
    }

    /// Test helper: registers a table with a string hash key and, if given,
    /// a string range key.
    pub fn seed_table_with_range(&self, table: &str, hash_key_name: &str, range_key_name: Option<&str>) {
        let mut key_schema = vec![KeySchemaElement {
            attribute_name: hash_key_name.to_string(),
            key_type: KeyType::Hash,
        }];
        let mut attribute_definitions = vec![crate::core::store::traits::AttributeDefinition {
            attribute_name: hash_key_name.to_string(),
            attribute_type: ScalarType::S,
        }];
        if let Some(range_key_name) = range_key_name {
            key_schema.push(KeySchemaElement {
                attribute_name: range_key_name.to_string(),
                key_type: KeyType::Range,
            });
            attribute_definitions.push(crate::core::store::traits::AttributeDefinition {
                attribute_name: range_key_name.to_string(),
                attribute_type: ScalarType::S,
            });
        }
        let schema = TableSchema { key_schema, attribute_definitions, local_secondary_indexes: Vec::new() };
        self.tables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(table.to_string(), Table { schema, items: BTreeMap::new() });
    }

    /// Test helper: inserts an item directly, bypassing locks and the WAL.
    /// Used to set up pre-transaction fixtures.
    pub fn seed_item(&self, table: &str, item: AttributeMap) {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables.get_mut(table).expect("table must be seeded before seeding items");
        let key = extract_key(&t.schema, &item);
        let canonical = canonical_key(&key).expect("key serialization");
        t.items.insert(canonical, item);
    }

    /// Test helper: reads an item directly, bypassing locks.
    pub fn read_item(&self, table: &str, key: &AttributeMap) -> Option<AttributeMap> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let canonical = canonical_key(key).ok()?;
        tables.get(table).and_then(|t| t.items.get(&canonical)).cloned()
    }
}

fn extract_key(schema: &TableSchema, item: &AttributeMap) -> AttributeMap {
    let mut key = AttributeMap::new();
    if let Some(hash) = schema.hash_key() {
        if let Some(v) = item.get(&hash.attribute_name) {
            key.insert(hash.attribute_name.clone(), v.clone());
        }
    }
    if let Some(range) = schema.range_key() {
        if let Some(v) = item.get(&range.attribute_name) {
            key.insert(range.attribute_name.clone(), v.clone());
        }
    }
    key
}

impl RemoteStore for InMemoryStore {
    fn describe_table(&self, table: &str) -> Result<TableSchema, TxManagerError> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tables
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))
    }

    fn create_table(
        &self,
        table: &str,
        attribute_definitions: Vec<crate::core::store::traits::AttributeDefinition>,
        key_schema: Vec<KeySchemaElement>,
        _throughput: ProvisionedThroughput,
        local_secondary_indexes: Vec<LocalSecondaryIndex>,
    ) -> Result<(), TxManagerError> {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        tables.entry(table.to_string()).or_insert_with(|| Table {
            schema: TableSchema { key_schema, attribute_definitions, local_secondary_indexes },
            items: BTreeMap::new(),
        });
        Ok(())
    }

    fn is_table_active(&self, table: &str) -> Result<bool, TxManagerError> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(tables.contains_key(table))
    }

    fn get_item(
        &self,
        table: &str,
        key: &AttributeMap,
        projection: Option<&[String]>,
        _consistent: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables
            .get(table)
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))?;
        let canonical = canonical_key(key)?;
        let Some(item) = t.items.get(&canonical) else {
            return Ok(None);
        };
        match projection {
            None => Ok(Some(item.clone())),
            Some(attrs) => {
                let mut projected = AttributeMap::new();
                for attr in attrs {
                    if let Some(v) = item.get(attr) {
                        projected.insert(attr.clone(), v.clone());
                    }
                }
                Ok(Some(projected))
            }
        }
    }

    fn put_item(
        &self,
        table: &str,
        item: AttributeMap,
        expected: Option<Expected>,
        return_old: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError> {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables
            .get_mut(table)
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))?;
        let key = extract_key(&t.schema, &item);
        let canonical = canonical_key(&key)?;
        let previous = t.items.get(&canonical).cloned();
        if let Some(expected) = &expected {
            apply_expected(previous.as_ref(), expected)?;
        }
        t.items.insert(canonical, item);
        Ok(if return_old { previous } else { None })
    }

    fn update_item(
        &self,
        table: &str,
        key: &AttributeMap,
        updates: AttributeUpdates,
        expected: Option<Expected>,
        return_old: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError> {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables
            .get_mut(table)
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))?;
        let canonical = canonical_key(key)?;
        let previous = t.items.get(&canonical).cloned();
        if let Some(expected) = &expected {
            apply_expected(previous.as_ref(), expected)?;
        }
        let mut item = previous.clone().unwrap_or_else(|| key.clone());
        for (attr, action) in &updates {
            apply_update(&mut item, attr, action)?;
        }
        t.items.insert(canonical, item);
        Ok(if return_old { previous } else { None })
    }

    fn delete_item(
        &self,
        table: &str,
        key: &AttributeMap,
        expected: Option<Expected>,
        return_old: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError> {
        let mut tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables
            .get_mut(table)
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))?;
        let canonical = canonical_key(key)?;
        let previous = t.items.get(&canonical).cloned();
        if let Some(expected) = &expected {
            apply_expected(previous.as_ref(), expected)?;
        }
        t.items.remove(&canonical);
        Ok(if return_old { previous } else { None })
    }

    fn query_by_hash_key(&self, table: &str, hash_value: &AttributeValue) -> Result<Vec<AttributeMap>, TxManagerError> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables
            .get(table)
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))?;
        let Some(hash_key) = t.schema.hash_key() else {
            return Ok(Vec::new());
        };
        Ok(t.items
            .values()
            .filter(|item| item.get(&hash_key.attribute_name) == Some(hash_value))
            .cloned()
            .collect())
    }

    fn scan_table(&self, table: &str) -> Result<Vec<AttributeMap>, TxManagerError> {
        let tables = self.tables.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let t = tables
            .get(table)
            .ok_or_else(|| TxManagerError::Internal(format!("table {table} does not exist")))?;
        Ok(t.items.values().cloned().collect())
    }
}
