//! The collaborator interface this crate consumes from a raw remote store
//! client. Credential loading, the actual wire protocol, and the
//! expression-builder DSL for filter/update/key-condition expressions are
//! deliberately out of scope — callers provide an implementation of
//! [`RemoteStore`] (for production, a thin adapter over their SDK of choice;
//! for tests, [`crate::core::store::mock::InMemoryStore`]).

use crate::core::common::error::TxManagerError;
use crate::core::common::value::{AttributeMap, AttributeValue};
use std::collections::BTreeMap;

/// The scalar type of a key attribute, as reported by `describe_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    S,
    N,
    B,
}

/// Whether a key schema entry is the hash or range component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Hash,
    Range,
}

/// One entry of a table's `KeySchema`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

/// One entry of a table's `AttributeDefinitions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: ScalarType,
}

/// A local secondary index: same hash key as the table, a different range
/// key, projecting every attribute.
#[derive(Debug, Clone)]
pub struct LocalSecondaryIndex {
    pub index_name: String,
    pub range_key: String,
}

/// Provisioned throughput for a table creation request.
#[derive(Debug, Clone, Copy)]
pub struct ProvisionedThroughput {
    pub read_capacity_units: u64,
    pub write_capacity_units: u64,
}

/// The subset of `describe_table`'s response this crate needs.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub key_schema: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub local_secondary_indexes: Vec<LocalSecondaryIndex>,
}

impl TableSchema {
    pub fn hash_key(&self) -> Option<&KeySchemaElement> {
        self.key_schema.iter().find(|k| k.key_type == KeyType::Hash)
    }

    pub fn range_key(&self) -> Option<&KeySchemaElement> {
        self.key_schema.iter().find(|k| k.key_type == KeyType::Range)
    }

    pub fn attribute_type(&self, name: &str) -> Option<ScalarType> {
        self.attribute_definitions
            .iter()
            .find(|a| a.attribute_name == name)
            .map(|a| a.attribute_type)
    }
}

/// A single-attribute precondition, the Rust shape of DynamoDB's
/// `{'Exists': 'false'}` / `{'Exists': 'true', 'Value': {...}}` convention.
#[derive(Debug, Clone)]
pub enum ExpectedCondition {
    NotExists,
    Exists(AttributeValue),
}

/// A full `expected` clause: every named attribute's condition must hold for
/// the write to proceed.
pub type Expected = BTreeMap<String, ExpectedCondition>;

/// A single attribute mutation within an `update_item` call.
#[derive(Debug, Clone)]
pub enum UpdateAction {
    /// Overwrite (or create) the attribute.
    Put(AttributeValue),
    /// Numeric increment, or set-union for `SS`/`NS`/`BS`.
    Add(AttributeValue),
    /// Remove the attribute entirely, or remove the given elements from a
    /// set-valued attribute.
    Delete(Option<AttributeValue>),
}

/// A full `attribute_updates` clause for `update_item`.
pub type AttributeUpdates = BTreeMap<String, UpdateAction>;

/// The collaborator interface consumed from the raw remote store client.
///
/// Every method may block (network round trip); implementations are
/// expected to be `Send + Sync` so a single store handle can be shared by
/// every in-flight transaction in a process.
pub trait RemoteStore: Send + Sync {
    /// Fetches (and the caller is expected to cache) a table's key schema
    /// and attribute definitions.
    fn describe_table(&self, table: &str) -> Result<TableSchema, TxManagerError>;

    /// Creates a table, returning once the request has been accepted. The
    /// caller is responsible for polling until it reports `ACTIVE`.
    fn create_table(
        &self,
        table: &str,
        attribute_definitions: Vec<AttributeDefinition>,
        key_schema: Vec<KeySchemaElement>,
        throughput: ProvisionedThroughput,
        local_secondary_indexes: Vec<LocalSecondaryIndex>,
    ) -> Result<(), TxManagerError>;

    /// Returns `true` once a previously-created table has become queryable.
    fn is_table_active(&self, table: &str) -> Result<bool, TxManagerError>;

    /// A strongly or eventually consistent point read, optionally projecting
    /// only a subset of attributes. `Ok(None)` means the item does not
    /// exist.
    fn get_item(
        &self,
        table: &str,
        key: &AttributeMap,
        projection: Option<&[String]>,
        consistent: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError>;

    /// Writes a full item, optionally conditioned on `expected`. Returns the
    /// item's prior image when `return_old` is set and a prior image
    /// existed.
    fn put_item(
        &self,
        table: &str,
        item: AttributeMap,
        expected: Option<Expected>,
        return_old: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError>;

    /// Applies `updates` to the item at `key`, optionally conditioned on
    /// `expected`. Returns the item's prior image when `return_old` is set.
    fn update_item(
        &self,
        table: &str,
        key: &AttributeMap,
        updates: AttributeUpdates,
        expected: Option<Expected>,
        return_old: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError>;

    /// Deletes the item at `key`, optionally conditioned on `expected`.
    /// Returns the item's prior image when `return_old` is set.
    fn delete_item(
        &self,
        table: &str,
        key: &AttributeMap,
        expected: Option<Expected>,
        return_old: bool,
    ) -> Result<Option<AttributeMap>, TxManagerError>;

    /// Returns every item in `table` sharing `hash_value` on the table's
    /// hash key, in unspecified order. Stands in for a DynamoDB `Query`
    /// against the base table (the WAL's two local secondary indexes exist
    /// only to let a real store order this result by `creation_date` or
    /// `rec_uuid`; this crate sorts the returned items client-side instead).
    fn query_by_hash_key(&self, table: &str, hash_value: &AttributeValue) -> Result<Vec<AttributeMap>, TxManagerError>;

    /// Returns every item in `table`. Stands in for a DynamoDB `Scan`; used
    /// only by [`crate::core::recovery`] to find abandoned transactions,
    /// since their `tx_uuid` is not known ahead of time.
    fn scan_table(&self, table: &str) -> Result<Vec<AttributeMap>, TxManagerError>;
}
