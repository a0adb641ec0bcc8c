//! Verifies or creates the `tx-info`/`tx-data` auxiliary tables a
//! [`crate::core::transaction::tx::Tx`] needs before it can do anything
//! else. Grounded on §4.D's bootstrap procedure: compare sorted
//! `AttributeDefinitions`/`KeySchema` against what this crate expects,
//! creating the table (and polling until `ACTIVE`) only when it is absent.

use crate::core::common::config::TxManagerConfig;
use crate::core::common::error::TxManagerError;
use crate::core::store::traits::{
    AttributeDefinition, KeySchemaElement, KeyType, LocalSecondaryIndex, ProvisionedThroughput, RemoteStore, ScalarType, TableSchema,
};
use std::thread;
use std::time::Duration;

fn expected_tx_info_schema() -> (Vec<AttributeDefinition>, Vec<KeySchemaElement>) {
    (
        vec![AttributeDefinition { attribute_name: "tx_uuid".to_string(), attribute_type: ScalarType::S }],
        vec![KeySchemaElement { attribute_name: "tx_uuid".to_string(), key_type: KeyType::Hash }],
    )
}

fn expected_tx_data_schema() -> (Vec<AttributeDefinition>, Vec<KeySchemaElement>, Vec<LocalSecondaryIndex>) {
    (
        vec![
            AttributeDefinition { attribute_name: "tx_uuid".to_string(), attribute_type: ScalarType::S },
            AttributeDefinition { attribute_name: "log_uuid".to_string(), attribute_type: ScalarType::S },
        ],
        vec![
            KeySchemaElement { attribute_name: "tx_uuid".to_string(), key_type: KeyType::Hash },
            KeySchemaElement { attribute_name: "log_uuid".to_string(), key_type: KeyType::Range },
        ],
        vec![
            LocalSecondaryIndex { index_name: "creation_date-index".to_string(), range_key: "creation_date".to_string() },
            LocalSecondaryIndex { index_name: "rec_uuid-index".to_string(), range_key: "rec_uuid".to_string() },
        ],
    )
}

fn verify_schema(
    table: &str,
    schema: &TableSchema,
    expected_attrs: &[AttributeDefinition],
    expected_keys: &[KeySchemaElement],
) -> Result<(), TxManagerError> {
    let mut actual_attrs = schema.attribute_definitions.clone();
    let mut expected_attrs = expected_attrs.to_vec();
    actual_attrs.sort_by(|a, b| a.attribute_name.cmp(&b.attribute_name));
    expected_attrs.sort_by(|a, b| a.attribute_name.cmp(&b.attribute_name));
    if actual_attrs != expected_attrs {
        return Err(TxManagerError::BadTxTableAttributes(format!(
            "table {table} has unexpected attribute definitions"
        )));
    }

    let mut actual_keys = schema.key_schema.clone();
    let mut expected_keys = expected_keys.to_vec();
    actual_keys.sort_by(|a, b| a.attribute_name.cmp(&b.attribute_name));
    expected_keys.sort_by(|a, b| a.attribute_name.cmp(&b.attribute_name));
    if actual_keys != expected_keys {
        return Err(TxManagerError::BadTxTableKeySchema(format!("table {table} has an unexpected key schema")));
    }

    Ok(())
}

fn wait_until_active(store: &dyn RemoteStore, table: &str, poll_interval_ms: u64) -> Result<(), TxManagerError> {
    loop {
        if store.is_table_active(table)? {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(poll_interval_ms));
    }
}

#[allow(clippy::too_many_arguments)]
fn verify_or_create(
    store: &dyn RemoteStore,
    table: &str,
    attribute_definitions: Vec<AttributeDefinition>,
    key_schema: Vec<KeySchemaElement>,
    local_secondary_indexes: Vec<LocalSecondaryIndex>,
    config: &TxManagerConfig,
) -> Result<(), TxManagerError> {
    match store.describe_table(table) {
        Ok(schema) => {
            verify_schema(table, &schema, &attribute_definitions, &key_schema)?;
            log::debug!("auxiliary table {table} already exists with matching schema");
            Ok(())
        }
        Err(_) => {
            log::info!("creating auxiliary table {table}");
            store.create_table(
                table,
                attribute_definitions,
                key_schema,
                ProvisionedThroughput {
                    read_capacity_units: config.tx_table_read_capacity,
                    write_capacity_units: config.tx_table_write_capacity,
                },
                local_secondary_indexes,
            )?;
            wait_until_active(store, table, config.table_poll_interval_ms)?;
            log::info!("auxiliary table {table} is active");
            Ok(())
        }
    }
}

/// Ensures `tx-info` and `tx-data` (under whatever names `config` gives
/// them) exist with the expected schema, creating them if absent.
pub fn ensure_tx_tables(store: &dyn RemoteStore, config: &TxManagerConfig) -> Result<(), TxManagerError> {
    let (tx_info_attrs, tx_info_keys) = expected_tx_info_schema();
    verify_or_create(store, &config.tx_table_name, tx_info_attrs, tx_info_keys, Vec::new(), config)?;

    let (tx_data_attrs, tx_data_keys, tx_data_lsis) = expected_tx_data_schema();
    verify_or_create(store, &config.tx_data_table_name, tx_data_attrs, tx_data_keys, tx_data_lsis, config)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::mock::InMemoryStore;

    #[test]
    fn creates_missing_tables() {
        let store = InMemoryStore::new();
        let config = TxManagerConfig::default();
        ensure_tx_tables(&store, &config).expect("bootstrap");
        assert!(store.is_table_active(&config.tx_table_name).expect("active"));
        assert!(store.is_table_active(&config.tx_data_table_name).expect("active"));
    }

    #[test]
    fn accepts_already_correct_tables() {
        let store = InMemoryStore::new();
        let config = TxManagerConfig::default();
        ensure_tx_tables(&store, &config).expect("first bootstrap");
        ensure_tx_tables(&store, &config).expect("second bootstrap sees matching schema");
    }

    #[test]
    fn rejects_mismatched_key_schema() {
        let store = InMemoryStore::new();
        let config = TxManagerConfig::default();
        // A pre-existing table using the reserved name but a foreign schema.
        store.seed_table(&config.tx_table_name, "not_tx_uuid");
        let err = ensure_tx_tables(&store, &config).unwrap_err();
        assert!(matches!(err, TxManagerError::BadTxTableKeySchema(_)));
    }
}
