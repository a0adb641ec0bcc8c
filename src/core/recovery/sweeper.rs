//! A crash-recovery sweep over `tx-info`.
//!
//! The base protocol calls this out as "out of scope for implementation, in
//! scope for the protocol" — but since the WAL and `tx-info.status` are
//! both durable by construction, the same rollback algorithm
//! [`crate::core::transaction::tx::Tx::rollback`] uses is all a sweeper
//! needs; it only has to find the abandoned transactions first. Grounded on
//! the teacher's recovery module for the "scan, filter by age, replay"
//! shape, adapted from page-level ARIES redo/undo to this WAL's per-item
//! records.

use crate::core::common::config::TxManagerConfig;
use crate::core::common::error::TxManagerError;
use crate::core::common::ids::TxUuid;
use crate::core::common::value::AttributeMap;
use crate::core::lock::manager::LockManager;
use crate::core::store::traits::{Expected, ExpectedCondition, RemoteStore, UpdateAction};
use crate::core::transaction::status::TxStatus;
use crate::core::wal::log::WalWriter;
use crate::core::wal::record::WalOperation;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap as StdBTreeMap;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

/// Finds transactions abandoned mid-flight and rolls them back.
pub struct Sweeper {
    store: Arc<dyn RemoteStore>,
    lock_manager: LockManager,
    config: TxManagerConfig,
}

fn get_s(item: &AttributeMap, field: &str) -> Result<String, TxManagerError> {
    use crate::core::common::value::AttributeValue;
    match item.get(field) {
        Some(AttributeValue::S(v)) => Ok(v.clone()),
        _ => Err(TxManagerError::Internal(format!("tx-info row missing string field {field}"))),
    }
}

impl Sweeper {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>, config: TxManagerConfig) -> Self {
        let lock_manager = LockManager::new(Arc::clone(&store));
        Self { store, lock_manager, config }
    }

    /// Scans `tx-info` for rows with `status ∈ {START, IN-FLIGHT}` whose
    /// `creation_date` is older than `older_than`, rolls each back, and
    /// returns the set of transactions it recovered.
    pub fn sweep_once(&self, older_than: DateTime<Utc>) -> Result<Vec<TxUuid>, TxManagerError> {
        let rows = self.store.scan_table(&self.config.tx_table_name)?;
        let mut recovered = Vec::new();

        for row in rows {
            let status = TxStatus::from_str(&get_s(&row, "status")?)?;
            if status.is_terminal() {
                continue;
            }
            let creation_date = DateTime::parse_from_rfc3339(&get_s(&row, "creation_date")?)
                .map_err(|e| TxManagerError::Internal(format!("bad creation_date in tx-info row: {e}")))?
                .with_timezone(&Utc);
            if creation_date >= older_than {
                continue;
            }
            let tx_uuid = TxUuid::from_str(&get_s(&row, "tx_uuid")?)
                .map_err(|e| TxManagerError::Internal(format!("bad tx_uuid in tx-info row: {e}")))?;

            log::warn!("sweeping abandoned transaction {tx_uuid} (status={status:?}, created {creation_date})");
            self.recover_one(tx_uuid)?;
            recovered.push(tx_uuid);
        }

        if !recovered.is_empty() {
            log::info!("sweep recovered {} abandoned transaction(s)", recovered.len());
        }
        Ok(recovered)
    }

    /// Replays `tx_uuid`'s WAL, releases the locks it left behind, and sets
    /// `status=ROLLBACK`. Idempotent, like [`crate::core::transaction::tx::Tx::rollback`].
    fn recover_one(&self, tx_uuid: TxUuid) -> Result<(), TxManagerError> {
        let wal = WalWriter::new(Arc::clone(&self.store), self.config.tx_data_table_name.clone());
        let records = wal.records_for(tx_uuid)?;

        let mut touched = BTreeSet::new();
        for record in &records {
            touched.insert((record.table.clone(), serde_json::to_string(&record.key)?));
        }

        for record in records {
            match record.operation {
                WalOperation::Put => {
                    let image = record.data.ok_or_else(|| {
                        TxManagerError::Internal(format!("PUT wal record for {} missing its old image", record.table))
                    })?;
                    self.store.put_item(&record.table, image, None, false)?;
                }
                WalOperation::Delete => {
                    self.store.delete_item(&record.table, &record.key, None, false)?;
                }
            }
        }

        for (table, raw_key) in touched {
            let key: AttributeMap = serde_json::from_str(&raw_key)?;
            self.lock_manager.release(&table, &key, tx_uuid)?;
        }

        let mut updates = StdBTreeMap::new();
        updates.insert(
            "status".to_string(),
            UpdateAction::Put(crate::core::common::value::AttributeValue::s(TxStatus::Rollback.as_str())),
        );
        let mut expected = Expected::new();
        expected.insert(
            "tx_uuid".to_string(),
            ExpectedCondition::Exists(crate::core::common::value::AttributeValue::s(tx_uuid.to_string())),
        );
        let key: AttributeMap =
            [("tx_uuid".to_string(), crate::core::common::value::AttributeValue::s(tx_uuid.to_string()))].into_iter().collect();
        self.store
            .update_item(&self.config.tx_table_name, &key, updates, Some(expected), false)
            .map_err(|_| TxManagerError::StatusTransitionFailed {
                tx_uuid: tx_uuid.to_string(),
                from: "IN-FLIGHT".to_string(),
                to: TxStatus::Rollback.as_str().to_string(),
            })?;

        Ok(())
    }
}
