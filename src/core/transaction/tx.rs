//! The transaction coordinator: owns a transaction's identity, brokers item
//! handles, and drives commit/rollback. Grounded on the teacher's
//! `TransactionManager`/`AcidTransactionManager` for the overall shape
//! (bootstrap once, hand out handles, reconcile on termination), reworked
//! around §4.D's exact bootstrap/commit/rollback procedure.

use crate::core::common::config::TxManagerConfig;
use crate::core::common::error::TxManagerError;
use crate::core::common::ids::{RecUuid, TxUuid};
use crate::core::common::value::{AttributeMap, AttributeValue};
use crate::core::key::resolver::KeyResolver;
use crate::core::lock::manager::LockManager;
use crate::core::store::traits::{Expected, ExpectedCondition, RemoteStore, UpdateAction};
use crate::core::transaction::bootstrap::ensure_tx_tables;
use crate::core::transaction::isolation::IsolationLevel;
use crate::core::transaction::item::TxItemHandle;
use crate::core::transaction::status::TxStatus;
use crate::core::wal::log::WalWriter;
use crate::core::wal::record::WalOperation;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

struct TrackedItem {
    table: String,
    key: AttributeMap,
}

/// A single client-side transaction against one or more tables of the same
/// underlying store.
pub struct Tx {
    tx_uuid: TxUuid,
    isolation_level: IsolationLevel,
    store: Arc<dyn RemoteStore>,
    key_resolver: KeyResolver,
    lock_manager: LockManager,
    wal: WalWriter,
    config: TxManagerConfig,
    status: Mutex<TxStatus>,
    items: Mutex<Vec<TrackedItem>>,
}

impl Tx {
    /// Bootstraps the auxiliary tables (creating them on first use) and
    /// inserts this transaction's `tx-info` row with `status=START`.
    pub fn new(
        tx_name: impl Into<String>,
        isolation_level: IsolationLevel,
        store: Arc<dyn RemoteStore>,
        config: TxManagerConfig,
    ) -> Result<Self, TxManagerError> {
        ensure_tx_tables(store.as_ref(), &config)?;

        let tx_uuid = TxUuid::new();
        let mut row = AttributeMap::new();
        row.insert("tx_uuid".to_string(), AttributeValue::s(tx_uuid.to_string()));
        row.insert("tx_name".to_string(), AttributeValue::s(tx_name.into()));
        row.insert("isolation_level".to_string(), AttributeValue::s(isolation_level.token()));
        row.insert("creation_date".to_string(), AttributeValue::s(Utc::now().to_rfc3339()));
        row.insert("status".to_string(), AttributeValue::s(TxStatus::Start.as_str()));

        let mut expected = Expected::new();
        expected.insert("tx_uuid".to_string(), ExpectedCondition::NotExists);
        store.put_item(&config.tx_table_name, row, Some(expected), false)?;
        log::info!("tx {tx_uuid} started ({})", isolation_level.token());

        Ok(Self {
            tx_uuid,
            isolation_level,
            key_resolver: KeyResolver::new(Arc::clone(&store)),
            lock_manager: LockManager::new(Arc::clone(&store)),
            wal: WalWriter::new(Arc::clone(&store), config.tx_data_table_name.clone()),
            store,
            config,
            status: Mutex::new(TxStatus::Start),
            items: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn store(&self) -> &dyn RemoteStore {
        self.store.as_ref()
    }

    pub(crate) fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub(crate) fn wal(&self) -> &WalWriter {
        &self.wal
    }

    pub(crate) fn config(&self) -> &TxManagerConfig {
        &self.config
    }

    #[must_use]
    pub fn tx_uuid(&self) -> TxUuid {
        self.tx_uuid
    }

    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    fn require_not_terminal(&self) -> Result<(), TxManagerError> {
        let status = *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if status.is_terminal() {
            return Err(TxManagerError::TransactionTerminated(self.tx_uuid.to_string()));
        }
        Ok(())
    }

    /// Transitions `tx-info.status` to `IN-FLIGHT` (a no-op once already
    /// there) and records `rec_uuid` in `tx-info.recs`.
    fn mark_in_flight_and_track_rec(&self, rec_uuid: RecUuid) -> Result<(), TxManagerError> {
        let mut updates = BTreeMap::new();
        updates.insert(
            "recs".to_string(),
            UpdateAction::Add(AttributeValue::SS([rec_uuid.to_string()].into_iter().collect())),
        );
        updates.insert("status".to_string(), UpdateAction::Put(AttributeValue::s(TxStatus::InFlight.as_str())));
        let mut expected = Expected::new();
        expected.insert("tx_uuid".to_string(), ExpectedCondition::Exists(AttributeValue::s(self.tx_uuid.to_string())));
        self.store.update_item(&self.config.tx_table_name, &self.tx_info_key(), updates, Some(expected), false)?;
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = TxStatus::InFlight;
        Ok(())
    }

    fn tx_info_key(&self) -> AttributeMap {
        [("tx_uuid".to_string(), AttributeValue::s(self.tx_uuid.to_string()))].into_iter().collect()
    }

    /// Resolves `(table, hash_value, range_value?)` into a tracked item
    /// handle, registering it with this transaction for lock release on
    /// commit/rollback.
    pub fn get_item(
        &self,
        table: &str,
        hash_value: AttributeValue,
        range_value: Option<AttributeValue>,
    ) -> Result<TxItemHandle, TxManagerError> {
        self.require_not_terminal()?;
        let key = self.key_resolver.resolve(table, hash_value, range_value)?;
        let rec_uuid = RecUuid::new();
        self.mark_in_flight_and_track_rec(rec_uuid)?;

        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(TrackedItem { table: table.to_string(), key: key.clone() });

        Ok(TxItemHandle::new(table.to_string(), key, rec_uuid))
    }

    /// Releases every tracked item's lock, then marks the transaction
    /// `COMMIT`. Live mutations are already visible; commit does not touch
    /// the WAL.
    pub fn commit(&self) -> Result<(), TxManagerError> {
        self.require_not_terminal()?;

        for tracked in self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter() {
            self.lock_manager.release(&tracked.table, &tracked.key, self.tx_uuid)?;
        }

        self.set_terminal_status(TxStatus::Commit)?;
        log::info!("tx {} committed", self.tx_uuid);
        Ok(())
    }

    /// Replays this transaction's WAL most-recent-first, undoing each
    /// mutation, releases every tracked item's lock, then marks the
    /// transaction `ROLLBACK`. Safe to call on a transaction a crashed
    /// process never explicitly terminated, and safe to call twice.
    pub fn rollback(&self) -> Result<(), TxManagerError> {
        {
            let status = *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if status == TxStatus::Rollback {
                return Ok(());
            }
            if status == TxStatus::Commit {
                return Err(TxManagerError::TransactionTerminated(self.tx_uuid.to_string()));
            }
        }

        for record in self.wal.records_for(self.tx_uuid)? {
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

        for tracked in self.items.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter() {
            self.lock_manager.release(&tracked.table, &tracked.key, self.tx_uuid)?;
        }

        self.set_terminal_status(TxStatus::Rollback)?;
        log::info!("tx {} rolled back", self.tx_uuid);
        Ok(())
    }

    fn set_terminal_status(&self, new_status: TxStatus) -> Result<(), TxManagerError> {
        let mut updates = BTreeMap::new();
        updates.insert("status".to_string(), UpdateAction::Put(AttributeValue::s(new_status.as_str())));
        let mut expected = Expected::new();
        expected.insert("tx_uuid".to_string(), ExpectedCondition::Exists(AttributeValue::s(self.tx_uuid.to_string())));
        self.store
            .update_item(&self.config.tx_table_name, &self.tx_info_key(), updates, Some(expected), false)
            .map_err(|_| {
                log::error!("tx {} failed to transition to {new_status:?}", self.tx_uuid);
                TxManagerError::StatusTransitionFailed {
                    tx_uuid: self.tx_uuid.to_string(),
                    from: "IN-FLIGHT".to_string(),
                    to: new_status.as_str().to_string(),
                }
            })?;
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = new_status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::mock::InMemoryStore;
    use proptest::prelude::*;

    fn store_with_accounts() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store
    }

    #[test]
    fn bootstraps_tx_info_row_with_start_status() {
        let store = store_with_accounts();
        let tx = Tx::new("t1", IsolationLevel::ReadCommitted, store.clone(), TxManagerConfig::default()).expect("new");
        let row = store
            .read_item("tx-info", &[("tx_uuid".to_string(), AttributeValue::s(tx.tx_uuid().to_string()))].into_iter().collect())
            .expect("tx-info row exists");
        assert_eq!(row.get("status"), Some(&AttributeValue::s("START")));
    }

    #[test]
    fn put_over_nonexistent_item_then_commit_leaves_it_unlocked() {
        let store = store_with_accounts();
        let tx = Tx::new("t1", IsolationLevel::ReadCommitted, store.clone(), TxManagerConfig::default()).expect("new");
        let mut handle = tx.get_item("accounts", AttributeValue::s("a"), None).expect("get_item");
        handle
            .put(&tx, [("bal".to_string(), AttributeValue::n(10))].into_iter().collect(), None)
            .expect("put");
        tx.commit().expect("commit");

        let item = store
            .read_item("accounts", &[("id".to_string(), AttributeValue::s("a"))].into_iter().collect())
            .expect("item exists");
        assert_eq!(item.get("bal"), Some(&AttributeValue::n(10)));
        assert!(item.get("tx_manager_x_lock").is_none());
        assert!(item.get("tx_manager_locks").is_none());
    }

    #[test]
    fn update_then_rollback_restores_prior_value() {
        let store = store_with_accounts();
        store.seed_item(
            "accounts",
            [("id".to_string(), AttributeValue::s("a")), ("bal".to_string(), AttributeValue::n(10))]
                .into_iter()
                .collect(),
        );
        let tx = Tx::new("t2", IsolationLevel::ReadCommitted, store.clone(), TxManagerConfig::default()).expect("new");
        let mut handle = tx.get_item("accounts", AttributeValue::s("a"), None).expect("get_item");
        let mut updates = BTreeMap::new();
        updates.insert("bal".to_string(), UpdateAction::Put(AttributeValue::n(20)));
        handle.update(&tx, updates, None).expect("update");
        tx.rollback().expect("rollback");

        let item = store
            .read_item("accounts", &[("id".to_string(), AttributeValue::s("a"))].into_iter().collect())
            .expect("item exists");
        assert_eq!(item.get("bal"), Some(&AttributeValue::n(10)));
        assert!(item.get("tx_manager_x_lock").is_none());
    }

    #[test]
    fn mutating_a_terminated_transaction_is_rejected() {
        let store = store_with_accounts();
        let tx = Tx::new("t3", IsolationLevel::ReadCommitted, store, TxManagerConfig::default()).expect("new");
        tx.commit().expect("commit");
        let err = tx.get_item("accounts", AttributeValue::s("a"), None).unwrap_err();
        assert!(matches!(err, TxManagerError::TransactionTerminated(_)));
    }

    proptest! {
        /// For any sequence of puts over a fresh item followed by rollback,
        /// the item ends up exactly as it started: absent.
        #[test]
        fn rollback_restores_a_never_existed_item_to_absent(
            values in prop::collection::vec(0i64..1000, 1..10)
        ) {
            let store = store_with_accounts();
            let tx = Tx::new("prop", IsolationLevel::ReadCommitted, store.clone(), TxManagerConfig::default()).expect("new");
            let mut handle = tx.get_item("accounts", AttributeValue::s("p"), None).expect("get_item");

            for v in values {
                let item: AttributeMap = [("bal".to_string(), AttributeValue::n(v))].into_iter().collect();
                // Each put after the first is an overwrite of the same key;
                // either path appends a WAL record whose inverse restores
                // the prior state. A failure here would mask the very
                // regression this property exists to catch, so propagate it.
                handle.put(&tx, item, None).expect("put");
            }
            tx.rollback().expect("rollback");

            let row = store.read_item("accounts", &[("id".to_string(), AttributeValue::s("p"))].into_iter().collect());
            prop_assert!(row.is_none());
        }
    }
}
