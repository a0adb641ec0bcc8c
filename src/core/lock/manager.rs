//! The item lock manager: advisory S/X locks recorded as reserved
//! attributes on the locked item itself. Grounded on the teacher's
//! `lock_manager.rs` for the compatibility/retry shape, and on the original
//! source's `TxItem.lock()`/`wait_lock()`/`unlock()` for the exact
//! attribute protocol this reimplements: a consistent pre-read of
//! `tx_manager_locks` to evaluate compatibility, followed by a conditional
//! `update_item` that actually grants the lock.

use crate::core::common::error::TxManagerError;
use crate::core::common::ids::TxUuid;
use crate::core::common::value::{AttributeMap, AttributeValue};
use crate::core::lock::types::{LockEntry, LockType, LOCKS_ATTR, X_LOCK_ATTR};
use crate::core::store::traits::{AttributeUpdates, Expected, ExpectedCondition, RemoteStore, UpdateAction};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Acquires and releases item-level S/X locks against a [`RemoteStore`].
pub struct LockManager {
    store: Arc<dyn RemoteStore>,
}

fn parse_entries(locks_attr: Option<&AttributeValue>) -> Result<Vec<LockEntry>, TxManagerError> {
    match locks_attr {
        Some(AttributeValue::SS(raw_entries)) => {
            raw_entries.iter().map(|raw| LockEntry::from_json(raw)).collect()
        }
        _ => Ok(Vec::new()),
    }
}

impl LockManager {
    #[must_use]
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Attempts to acquire `lock_type` on `table`/`key` for `tx_uuid`, once.
    /// Returns `Err(NotExistingItem)` if the item itself does not exist, or
    /// `Err(ConditionalCheckFailed)` if it exists but is held incompatibly
    /// by another transaction. Callers that want to retry the latter should
    /// use [`Self::wait_lock`] instead.
    pub fn try_acquire(
        &self,
        table: &str,
        key: &AttributeMap,
        tx_uuid: TxUuid,
        lock_type: LockType,
    ) -> Result<(), TxManagerError> {
        let projection = [LOCKS_ATTR.to_string()];
        let current = self
            .store
            .get_item(table, key, Some(&projection), true)?
            .ok_or_else(|| TxManagerError::NotExistingItem { table: table.to_string() })?;

        let tx_str = tx_uuid.to_string();
        let others: Vec<LockEntry> = parse_entries(current.get(LOCKS_ATTR))?
            .into_iter()
            .filter(|entry| entry.tx_uuid != tx_str)
            .collect();

        match lock_type {
            LockType::Shared => {
                if others.iter().any(|entry| matches!(entry.lock_type(), Ok(LockType::Exclusive))) {
                    return Err(TxManagerError::ConditionalCheckFailed(format!(
                        "item in {table} is exclusively locked by another transaction"
                    )));
                }
                let entry = LockEntry::new(tx_str, LockType::Shared).to_json()?;
                let mut updates = AttributeUpdates::new();
                updates.insert(LOCKS_ATTR.to_string(), UpdateAction::Add(AttributeValue::SS([entry].into_iter().collect())));
                let mut expected = Expected::new();
                expected.insert(X_LOCK_ATTR.to_string(), ExpectedCondition::NotExists);
                self.store.update_item(table, key, updates, Some(expected), false)?;
                Ok(())
            }
            LockType::Exclusive => {
                if !others.is_empty() {
                    return Err(TxManagerError::ConditionalCheckFailed(format!(
                        "item in {table} is already locked by another transaction"
                    )));
                }

                let mut expected = Expected::new();
                expected.insert(X_LOCK_ATTR.to_string(), ExpectedCondition::NotExists);
                let mut put_x = AttributeUpdates::new();
                put_x.insert(X_LOCK_ATTR.to_string(), UpdateAction::Put(AttributeValue::s(tx_str.clone())));
                self.store.update_item(table, key, put_x, Some(expected), false)?;

                let x_entry = LockEntry::new(tx_str.clone(), LockType::Exclusive).to_json()?;
                let mut add_x = AttributeUpdates::new();
                add_x.insert(LOCKS_ATTR.to_string(), UpdateAction::Add(AttributeValue::SS([x_entry].into_iter().collect())));
                self.store.update_item(table, key, add_x, None, false)?;

                // Cleans up a prior S entry this transaction may have left
                // behind from an S-to-X upgrade.
                let s_entry = LockEntry::new(tx_str, LockType::Shared).to_json()?;
                let mut del_s = AttributeUpdates::new();
                del_s.insert(LOCKS_ATTR.to_string(), UpdateAction::Delete(Some(AttributeValue::SS([s_entry].into_iter().collect()))));
                self.store.update_item(table, key, del_s, None, false)?;

                Ok(())
            }
        }
    }

    /// Retries [`Self::try_acquire`] at `interval_ms` intervals until it
    /// succeeds or `max_wait_ms` elapses, matching the original source's
    /// `wait_lock`. A missing item (`NotExistingItem`) is not retried.
    pub fn wait_lock(
        &self,
        table: &str,
        key: &AttributeMap,
        rec_uuid: &str,
        tx_uuid: TxUuid,
        lock_type: LockType,
        interval_ms: u64,
        max_wait_ms: u64,
    ) -> Result<(), TxManagerError> {
        let mut waited_ms = 0u64;
        loop {
            match self.try_acquire(table, key, tx_uuid, lock_type) {
                Ok(()) => {
                    if waited_ms > 0 {
                        log::debug!("tx {tx_uuid} acquired {lock_type:?} on {table}/{rec_uuid} after {waited_ms}ms");
                    }
                    return Ok(());
                }
                Err(TxManagerError::ConditionalCheckFailed(_)) => {
                    if waited_ms >= max_wait_ms {
                        log::warn!("tx {tx_uuid} timed out waiting for {lock_type:?} on {table}/{rec_uuid} after {waited_ms}ms");
                        return Err(TxManagerError::LockWaitTimeout {
                            table: table.to_string(),
                            rec_uuid: rec_uuid.to_string(),
                            waited_ms,
                        });
                    }
                    log::trace!("tx {tx_uuid} retrying {lock_type:?} on {table}/{rec_uuid}, waited {waited_ms}ms so far");
                    thread::sleep(Duration::from_millis(interval_ms));
                    waited_ms += interval_ms;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Releases `tx_uuid`'s lock(s) on `table`/`key`. Idempotent: releasing
    /// a lock the caller does not hold, or calling this on an item that no
    /// longer exists, is a no-op, matching the original source's
    /// `unlock()`.
    pub fn release(&self, table: &str, key: &AttributeMap, tx_uuid: TxUuid) -> Result<(), TxManagerError> {
        if self.store.get_item(table, key, Some(&[LOCKS_ATTR.to_string()]), true)?.is_none() {
            return Ok(());
        }

        let tx_str = tx_uuid.to_string();

        let mut expected = Expected::new();
        expected.insert(X_LOCK_ATTR.to_string(), ExpectedCondition::Exists(AttributeValue::s(tx_str.clone())));
        let mut del_x = AttributeUpdates::new();
        del_x.insert(X_LOCK_ATTR.to_string(), UpdateAction::Delete(None));
        match self.store.update_item(table, key, del_x, Some(expected), false) {
            Ok(_) | Err(TxManagerError::ConditionalCheckFailed(_)) => {}
            Err(other) => return Err(other),
        }

        let x_entry = LockEntry::new(tx_str.clone(), LockType::Exclusive).to_json()?;
        let s_entry = LockEntry::new(tx_str, LockType::Shared).to_json()?;
        let removal: BTreeSet<String> = [x_entry, s_entry].into_iter().collect();
        let mut del_locks = AttributeUpdates::new();
        del_locks.insert(LOCKS_ATTR.to_string(), UpdateAction::Delete(Some(AttributeValue::SS(removal))));
        match self.store.update_item(table, key, del_locks, None, false) {
            Ok(_) | Err(TxManagerError::ConditionalCheckFailed(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::mock::InMemoryStore;
    use proptest::prelude::*;

    fn key(id: &str) -> AttributeMap {
        [("id".to_string(), AttributeValue::s(id))].into_iter().collect()
    }

    #[test]
    fn two_shared_locks_are_compatible() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store);

        mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Shared).expect("first shared");
        mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Shared).expect("second shared");
    }

    #[test]
    fn exclusive_lock_blocks_shared_lock() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store);

        mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Exclusive).expect("exclusive");
        let err = mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Shared).unwrap_err();
        assert!(matches!(err, TxManagerError::ConditionalCheckFailed(_)));
    }

    #[test]
    fn shared_lock_blocks_exclusive_upgrade_by_other_tx() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store);

        mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Shared).expect("shared");
        let err = mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Exclusive).unwrap_err();
        assert!(matches!(err, TxManagerError::ConditionalCheckFailed(_)));
    }

    #[test]
    fn acquiring_a_lock_on_a_missing_item_fails_with_not_existing_item() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        let mgr = LockManager::new(store);

        let err = mgr.try_acquire("accounts", &key("missing"), TxUuid::new(), LockType::Shared).unwrap_err();
        assert!(matches!(err, TxManagerError::NotExistingItem { .. }));
    }

    #[test]
    fn release_then_reacquire_exclusive_succeeds() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store);
        let holder = TxUuid::new();

        mgr.try_acquire("accounts", &key("a"), holder, LockType::Exclusive).expect("exclusive");
        mgr.release("accounts", &key("a"), holder).expect("release");
        mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Exclusive).expect("reacquire");
    }

    #[test]
    fn wait_lock_times_out_when_never_released() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store);

        mgr.try_acquire("accounts", &key("a"), TxUuid::new(), LockType::Exclusive).expect("exclusive");
        let err = mgr
            .wait_lock("accounts", &key("a"), "rec-1", TxUuid::new(), LockType::Shared, 5, 15)
            .unwrap_err();
        assert!(matches!(err, TxManagerError::LockWaitTimeout { .. }));
    }

    #[test]
    fn release_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store);
        let holder = TxUuid::new();

        mgr.try_acquire("accounts", &key("a"), holder, LockType::Shared).expect("shared");
        mgr.release("accounts", &key("a"), holder).expect("first release");
        mgr.release("accounts", &key("a"), holder).expect("second release is a no-op");
    }

    #[test]
    fn s_to_x_upgrade_leaves_no_stray_shared_entry() {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item("accounts", key("a"));
        let mgr = LockManager::new(store.clone());
        let holder = TxUuid::new();

        mgr.try_acquire("accounts", &key("a"), holder, LockType::Shared).expect("shared");
        mgr.try_acquire("accounts", &key("a"), holder, LockType::Exclusive).expect("upgrade");

        let item = store.read_item("accounts", &key("a")).expect("item exists");
        let entries = parse_entries(item.get(LOCKS_ATTR)).expect("parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].lock_type().expect("parse"), LockType::Exclusive);
    }

    proptest! {
        /// For any interleaving of S/X requests from up to 5 transactions
        /// against one item, at most one of them ever holds X at a time,
        /// and an X holder excludes every other grant.
        #[test]
        fn lock_compatibility_matrix_holds_under_random_interleavings(
            requests in prop::collection::vec((0usize..5, any::<bool>()), 1..40)
        ) {
            let store = Arc::new(InMemoryStore::new());
            store.seed_table("accounts", "id");
            store.seed_item("accounts", key("a"));
            let mgr = LockManager::new(Arc::clone(&store) as Arc<dyn RemoteStore>);
            let txs: Vec<TxUuid> = (0..5).map(|_| TxUuid::new()).collect();
            let mut granted: BTreeSet<usize> = BTreeSet::new();
            let mut x_holder: Option<usize> = None;

            for (idx, want_exclusive) in requests {
                let lock_type = if want_exclusive { LockType::Exclusive } else { LockType::Shared };
                let result = mgr.try_acquire("accounts", &key("a"), txs[idx], lock_type);

                match result {
                    Ok(()) => {
                        if want_exclusive {
                            // Granting X must mean no one else held anything.
                            prop_assert!(x_holder.is_none() || x_holder == Some(idx));
                            prop_assert!(granted.iter().all(|&g| g == idx));
                            x_holder = Some(idx);
                        } else {
                            prop_assert!(x_holder.is_none() || x_holder == Some(idx));
                        }
                        granted.insert(idx);
                    }
                    Err(TxManagerError::ConditionalCheckFailed(_)) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {other}"),
                }
            }

            // Release everyone and confirm the item ends up unlocked.
            for tx in &txs {
                mgr.release("accounts", &key("a"), *tx).expect("release");
            }
            let item = store.read_item("accounts", &key("a")).expect("item exists");
            prop_assert!(item.get(X_LOCK_ATTR).is_none());
            let entries = parse_entries(item.get(LOCKS_ATTR)).expect("parse");
            prop_assert!(entries.is_empty());
        }
    }
}
