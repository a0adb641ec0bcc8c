//! A handle to a single item participating in a transaction.
//!
//! Per the design notes, this holds no back pointer to its owning
//! [`crate::core::transaction::tx::Tx`] — each operation borrows the
//! transaction for the duration of the call instead, which sidesteps the
//! reference cycle the original source's object graph has.

use crate::core::common::error::TxManagerError;
use crate::core::common::ids::RecUuid;
use crate::core::common::value::{AttributeMap, AttributeValue};
use crate::core::lock::types::{LockEntry, LockType, LOCKS_ATTR, X_LOCK_ATTR};
use crate::core::store::traits::{AttributeUpdates, Expected, ExpectedCondition};
use crate::core::transaction::tx::Tx;
use crate::core::wal::record::WalOperation;

/// The item handle's client-cached view of its own lock state. Never
/// downgrades: once `Exclusive` is observed, later `Shared` requests are
/// satisfied from this cache without another round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockState {
    None,
    Shared,
    Exclusive,
}

impl LockState {
    fn satisfies(self, requested: LockType) -> bool {
        match requested {
            LockType::Shared => self >= Self::Shared,
            LockType::Exclusive => self >= Self::Exclusive,
        }
    }

    fn from_lock_type(lock_type: LockType) -> Self {
        match lock_type {
            LockType::Shared => Self::Shared,
            LockType::Exclusive => Self::Exclusive,
        }
    }
}

/// A `(table, hash_value, range_value?)` resolved into a key, tracked for
/// the lifetime of one transaction.
#[derive(Debug)]
pub struct TxItemHandle {
    pub(crate) table: String,
    pub(crate) key: AttributeMap,
    pub(crate) rec_uuid: RecUuid,
    lock_state: LockState,
}

fn merge_reserved_attrs(mut item: AttributeMap, key: &AttributeMap, lock_entry: LockEntry) -> Result<AttributeMap, TxManagerError> {
    for (name, value) in key {
        item.insert(name.clone(), value.clone());
    }
    item.insert(X_LOCK_ATTR.to_string(), AttributeValue::s(lock_entry.tx_uuid.clone()));
    item.insert(LOCKS_ATTR.to_string(), AttributeValue::SS([lock_entry.to_json()?].into_iter().collect()));
    Ok(item)
}

fn with_x_lock_condition(mut expected: Expected, tx_uuid: &str) -> Expected {
    expected.insert(X_LOCK_ATTR.to_string(), ExpectedCondition::Exists(AttributeValue::s(tx_uuid.to_string())));
    expected
}

impl TxItemHandle {
    pub(crate) fn new(table: String, key: AttributeMap, rec_uuid: RecUuid) -> Self {
        Self { table, key, rec_uuid, lock_state: LockState::None }
    }

    fn acquire(&mut self, tx: &Tx, lock_type: LockType) -> Result<(), TxManagerError> {
        if self.lock_state.satisfies(lock_type) {
            return Ok(());
        }
        tx.lock_manager().wait_lock(
            &self.table,
            &self.key,
            &self.rec_uuid.to_string(),
            tx.tx_uuid(),
            lock_type,
            tx.config().lock_wait_interval_ms,
            tx.config().lock_wait_max_ms,
        )?;
        if LockState::from_lock_type(lock_type) > self.lock_state {
            self.lock_state = LockState::from_lock_type(lock_type);
        }
        Ok(())
    }

    /// Consistent read of the target item. Acquires a lock first, per
    /// `tx`'s isolation level: `ReadUncommitted` skips locking, `FullLock`
    /// upgrades to exclusive, and the default takes a shared lock.
    pub fn get(&mut self, tx: &Tx, projection: Option<&[String]>) -> Result<AttributeMap, TxManagerError> {
        let level = tx.isolation_level();
        if level.reads_take_lock() {
            let lock_type = if level.reads_require_exclusive() { LockType::Exclusive } else { LockType::Shared };
            self.acquire(tx, lock_type)?;
        }
        tx.store()
            .get_item(&self.table, &self.key, projection, true)?
            .ok_or_else(|| TxManagerError::NotExistingItem { table: self.table.clone() })
    }

    /// Writes `item`, replacing any existing value at this handle's key.
    /// Internally branches on whether the item already exists: an absent
    /// item is born locked via a conditional insert; an existing one is
    /// overwritten under the exclusive lock acquired above.
    pub fn put(&mut self, tx: &Tx, item: AttributeMap, expected: Option<Expected>) -> Result<Option<AttributeMap>, TxManagerError> {
        match self.acquire(tx, LockType::Exclusive) {
            Ok(()) => {
                let tx_uuid = tx.tx_uuid().to_string();
                let lock_entry = LockEntry::new(tx_uuid.clone(), LockType::Exclusive);
                let final_item = merge_reserved_attrs(item, &self.key, lock_entry)?;
                let effective_expected = with_x_lock_condition(expected.unwrap_or_default(), &tx_uuid);
                let old_image = tx.store().put_item(&self.table, final_item, Some(effective_expected), true)?;
                tx.wal().append(tx.tx_uuid(), &self.table, self.key.clone(), WalOperation::Put, old_image.clone())?;
                Ok(old_image)
            }
            Err(TxManagerError::NotExistingItem { .. }) => {
                let tx_uuid = tx.tx_uuid().to_string();
                let lock_entry = LockEntry::new(tx_uuid, LockType::Exclusive);
                let final_item = merge_reserved_attrs(item, &self.key, lock_entry)?;
                let mut insert_expected = expected.unwrap_or_default();
                for name in self.key.keys() {
                    insert_expected.insert(name.clone(), ExpectedCondition::NotExists);
                }
                tx.store().put_item(&self.table, final_item, Some(insert_expected), true)?;
                tx.wal().append(tx.tx_uuid(), &self.table, self.key.clone(), WalOperation::Delete, None)?;
                self.lock_state = LockState::Exclusive;
                Ok(None)
            }
            Err(other) => Err(other),
        }
    }

    /// Applies `updates` to an existing item. Key attributes are stripped
    /// from `updates` first, since keys cannot be updated in place.
    pub fn update(
        &mut self,
        tx: &Tx,
        mut updates: AttributeUpdates,
        expected: Option<Expected>,
    ) -> Result<Option<AttributeMap>, TxManagerError> {
        self.acquire(tx, LockType::Exclusive)?;
        for name in self.key.keys() {
            updates.remove(name);
        }
        let tx_uuid = tx.tx_uuid().to_string();
        let effective_expected = with_x_lock_condition(expected.unwrap_or_default(), &tx_uuid);
        let old_image = tx.store().update_item(&self.table, &self.key, updates, Some(effective_expected), true)?;
        tx.wal().append(tx.tx_uuid(), &self.table, self.key.clone(), WalOperation::Put, old_image.clone())?;
        Ok(old_image)
    }

    /// Deletes the target item.
    pub fn delete(&mut self, tx: &Tx, expected: Option<Expected>) -> Result<Option<AttributeMap>, TxManagerError> {
        self.acquire(tx, LockType::Exclusive)?;
        let tx_uuid = tx.tx_uuid().to_string();
        let effective_expected = with_x_lock_condition(expected.unwrap_or_default(), &tx_uuid);
        let old_image = tx.store().delete_item(&self.table, &self.key, Some(effective_expected), true)?;
        tx.wal().append(tx.tx_uuid(), &self.table, self.key.clone(), WalOperation::Put, old_image.clone())?;
        Ok(old_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::config::TxManagerConfig;
    use crate::core::store::mock::InMemoryStore;
    use crate::core::store::traits::ExpectedCondition;
    use crate::core::transaction::isolation::IsolationLevel;
    use std::sync::Arc;

    fn store_with_accounts() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.seed_table("accounts", "id");
        store.seed_item(
            "accounts",
            [("id".to_string(), AttributeValue::s("a")), ("bal".to_string(), AttributeValue::n(10))]
                .into_iter()
                .collect(),
        );
        store
    }

    #[test]
    fn two_shared_readers_both_succeed_then_exclusive_waits_for_release() {
        let store = store_with_accounts();
        let mut config = TxManagerConfig::default();
        config.lock_wait_interval_ms = 5;
        config.lock_wait_max_ms = 15;

        let tx_a = Tx::new("reader-a", IsolationLevel::ReadCommitted, store.clone(), config.clone()).expect("new a");
        let tx_b = Tx::new("reader-b", IsolationLevel::ReadCommitted, store.clone(), config.clone()).expect("new b");
        let mut handle_a = tx_a.get_item("accounts", AttributeValue::s("a"), None).expect("get a");
        let mut handle_b = tx_b.get_item("accounts", AttributeValue::s("a"), None).expect("get b");

        handle_a.get(&tx_a, None).expect("reader a takes S");
        handle_b.get(&tx_b, None).expect("reader b also takes S");

        let tx_c = Tx::new("writer-c", IsolationLevel::FullLock, store.clone(), config).expect("new c");
        let mut handle_c = tx_c.get_item("accounts", AttributeValue::s("a"), None).expect("get c");
        let err = handle_c.get(&tx_c, None).unwrap_err();
        assert!(matches!(err, TxManagerError::LockWaitTimeout { .. }));

        tx_a.commit().expect("commit a");
        tx_b.commit().expect("commit b");

        // Once both readers release, the exclusive request succeeds.
        handle_c.get(&tx_c, None).expect("writer now gets X");
        tx_c.commit().expect("commit c");
    }

    #[test]
    fn put_over_existing_item_merges_caller_expected_with_x_lock_condition() {
        let store = store_with_accounts();
        let tx = Tx::new("t6", IsolationLevel::ReadCommitted, store.clone(), TxManagerConfig::default()).expect("new");
        let mut handle = tx.get_item("accounts", AttributeValue::s("a"), None).expect("get_item");

        let mut expected = Expected::new();
        expected.insert("bal".to_string(), ExpectedCondition::Exists(AttributeValue::n(10)));
        let old = handle
            .put(&tx, [("bal".to_string(), AttributeValue::n(99))].into_iter().collect(), Some(expected))
            .expect("put respecting caller's expected condition");
        assert_eq!(old.and_then(|m| m.get("bal").cloned()), Some(AttributeValue::n(10)));
        tx.commit().expect("commit");

        let row = store
            .read_item("accounts", &[("id".to_string(), AttributeValue::s("a"))].into_iter().collect())
            .expect("item exists");
        assert_eq!(row.get("bal"), Some(&AttributeValue::n(99)));
    }

    #[test]
    fn put_over_existing_item_fails_when_caller_expected_is_violated() {
        let store = store_with_accounts();
        let tx = Tx::new("t7", IsolationLevel::ReadCommitted, store, TxManagerConfig::default()).expect("new");
        let mut handle = tx.get_item("accounts", AttributeValue::s("a"), None).expect("get_item");

        let mut expected = Expected::new();
        expected.insert("bal".to_string(), ExpectedCondition::Exists(AttributeValue::n(999)));
        let err = handle
            .put(&tx, [("bal".to_string(), AttributeValue::n(1))].into_iter().collect(), Some(expected))
            .unwrap_err();
        assert!(matches!(err, TxManagerError::ConditionalCheckFailed(_)));
    }
}
