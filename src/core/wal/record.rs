//! The shape of a single write-ahead log record, stored as an item in the
//! `tx-data` auxiliary table. One record is appended per mutating operation
//! (`put`/`update`/`delete`) a transaction performs, before the mutation is
//! applied to the target table, and is used by [`crate::core::transaction`]
//! to drive rollback and by [`crate::core::recovery`] to drive crash
//! recovery.

use crate::core::common::ids::{LogUuid, RecUuid, TxUuid};
use crate::core::common::value::{AttributeMap, AttributeValue};
use chrono::{DateTime, Utc};

/// The operation a [`WalRecord`] undoes on rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalOperation {
    /// The target item had a prior image, carried in `data`; rollback
    /// restores it with a `put_item`.
    Put,
    /// The target item did not previously exist; rollback deletes it by
    /// key. `data` is always `None` for this variant.
    Delete,
}

impl WalOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// One write-ahead log entry: enough to undo a single mutation against a
/// single item.
#[derive(Debug, Clone)]
pub struct WalRecord {
    pub tx_uuid: TxUuid,
    pub log_uuid: LogUuid,
    pub rec_uuid: RecUuid,
    pub creation_date: DateTime<Utc>,
    pub table: String,
    pub key: AttributeMap,
    pub operation: WalOperation,
    /// The item's `ALL_OLD` image before this operation, when one existed.
    pub data: Option<AttributeMap>,
}

impl WalRecord {
    /// Serialises this record into the `tx-data` table's item shape: the
    /// `(tx_uuid, log_uuid)` key plus its carried fields.
    pub fn to_item(&self) -> Result<AttributeMap, crate::core::common::error::TxManagerError> {
        let mut item = AttributeMap::new();
        item.insert("tx_uuid".to_string(), AttributeValue::s(self.tx_uuid.to_string()));
        item.insert("log_uuid".to_string(), AttributeValue::s(self.log_uuid.to_string()));
        item.insert("rec_uuid".to_string(), AttributeValue::s(self.rec_uuid.to_string()));
        item.insert("creation_date".to_string(), AttributeValue::s(self.creation_date.to_rfc3339()));
        item.insert("table".to_string(), AttributeValue::s(self.table.clone()));
        item.insert("key".to_string(), AttributeValue::s(serde_json::to_string(&self.key)?));
        item.insert("operation".to_string(), AttributeValue::s(self.operation.as_str()));
        if let Some(data) = &self.data {
            item.insert("data".to_string(), AttributeValue::s(serde_json::to_string(data)?));
        }
        Ok(item)
    }

    /// Reconstructs a record from a `tx-data` item, the inverse of
    /// [`Self::to_item`].
    pub fn from_item(item: &AttributeMap) -> Result<Self, crate::core::common::error::TxManagerError> {
        use crate::core::common::error::TxManagerError;
        use std::str::FromStr;

        let get_s = |field: &str| -> Result<String, TxManagerError> {
            match item.get(field) {
                Some(AttributeValue::S(v)) => Ok(v.clone()),
                _ => Err(TxManagerError::Internal(format!("wal record missing string field {field}"))),
            }
        };

        let tx_uuid = TxUuid::from_str(&get_s("tx_uuid")?)
            .map_err(|e| TxManagerError::Internal(format!("bad tx_uuid in wal record: {e}")))?;
        let log_uuid = LogUuid::from_str(&get_s("log_uuid")?)
            .map_err(|e| TxManagerError::Internal(format!("bad log_uuid in wal record: {e}")))?;
        let rec_uuid = RecUuid::from_str(&get_s("rec_uuid")?)
            .map_err(|e| TxManagerError::Internal(format!("bad rec_uuid in wal record: {e}")))?;
        let creation_date = DateTime::parse_from_rfc3339(&get_s("creation_date")?)
            .map_err(|e| TxManagerError::Internal(format!("bad creation_date in wal record: {e}")))?
            .with_timezone(&Utc);
        let table = get_s("table")?;
        let key: AttributeMap = serde_json::from_str(&get_s("key")?)?;
        let operation = match get_s("operation")?.as_str() {
            "PUT" => WalOperation::Put,
            "DELETE" => WalOperation::Delete,
            other => return Err(TxManagerError::Internal(format!("unknown wal operation {other}"))),
        };
        let data = match item.get("data") {
            Some(AttributeValue::S(raw)) => Some(serde_json::from_str(raw)?),
            _ => None,
        };

        Ok(Self { tx_uuid, log_uuid, rec_uuid, creation_date, table, key, operation, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_item_encoding() {
        // A `Delete` record: the item was born in this transaction, so
        // there is no prior image to carry and rollback just deletes it.
        let record = WalRecord {
            tx_uuid: TxUuid::new(),
            log_uuid: LogUuid::new(),
            rec_uuid: RecUuid::new(),
            creation_date: Utc::now(),
            table: "accounts".to_string(),
            key: [("id".to_string(), AttributeValue::s("a"))].into_iter().collect(),
            operation: WalOperation::Delete,
            data: None,
        };
        let item = record.to_item().expect("encode");
        let back = WalRecord::from_item(&item).expect("decode");
        assert_eq!(back.tx_uuid, record.tx_uuid);
        assert_eq!(back.operation, record.operation);
        assert!(back.data.is_none());
    }

    #[test]
    fn record_preserves_all_old_image() {
        // A `Put` record: the item existed before this transaction touched
        // it, so rollback restores the carried `ALL_OLD` image.
        let mut data = AttributeMap::new();
        data.insert("bal".to_string(), AttributeValue::n(10));
        let record = WalRecord {
            tx_uuid: TxUuid::new(),
            log_uuid: LogUuid::new(),
            rec_uuid: RecUuid::new(),
            creation_date: Utc::now(),
            table: "accounts".to_string(),
            key: [("id".to_string(), AttributeValue::s("a"))].into_iter().collect(),
            operation: WalOperation::Put,
            data: Some(data.clone()),
        };
        let item = record.to_item().expect("encode");
        let back = WalRecord::from_item(&item).expect("decode");
        assert_eq!(back.data, Some(data));
    }
}
