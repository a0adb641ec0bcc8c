#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::correctness,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    deprecated,
    unused,
    clippy::todo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::unreachable
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

//! # ddb-tx-manager
//!
//! A client-side transaction manager layered over a schemaless, single-item
//! conditional remote key-value store (of the DynamoDB family). It offers
//! callers the illusion of multi-item transactions across several tables,
//! built entirely out of the store's native single-item primitives:
//! conditional `put_item`/`update_item`/`delete_item` and atomic set-valued
//! attribute updates.
//!
//! ## Architecture
//!
//! - [`core::key`]: resolves a table's key schema into a typed key descriptor.
//! - [`core::lock`]: shared/exclusive advisory locks recorded on the item itself.
//! - [`core::wal`]: a write-ahead log of undo images, persisted in an auxiliary
//!   table so that a crashed client's work can be rolled back by anyone.
//! - [`core::transaction`]: the coordinator that ties the above together and
//!   exposes `get_item` / `put` / `update` / `delete` / `commit` / `rollback`.
//! - [`core::recovery`]: a sweeper that drives the rollback algorithm for
//!   transactions abandoned mid-flight.
//! - [`core::store`]: the `RemoteStore` trait describing the raw store client
//!   this crate is built against, plus an in-memory implementation for tests.
//!
//! ## Non-goals
//!
//! No serializable multi-item isolation in the strict ANSI sense, no deadlock
//! detector (deadlocks are broken by lock-wait timeouts), no durable queuing
//! of deferred writes, no cross-region coordination.

pub mod core;

pub use crate::core::common::config::TxManagerConfig;
pub use crate::core::common::error::TxManagerError;
pub use crate::core::common::value::{AttributeMap, AttributeValue};
pub use crate::core::recovery::sweeper::Sweeper;
pub use crate::core::store::traits::RemoteStore;
pub use crate::core::transaction::isolation::IsolationLevel;
pub use crate::core::transaction::item::TxItemHandle;
pub use crate::core::transaction::status::TxStatus;
pub use crate::core::transaction::tx::Tx;
