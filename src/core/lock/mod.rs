pub mod manager;
pub mod types;

pub use manager::LockManager;
pub use types::{LockEntry, LockType};
