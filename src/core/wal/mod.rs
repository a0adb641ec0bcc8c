pub mod log;
pub mod record;

pub use log::WalWriter;
pub use record::{WalOperation, WalRecord};
