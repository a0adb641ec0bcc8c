pub mod config;
pub mod error;
pub mod ids;
pub mod value;

pub use config::TxManagerConfig;
pub use error::TxManagerError;
pub use ids::{LogUuid, RecUuid, TxUuid};
pub use value::{AttributeMap, AttributeValue};
