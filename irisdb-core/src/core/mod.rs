pub mod config;
pub mod errors;
pub mod types;

pub use config::IndexConfig;
pub use errors::{ErrorCode, IrisError, Result};
pub use types::{ExternalId, InternalId};
