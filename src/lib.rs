pub mod config;
pub mod error;
pub mod types;
pub mod server;
pub mod providers;
pub mod metrics;

pub use error::{AdapterError, AdapterErrorKind, RouterError};
pub type Result<T> = std::result::Result<T, RouterError>;
