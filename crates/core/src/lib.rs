pub mod config;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{NotifyError, NotifyResult};
