//! Notification engine — wires profiles, models, templates, experiments and
//! delivery into the end-to-end notification pipeline.

pub mod delivery;
pub mod models;
pub mod service;

pub use delivery::LoggingDelivery;
pub use models::{ModelRegistry, ModelSet};
pub use service::NotificationService;
