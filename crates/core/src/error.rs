use thiserror::Error;
use uuid::Uuid;

use crate::types::NotificationType;

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("A/B test not found: {0}")]
    TestNotFound(Uuid),

    #[error("Invalid traffic split {0}: must lie within [0, 1]")]
    InvalidTrafficSplit(f64),

    #[error("No template configured for notification type {0}")]
    TemplateNotFound(NotificationType),

    #[error("Model build error: {0}")]
    ModelBuild(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
