use thiserror::Error;

use crate::model::{AlertId, UserId};

#[derive(Debug, Error)]
pub enum Error {
    #[error("user_id is required")]
    MissingUserId,

    #[error("User {0} not found")]
    UnknownUser(UserId),

    #[error("Batch size {size} exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Alert {0} not found")]
    AlertNotFound(AlertId),

    #[error("Alert {alert_id} does not belong to user {user_id}")]
    Forbidden { alert_id: AlertId, user_id: UserId },

    #[error("No medical data found")]
    NoData,

    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors caused by the caller's request. Nothing was persisted and
    /// retrying the same input cannot succeed.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::MissingUserId
                | Error::UnknownUser(_)
                | Error::BatchTooLarge { .. }
                | Error::MalformedPayload(_)
                | Error::AlertNotFound(_)
                | Error::Forbidden { .. }
                | Error::NoData
                | Error::Json(_)
        )
    }

    /// Whether an ingestion that failed with this error may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            // Database might be temporarily unavailable
            Error::Database(_) | Error::Io(_) => true,

            // MQTT errors are handled at connection level, bad input stays bad
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
