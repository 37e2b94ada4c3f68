use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

/// Inventory could not satisfy a reservation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    #[error("insufficient stock for '{item}': requested {requested}, available {available}")]
    Insufficient {
        item: String,
        requested: i64,
        available: i64,
    },

    #[error("'{0}' is not in the medicines list")]
    UnknownItem(String),
}

#[derive(Error, Debug)]
pub enum DispensaryError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error("{0}")]
    InvalidState(String),

    #[error("dispense {id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict { id: Uuid, expected: i64, actual: i64 },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl DispensaryError {
    pub fn validation(message: impl Into<String>) -> Self {
        DispensaryError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        DispensaryError::InvalidState(message.into())
    }

    /// Label used for the error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispensaryError::Validation(_) => "validation",
            DispensaryError::Stock(_) => "stock",
            DispensaryError::InvalidState(_) => "invalid_state",
            DispensaryError::Conflict { .. } => "conflict",
            DispensaryError::NotFound(_) => "not_found",
            DispensaryError::Database(_) => "database",
        }
    }
}

impl From<DispensaryError> for AppError {
    fn from(err: DispensaryError) -> Self {
        match err {
            DispensaryError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            DispensaryError::Stock(e) => AppError::Unprocessable(anyhow::Error::new(e)),
            e @ DispensaryError::InvalidState(_) => AppError::Conflict(anyhow::anyhow!(e.to_string())),
            e @ DispensaryError::Conflict { .. } => AppError::Conflict(anyhow::anyhow!(e.to_string())),
            e @ DispensaryError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            DispensaryError::Database(e) => AppError::DatabaseError(e),
        }
    }
}
